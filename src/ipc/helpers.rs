use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn param<'a>(req: &'a Request, key: &str) -> Option<&'a serde_json::Value> {
    req.params.get(key).filter(|v| !v.is_null())
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    param(req, key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Trimmed, non-empty string.
pub fn required_text(req: &Request, key: &str) -> Result<String, HandlerErr> {
    let v = required_str(req, key)?;
    let t = v.trim();
    if t.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(t.to_string())
}

/// Missing, null and blank strings all read as "not provided".
pub fn optional_text(req: &Request, key: &str) -> Result<Option<String>, HandlerErr> {
    let Some(v) = param(req, key) else {
        return Ok(None);
    };
    let Some(s) = v.as_str() else {
        return Err(HandlerErr::bad_params(format!("{} must be a string", key)));
    };
    let t = s.trim();
    Ok(if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    })
}

pub fn optional_f64(req: &Request, key: &str) -> Result<Option<f64>, HandlerErr> {
    let Some(v) = param(req, key) else {
        return Ok(None);
    };
    match v.as_f64() {
        Some(n) => Ok(Some(n)),
        None => Err(HandlerErr::bad_params(format!("{} must be a number", key))
            .with_details(json!({ "param": key, "value": v }))),
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, HandlerErr> {
    optional_f64(req, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    let Some(v) = param(req, key) else {
        return Ok(None);
    };
    match v.as_i64() {
        Some(n) => Ok(Some(n)),
        None => Err(HandlerErr::bad_params(format!("{} must be an integer", key))
            .with_details(json!({ "param": key, "value": v }))),
    }
}

/// `table` must be a literal table name, never caller input.
pub fn ensure_exists(
    conn: &Connection,
    table: &'static str,
    id: &str,
    label: &str,
) -> Result<(), HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn
        .query_row(&sql, [id], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?;
    if found.is_none() {
        return Err(HandlerErr::not_found(format!("{} not found", label))
            .with_details(json!({ "id": id })));
    }
    Ok(())
}

pub fn ensure_positive_max_marks(max_marks: f64) -> Result<(), HandlerErr> {
    if max_marks > 0.0 {
        return Ok(());
    }
    Err(HandlerErr::bad_params("maxMarks must be > 0").with_details(json!({ "maxMarks": max_marks })))
}
