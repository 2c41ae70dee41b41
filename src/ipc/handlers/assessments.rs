use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    ensure_exists, ensure_positive_max_marks, optional_f64, optional_text, require_db,
    required_f64, required_str, required_text,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

fn handle_assessments_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "assessments": [] }));
    };
    let offering_id = required_str(req, "courseOfferingId")?;

    let mut stmt = conn
        .prepare(
            "SELECT id, course_offering_id, name, max_marks, weight_percent
             FROM assessments
             WHERE course_offering_id = ?
             ORDER BY rowid",
        )
        .map_err(HandlerErr::query)?;
    let assessments = stmt
        .query_map([&offering_id], |row| {
            let id: String = row.get(0)?;
            let course_offering_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let max_marks: f64 = row.get(3)?;
            let weight_percent: f64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "courseOfferingId": course_offering_id,
                "name": name,
                "maxMarks": max_marks,
                "weightPercent": weight_percent
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "assessments": assessments }))
}

/// Weights are stored as given; nothing checks that an offering's weights
/// add up to 100.
fn handle_assessments_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let offering_id = required_str(req, "courseOfferingId")?;
    let name = required_text(req, "name")?;
    let max_marks = required_f64(req, "maxMarks")?;
    let weight_percent = required_f64(req, "weightPercent")?;
    ensure_positive_max_marks(max_marks)?;
    ensure_exists(conn, "course_offerings", &offering_id, "course offering")?;

    let assessment_id = db::new_id();
    conn.execute(
        "INSERT INTO assessments(id, course_offering_id, name, max_marks, weight_percent)
         VALUES(?, ?, ?, ?, ?)",
        (&assessment_id, &offering_id, &name, max_marks, weight_percent),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "assessments" }))
    })?;

    info!(%assessment_id, course_offering_id = %offering_id, max_marks, weight_percent, "assessment created");
    Ok(json!({ "assessmentId": assessment_id }))
}

fn handle_assessments_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = required_str(req, "assessmentId")?;
    let name = optional_text(req, "name")?;
    let max_marks = optional_f64(req, "maxMarks")?;
    let weight_percent = optional_f64(req, "weightPercent")?;
    if let Some(m) = max_marks {
        ensure_positive_max_marks(m)?;
    }

    let changed = conn
        .execute(
            "UPDATE assessments SET
               name = COALESCE(?, name),
               max_marks = COALESCE(?, max_marks),
               weight_percent = COALESCE(?, weight_percent)
             WHERE id = ?",
            (&name, max_marks, weight_percent, &assessment_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("assessment not found")
            .with_details(json!({ "id": assessment_id })));
    }
    Ok(json!({ "ok": true }))
}

fn handle_assessments_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = required_str(req, "assessmentId")?;

    // Marks go with it (ON DELETE CASCADE).
    let changed = conn
        .execute("DELETE FROM assessments WHERE id = ?", [&assessment_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "assessments" }))
        })?;
    if changed == 0 {
        return Err(HandlerErr::not_found("assessment not found")
            .with_details(json!({ "id": assessment_id })));
    }
    info!(%assessment_id, "assessment deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "assessments.list" => handle_assessments_list(state, req),
        "assessments.create" => handle_assessments_create(state, req),
        "assessments.update" => handle_assessments_update(state, req),
        "assessments.delete" => handle_assessments_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, outcome))
}
