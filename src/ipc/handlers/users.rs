use crate::db;
use crate::ipc::error::{err, ok, respond, HandlerErr};
use crate::ipc::helpers::{optional_text, require_db, required_str, required_text};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

const ROLES: [&str; 3] = ["admin", "teacher", "student"];

fn parse_role(raw: &str) -> Result<String, HandlerErr> {
    let role = raw.trim().to_ascii_lowercase();
    if ROLES.contains(&role.as_str()) {
        Ok(role)
    } else {
        Err(HandlerErr::bad_params("role must be one of: admin, teacher, student")
            .with_details(json!({ "role": raw })))
    }
}

fn keyed(key: &str, value: serde_json::Value) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    out.insert(key.to_string(), value);
    serde_json::Value::Object(out)
}

fn list_users(state: &AppState, req: &Request, students_only: bool) -> serde_json::Value {
    let key = if students_only { "students" } else { "users" };
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, keyed(key, json!([])));
    };

    let sql = if students_only {
        "SELECT id, username, role, name FROM users WHERE role = 'student' ORDER BY rowid"
    } else {
        "SELECT id, username, role, name FROM users ORDER BY rowid"
    };
    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let username: String = row.get(1)?;
            let role: String = row.get(2)?;
            let name: Option<String> = row.get(3)?;
            Ok(json!({
                "id": id,
                "username": username,
                "role": role,
                "name": name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, keyed(key, json!(users))),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_users_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let username = required_text(req, "username")?;
    let role = parse_role(&required_str(req, "role")?)?;
    let name = optional_text(req, "name")?;

    let user_id = db::new_id();
    conn.execute(
        "INSERT INTO users(id, username, role, name) VALUES(?, ?, ?, ?)",
        (&user_id, &username, &role, &name),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "users" }))
    })?;

    info!(%user_id, %username, %role, "user created");
    Ok(json!({ "userId": user_id }))
}

fn handle_users_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = required_str(req, "userId")?;
    let username = optional_text(req, "username")?;
    let name = optional_text(req, "name")?;
    let role = match optional_text(req, "role")? {
        Some(r) => Some(parse_role(&r)?),
        None => None,
    };

    let changed = conn
        .execute(
            "UPDATE users SET
               username = COALESCE(?, username),
               name = COALESCE(?, name),
               role = COALESCE(?, role)
             WHERE id = ?",
            (&username, &name, &role, &user_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("user not found").with_details(json!({ "id": user_id })));
    }
    Ok(json!({ "ok": true }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let user_id = required_str(req, "userId")?;

    // Fails while marks or offerings still reference the user.
    let changed = conn
        .execute("DELETE FROM users WHERE id = ?", [&user_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "users" }))
        })?;
    if changed == 0 {
        return Err(HandlerErr::not_found("user not found").with_details(json!({ "id": user_id })));
    }
    info!(%user_id, "user deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(list_users(state, req, false)),
        "students.list" => Some(list_users(state, req, true)),
        "users.create" => Some(respond(&req.id, handle_users_create(state, req))),
        "users.update" => Some(respond(&req.id, handle_users_update(state, req))),
        "users.delete" => Some(respond(&req.id, handle_users_delete(state, req))),
        _ => None,
    }
}
