use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{ensure_exists, require_db, required_f64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::debug;

/// One mark per (assessment, student); a second write for the same pair
/// replaces the value and refreshes `created_at`. Marks above the
/// assessment maximum are stored as given.
fn upsert_mark(
    conn: &Connection,
    assessment_id: &str,
    student_id: &str,
    marks_obtained: f64,
) -> Result<String, HandlerErr> {
    conn.execute(
        "INSERT INTO marks(id, assessment_id, student_id, marks_obtained, created_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(assessment_id, student_id) DO UPDATE SET
           marks_obtained = excluded.marks_obtained,
           created_at = excluded.created_at",
        (
            db::new_id(),
            assessment_id,
            student_id,
            marks_obtained,
            db::now_timestamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "marks" }))
    })?;

    conn.query_row(
        "SELECT id FROM marks WHERE assessment_id = ? AND student_id = ?",
        (assessment_id, student_id),
        |r| r.get(0),
    )
    .map_err(HandlerErr::query)
}

fn handle_marks_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assessment_id = required_str(req, "assessmentId")?;
    let student_id = required_str(req, "studentId")?;
    let marks_obtained = required_f64(req, "marksObtained")?;

    ensure_exists(conn, "assessments", &assessment_id, "assessment")?;
    ensure_exists(conn, "users", &student_id, "student")?;

    let mark_id = upsert_mark(conn, &assessment_id, &student_id, marks_obtained)?;
    debug!(%mark_id, %assessment_id, %student_id, marks_obtained, "mark recorded");
    Ok(json!({ "markId": mark_id }))
}

fn handle_marks_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mark_id = required_str(req, "markId")?;
    let marks_obtained = required_f64(req, "marksObtained")?;

    let changed = conn
        .execute(
            "UPDATE marks SET marks_obtained = ?, created_at = ? WHERE id = ?",
            (marks_obtained, db::now_timestamp(), &mark_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("mark not found").with_details(json!({ "id": mark_id })));
    }
    Ok(json!({ "ok": true }))
}

fn handle_marks_list_for_offering(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "marks": [] }));
    };
    let offering_id = required_str(req, "courseOfferingId")?;

    let mut stmt = conn
        .prepare(
            "SELECT
               m.id,
               m.assessment_id,
               m.student_id,
               m.marks_obtained,
               m.created_at,
               u.name,
               a.name,
               a.max_marks,
               a.weight_percent
             FROM marks m
             JOIN users u ON u.id = m.student_id
             JOIN assessments a ON a.id = m.assessment_id
             WHERE a.course_offering_id = ?
             ORDER BY u.rowid, a.rowid",
        )
        .map_err(HandlerErr::query)?;
    let marks = stmt
        .query_map([&offering_id], |row| {
            let mark_id: String = row.get(0)?;
            let assessment_id: String = row.get(1)?;
            let student_id: String = row.get(2)?;
            let marks_obtained: f64 = row.get(3)?;
            let created_at: String = row.get(4)?;
            let student_name: Option<String> = row.get(5)?;
            let assessment_name: String = row.get(6)?;
            let max_marks: f64 = row.get(7)?;
            let weight_percent: f64 = row.get(8)?;
            Ok(json!({
                "markId": mark_id,
                "assessmentId": assessment_id,
                "studentId": student_id,
                "marksObtained": marks_obtained,
                "createdAt": created_at,
                "studentName": student_name,
                "assessmentName": assessment_name,
                "maxMarks": max_marks,
                "weightPercent": weight_percent
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "marks": marks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "marks.create" => handle_marks_create(state, req),
        "marks.update" => handle_marks_update(state, req),
        "marks.listForOffering" => handle_marks_list_for_offering(state, req),
        _ => return None,
    };
    Some(respond(&req.id, outcome))
}
