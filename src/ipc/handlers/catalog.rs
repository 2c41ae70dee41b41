use crate::db;
use crate::ipc::error::{err, ok, respond, HandlerErr};
use crate::ipc::helpers::{
    ensure_exists, optional_i64, optional_text, require_db, required_f64, required_str,
    required_text,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_semesters_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "semesters": [] }));
    };

    // Semesters without an ordinal sort last.
    let mut stmt = match conn.prepare(
        "SELECT id, name, ordinal
         FROM semesters
         ORDER BY ordinal IS NULL, ordinal, rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let ordinal: Option<i64> = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "ordinal": ordinal }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(semesters) => ok(&req.id, json!({ "semesters": semesters })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_semesters_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_text(req, "name")?;
    let ordinal = optional_i64(req, "ordinal")?;

    let semester_id = db::new_id();
    conn.execute(
        "INSERT INTO semesters(id, name, ordinal) VALUES(?, ?, ?)",
        (&semester_id, &name, ordinal),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "semesters" }))
    })?;

    Ok(json!({ "semesterId": semester_id, "name": name, "ordinal": ordinal }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };

    let mut stmt = match conn.prepare("SELECT id, code, title, credits FROM subjects ORDER BY code")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let title: String = row.get(2)?;
            let credits: f64 = row.get(3)?;
            Ok(json!({ "id": id, "code": code, "title": title, "credits": credits }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let code = required_text(req, "code")?;
    let title = required_text(req, "title")?;
    let credits = required_f64(req, "credits")?;
    if credits < 0.0 {
        return Err(HandlerErr::bad_params("credits must be >= 0")
            .with_details(json!({ "credits": credits })));
    }

    let subject_id = db::new_id();
    conn.execute(
        "INSERT INTO subjects(id, code, title, credits) VALUES(?, ?, ?, ?)",
        (&subject_id, &code, &title, credits),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "subjects" }))
    })?;

    Ok(json!({ "subjectId": subject_id }))
}

fn handle_offerings_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "offerings": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           co.id,
           s.id,
           s.code,
           s.title,
           s.credits,
           se.id,
           se.name,
           u.id,
           u.name
         FROM course_offerings co
         JOIN subjects s ON s.id = co.subject_id
         JOIN semesters se ON se.id = co.semester_id
         LEFT JOIN users u ON u.id = co.teacher_id
         ORDER BY co.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let subject_id: String = row.get(1)?;
            let code: String = row.get(2)?;
            let title: String = row.get(3)?;
            let credits: f64 = row.get(4)?;
            let semester_id: String = row.get(5)?;
            let semester: String = row.get(6)?;
            let teacher_id: Option<String> = row.get(7)?;
            let teacher_name: Option<String> = row.get(8)?;
            Ok(json!({
                "id": id,
                "subjectId": subject_id,
                "code": code,
                "title": title,
                "credits": credits,
                "semesterId": semester_id,
                "semester": semester,
                "teacherId": teacher_id,
                "teacherName": teacher_name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(offerings) => ok(&req.id, json!({ "offerings": offerings })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_offerings_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let subject_id = required_str(req, "subjectId")?;
    let semester_id = required_str(req, "semesterId")?;
    let teacher_id = optional_text(req, "teacherId")?;

    ensure_exists(conn, "subjects", &subject_id, "subject")?;
    ensure_exists(conn, "semesters", &semester_id, "semester")?;
    if let Some(t) = &teacher_id {
        ensure_exists(conn, "users", t, "teacher")?;
    }

    let offering_id = db::new_id();
    conn.execute(
        "INSERT INTO course_offerings(id, subject_id, semester_id, teacher_id) VALUES(?, ?, ?, ?)",
        (&offering_id, &subject_id, &semester_id, &teacher_id),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "course_offerings" }))
    })?;

    Ok(json!({ "courseOfferingId": offering_id }))
}

/// Every student is listed for every offering: there is no enrollment model.
fn handle_offerings_students(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let offering_id = required_str(req, "courseOfferingId")?;
    ensure_exists(conn, "course_offerings", &offering_id, "course offering")?;

    let mut stmt = conn
        .prepare("SELECT id, username, name FROM users WHERE role = 'student' ORDER BY rowid")
        .map_err(HandlerErr::query)?;
    let students = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let username: String = row.get(1)?;
            let name: Option<String> = row.get(2)?;
            Ok(json!({ "id": id, "username": username, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "semesters.list" => Some(handle_semesters_list(state, req)),
        "semesters.create" => Some(respond(&req.id, handle_semesters_create(state, req))),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(respond(&req.id, handle_subjects_create(state, req))),
        "offerings.list" => Some(handle_offerings_list(state, req)),
        "offerings.create" => Some(respond(&req.id, handle_offerings_create(state, req))),
        "offerings.students" => Some(respond(&req.id, handle_offerings_students(state, req))),
        _ => None,
    }
}
