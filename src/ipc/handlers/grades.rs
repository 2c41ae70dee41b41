use crate::calc::{self, CalcContext, GpaScope, GradeSource};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{require_db, required_f64, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_grade_scale_list(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "bands": [] }));
    };
    let scale = CalcContext { conn }.grade_scale()?;
    Ok(json!({ "bands": scale.bands() }))
}

fn handle_grades_resolve(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let percent = required_f64(req, "percent")?;
    let grade = CalcContext { conn }.grade_scale()?.resolve(percent);
    Ok(json!({ "gradePoint": grade.point, "gradeLetter": grade.letter }))
}

fn handle_grades_course_summary(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let offering_id = required_str(req, "courseOfferingId")?;
    let summary = calc::compute_course_summary(&CalcContext { conn }, &offering_id, &student_id)?;
    Ok(json!(summary))
}

fn handle_grades_semester_gpa(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let semester_id = required_str(req, "semesterId")?;
    let summary = calc::compute_gpa(
        &CalcContext { conn },
        &student_id,
        &GpaScope::Semester(semester_id),
    )?;
    Ok(json!({ "gpa": summary.gpa, "totalCredits": summary.total_credits }))
}

fn handle_grades_cgpa(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = required_str(req, "studentId")?;
    let summary = calc::compute_gpa(&CalcContext { conn }, &student_id, &GpaScope::AllTime)?;
    Ok(json!({ "cgpa": summary.gpa, "totalCredits": summary.total_credits }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "gradeScale.list" => handle_grade_scale_list(state, req),
        "grades.resolve" => handle_grades_resolve(state, req),
        "grades.courseSummary" => handle_grades_course_summary(state, req),
        "grades.semesterGpa" => handle_grades_semester_gpa(state, req),
        "grades.cgpa" => handle_grades_cgpa(state, req),
        _ => return None,
    };
    Some(respond(&req.id, outcome))
}
