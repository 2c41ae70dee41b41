use crate::calc;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "records.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;
    let seeded = seed_default_grade_scale(&conn)?;
    info!(path = %db_path.display(), seeded_grade_bands = seeded, "workspace database open");
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL CHECK(role IN ('admin', 'teacher', 'student')),
            name TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            ordinal INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            title TEXT NOT NULL,
            credits REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_offerings(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            teacher_id TEXT,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_offerings_semester ON course_offerings(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            course_offering_id TEXT NOT NULL,
            name TEXT NOT NULL,
            max_marks REAL NOT NULL,
            weight_percent REAL NOT NULL,
            FOREIGN KEY(course_offering_id) REFERENCES course_offerings(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_offering ON assessments(course_offering_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            marks_obtained REAL NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(assessment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_scale(
            id TEXT PRIMARY KEY,
            sort_order INTEGER NOT NULL,
            min_percent REAL NOT NULL,
            max_percent REAL NOT NULL,
            grade_point REAL NOT NULL,
            grade_letter TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Seeds the default bands into an empty `grade_scale`. Returns how many rows
/// were inserted (0 when a scale already exists).
pub fn seed_default_grade_scale(conn: &Connection) -> anyhow::Result<usize> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM grade_scale", [], |r| r.get(0))?;
    if existing > 0 {
        return Ok(0);
    }

    let scale = calc::default_grade_scale();
    let tx = conn.unchecked_transaction()?;
    for (i, band) in scale.bands().iter().enumerate() {
        tx.execute(
            "INSERT INTO grade_scale(id, sort_order, min_percent, max_percent, grade_point, grade_letter)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                new_id(),
                i as i64,
                band.min_percent,
                band.max_percent,
                band.grade_point,
                &band.grade_letter,
            ),
        )?;
    }
    tx.commit()?;
    Ok(scale.bands().len())
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoSeedCounts {
    pub users: usize,
    pub semesters: usize,
    pub subjects: usize,
    pub offerings: usize,
    pub assessments: usize,
    pub marks: usize,
}

/// Loads the sample school: two teachers, two students, CS101/CS102/MA101 in
/// the first semester, with CS101 fully assessed and marked.
///
/// Returns `Ok(None)` without touching anything if the workspace already has
/// users.
pub fn seed_demo(conn: &Connection) -> anyhow::Result<Option<DemoSeedCounts>> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    if existing > 0 {
        return Ok(None);
    }

    let mut counts = DemoSeedCounts::default();
    let tx = conn.unchecked_transaction()?;

    let mut user_ids: Vec<String> = Vec::new();
    for (username, role, name) in [
        ("admin", "admin", "Administrator"),
        ("t_alex", "teacher", "Prof. Alex"),
        ("t_maya", "teacher", "Prof. Maya"),
        ("s_ankit", "student", "Ankit Sharma"),
        ("s_ria", "student", "Ria Gupta"),
    ] {
        let id = new_id();
        tx.execute(
            "INSERT INTO users(id, username, role, name) VALUES(?, ?, ?, ?)",
            (&id, username, role, name),
        )?;
        user_ids.push(id);
        counts.users += 1;
    }
    let (alex, maya, ankit, ria) = (&user_ids[1], &user_ids[2], &user_ids[3], &user_ids[4]);

    let mut semester_ids: Vec<String> = Vec::new();
    for (name, ordinal) in [("Sem 1 2025", 1_i64), ("Sem 2 2025", 2)] {
        let id = new_id();
        tx.execute(
            "INSERT INTO semesters(id, name, ordinal) VALUES(?, ?, ?)",
            (&id, name, ordinal),
        )?;
        semester_ids.push(id);
        counts.semesters += 1;
    }
    let sem1 = &semester_ids[0];

    let mut subject_ids: Vec<String> = Vec::new();
    for (code, title, credits) in [
        ("CS101", "Intro to Programming", 4.0_f64),
        ("CS102", "Data Structures", 4.0),
        ("MA101", "Calculus", 3.0),
    ] {
        let id = new_id();
        tx.execute(
            "INSERT INTO subjects(id, code, title, credits) VALUES(?, ?, ?, ?)",
            (&id, code, title, credits),
        )?;
        subject_ids.push(id);
        counts.subjects += 1;
    }

    let mut offering_ids: Vec<String> = Vec::new();
    for (subject, teacher) in [
        (&subject_ids[0], alex),
        (&subject_ids[1], maya),
        (&subject_ids[2], alex),
    ] {
        let id = new_id();
        tx.execute(
            "INSERT INTO course_offerings(id, subject_id, semester_id, teacher_id) VALUES(?, ?, ?, ?)",
            (&id, subject, sem1, teacher),
        )?;
        offering_ids.push(id);
        counts.offerings += 1;
    }

    let mut assessment_ids: Vec<String> = Vec::new();
    for (offering, name, max_marks, weight) in [
        (&offering_ids[0], "Internal Test 1", 20.0_f64, 10.0_f64),
        (&offering_ids[0], "Internal Test 2", 20.0, 10.0),
        (&offering_ids[0], "Viva", 10.0, 10.0),
        (&offering_ids[0], "Final Exam", 50.0, 70.0),
        (&offering_ids[1], "Internal Test", 30.0, 20.0),
        (&offering_ids[1], "Final Exam", 70.0, 80.0),
    ] {
        let id = new_id();
        tx.execute(
            "INSERT INTO assessments(id, course_offering_id, name, max_marks, weight_percent)
             VALUES(?, ?, ?, ?, ?)",
            (&id, offering, name, max_marks, weight),
        )?;
        assessment_ids.push(id);
        counts.assessments += 1;
    }

    let created_at = now_timestamp();
    for (student, marks) in [(ankit, [15.0_f64, 16.0, 8.0, 35.0]), (ria, [17.0, 15.0, 9.0, 40.0])] {
        for (assessment, obtained) in assessment_ids.iter().zip(marks) {
            tx.execute(
                "INSERT INTO marks(id, assessment_id, student_id, marks_obtained, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (new_id(), assessment, student, obtained, &created_at),
            )?;
            counts.marks += 1;
        }
    }

    tx.commit()?;
    info!(?counts, "seeded demo records");
    Ok(Some(counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open memory db");
        init_schema(&conn).expect("init schema");
        conn
    }

    #[test]
    fn grade_scale_is_seeded_once() {
        let conn = memory_db();
        assert_eq!(seed_default_grade_scale(&conn).expect("seed"), 7);
        assert_eq!(seed_default_grade_scale(&conn).expect("reseed"), 0);
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM grade_scale", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 7);
    }

    #[test]
    fn demo_seed_refuses_non_empty_workspace() {
        let conn = memory_db();
        let counts = seed_demo(&conn).expect("seed").expect("empty workspace");
        assert_eq!(counts.users, 5);
        assert_eq!(counts.assessments, 6);
        assert_eq!(counts.marks, 8);
        assert!(seed_demo(&conn).expect("second seed").is_none());
    }

    #[test]
    fn deleting_an_assessment_cascades_to_marks() {
        let conn = memory_db();
        seed_demo(&conn).expect("seed");
        let assessment_id: String = conn
            .query_row(
                "SELECT id FROM assessments WHERE name = 'Viva'",
                [],
                |r| r.get(0),
            )
            .expect("viva");
        conn.execute("DELETE FROM assessments WHERE id = ?", [&assessment_id])
            .expect("delete");
        let remaining: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM marks WHERE assessment_id = ?",
                [&assessment_id],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(remaining, 0);
    }
}
