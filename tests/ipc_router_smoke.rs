use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_recordsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn recordsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
}

const METHODS: [&str; 27] = [
    "health",
    "workspace.select",
    "workspace.seedDemo",
    "users.list",
    "users.create",
    "users.update",
    "users.delete",
    "students.list",
    "semesters.list",
    "semesters.create",
    "subjects.list",
    "subjects.create",
    "offerings.list",
    "offerings.create",
    "offerings.students",
    "assessments.list",
    "assessments.create",
    "assessments.update",
    "assessments.delete",
    "marks.create",
    "marks.update",
    "marks.listForOffering",
    "gradeScale.list",
    "grades.resolve",
    "grades.courseSummary",
    "grades.semesterGpa",
    "grades.cgpa",
];

#[test]
fn every_method_family_dispatches() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, method) in METHODS.iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            method,
            json!({}),
        );
        assert_ne!(
            error_code(&resp),
            Some("not_implemented"),
            "unexpected unknown method for {}",
            method
        );
    }

    let unknown = request(&mut stdin, &mut reader, "x", "grades.unknown", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn without_workspace_lists_are_empty_and_writes_are_refused() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert!(health
        .get("result")
        .and_then(|r| r.get("workspacePath"))
        .map(|v| v.is_null())
        .unwrap_or(false));

    let users = request(&mut stdin, &mut reader, "2", "users.list", json!({}));
    assert_eq!(
        users
            .get("result")
            .and_then(|r| r.get("users"))
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    for (id, method, params) in [
        ("3", "users.create", json!({ "username": "x", "role": "student" })),
        ("4", "grades.resolve", json!({ "percent": 50 })),
        ("5", "grades.cgpa", json!({ "studentId": "s" })),
        ("6", "workspace.seedDemo", json!({})),
    ] {
        let resp = request(&mut stdin, &mut reader, id, method, params);
        assert_eq!(error_code(&resp), Some("no_workspace"), "{}", method);
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let workspace = temp_dir("recordsd-bad-json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&value), Some("bad_json"));

    let selected = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert!(workspace.join("records.sqlite3").exists());

    let missing_param = request(&mut stdin, &mut reader, "2", "grades.resolve", json!({}));
    assert_eq!(error_code(&missing_param), Some("bad_params"));

    let wrong_type = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.resolve",
        json!({ "percent": "high" }),
    );
    assert_eq!(error_code(&wrong_type), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn workspace_flag_opens_database_at_startup() {
    let workspace = temp_dir("recordsd-workspace-flag");
    let exe = env!("CARGO_BIN_EXE_recordsd");
    let mut child = Command::new(exe)
        .arg("--workspace")
        .arg(&workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn recordsd");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let resp = request(&mut stdin, &mut reader, "1", "grades.resolve", json!({ "percent": 91 }));
    assert_eq!(
        resp.get("result")
            .and_then(|r| r.get("gradeLetter"))
            .and_then(|v| v.as_str()),
        Some("A+")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
