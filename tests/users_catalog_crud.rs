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

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    workspace: PathBuf,
}

impl Sidecar {
    fn open(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (child, stdin, reader) = spawn_sidecar();
        let mut sc = Self {
            child,
            stdin,
            reader,
            next_id: 0,
            workspace,
        };
        let path = sc.workspace.to_string_lossy().to_string();
        sc.ok("workspace.select", json!({ "path": path }));
        sc
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn id(&mut self, method: &str, params: serde_json::Value, key: &str) -> String {
        self.ok(method, params)
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| panic!("{} missing {}", method, key))
            .to_string()
    }

    fn close(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.workspace);
    }
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
}

fn rows(v: &serde_json::Value, key: &str) -> Vec<serde_json::Value> {
    v.get(key)
        .and_then(|x| x.as_array())
        .cloned()
        .unwrap_or_else(|| panic!("missing array {} in {}", key, v))
}

#[test]
fn users_create_update_delete() {
    let mut sc = Sidecar::open("recordsd-users");

    let alex = sc.id(
        "users.create",
        json!({ "username": "t_alex", "role": "teacher", "name": "Prof. Alex" }),
        "userId",
    );
    let ankit = sc.id(
        "users.create",
        json!({ "username": "s_ankit", "role": "Student", "name": "Ankit" }),
        "userId",
    );

    let bad_role = sc.call(
        "users.create",
        json!({ "username": "x", "role": "principal" }),
    );
    assert_eq!(error_code(&bad_role), Some("bad_params"));

    let duplicate = sc.call(
        "users.create",
        json!({ "username": "t_alex", "role": "teacher" }),
    );
    assert_eq!(error_code(&duplicate), Some("db_insert_failed"));

    // Blank fields keep their stored value.
    let _ = sc.ok(
        "users.update",
        json!({ "userId": ankit, "name": "Ankit Sharma", "username": "" }),
    );
    let users = rows(&sc.ok("users.list", json!({})), "users");
    assert_eq!(users.len(), 2);
    let row = users
        .iter()
        .find(|u| u.get("id").and_then(|v| v.as_str()) == Some(ankit.as_str()))
        .expect("ankit row");
    assert_eq!(row.get("name").and_then(|v| v.as_str()), Some("Ankit Sharma"));
    assert_eq!(row.get("username").and_then(|v| v.as_str()), Some("s_ankit"));
    assert_eq!(row.get("role").and_then(|v| v.as_str()), Some("student"));

    let students = rows(&sc.ok("students.list", json!({})), "students");
    assert_eq!(students.len(), 1);

    let _ = sc.ok("users.update", json!({ "userId": alex, "role": "admin" }));
    let missing = sc.call("users.update", json!({ "userId": "nope", "name": "x" }));
    assert_eq!(error_code(&missing), Some("not_found"));

    let _ = sc.ok("users.delete", json!({ "userId": alex }));
    let gone = sc.call("users.delete", json!({ "userId": alex }));
    assert_eq!(error_code(&gone), Some("not_found"));
    assert_eq!(rows(&sc.ok("users.list", json!({})), "users").len(), 1);

    sc.close();
}

#[test]
fn semesters_sort_by_ordinal() {
    let mut sc = Sidecar::open("recordsd-semesters");

    let _ = sc.ok("semesters.create", json!({ "name": "Sem 2", "ordinal": 2 }));
    let _ = sc.ok("semesters.create", json!({ "name": "Unordered" }));
    let created = sc.ok("semesters.create", json!({ "name": "Sem 1", "ordinal": 1 }));
    assert_eq!(created.get("ordinal").and_then(|v| v.as_i64()), Some(1));

    let blank = sc.call("semesters.create", json!({ "name": "  " }));
    assert_eq!(error_code(&blank), Some("bad_params"));

    let names: Vec<String> = rows(&sc.ok("semesters.list", json!({})), "semesters")
        .iter()
        .map(|s| s.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string())
        .collect();
    assert_eq!(names, vec!["Sem 1", "Sem 2", "Unordered"]);

    sc.close();
}

#[test]
fn offerings_join_subject_semester_and_teacher() {
    let mut sc = Sidecar::open("recordsd-offerings");

    let teacher = sc.id(
        "users.create",
        json!({ "username": "t_maya", "role": "teacher", "name": "Prof. Maya" }),
        "userId",
    );
    let _ = sc.ok(
        "users.create",
        json!({ "username": "s_ria", "role": "student", "name": "Ria" }),
    );
    let semester = sc.id(
        "semesters.create",
        json!({ "name": "Sem 1 2025", "ordinal": 1 }),
        "semesterId",
    );
    let subject = sc.id(
        "subjects.create",
        json!({ "code": "CS102", "title": "Data Structures", "credits": 4 }),
        "subjectId",
    );

    let negative = sc.call(
        "subjects.create",
        json!({ "code": "X", "title": "X", "credits": -1 }),
    );
    assert_eq!(error_code(&negative), Some("bad_params"));

    let orphan = sc.call(
        "offerings.create",
        json!({ "subjectId": "nope", "semesterId": semester }),
    );
    assert_eq!(error_code(&orphan), Some("not_found"));

    let offering = sc.id(
        "offerings.create",
        json!({ "subjectId": subject, "semesterId": semester, "teacherId": teacher }),
        "courseOfferingId",
    );

    let offerings = rows(&sc.ok("offerings.list", json!({})), "offerings");
    assert_eq!(offerings.len(), 1);
    let o = &offerings[0];
    assert_eq!(o.get("id").and_then(|v| v.as_str()), Some(offering.as_str()));
    assert_eq!(o.get("code").and_then(|v| v.as_str()), Some("CS102"));
    assert_eq!(o.get("credits").and_then(|v| v.as_f64()), Some(4.0));
    assert_eq!(o.get("semester").and_then(|v| v.as_str()), Some("Sem 1 2025"));
    assert_eq!(
        o.get("teacherName").and_then(|v| v.as_str()),
        Some("Prof. Maya")
    );

    // No enrollment model: every student belongs to every offering.
    let students = rows(
        &sc.ok("offerings.students", json!({ "courseOfferingId": offering })),
        "students",
    );
    assert_eq!(students.len(), 1);
    assert_eq!(
        students[0].get("username").and_then(|v| v.as_str()),
        Some("s_ria")
    );

    let subjects = rows(&sc.ok("subjects.list", json!({})), "subjects");
    assert_eq!(subjects.len(), 1);

    sc.close();
}
