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
    let exe = env!("CARGO_BIN_EXE_reportcardd");
    let mut child = Command::new(exe)
        .env_remove("REPORTCARDD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportcardd");
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    email: &str,
    password: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "auth.login",
        json!({ "email": email, "password": password }),
    );
    res.get("session")
        .and_then(|v| v.as_str())
        .expect("session")
        .to_string()
}

fn subject_id_by_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    code: &str,
) -> String {
    let res = request_ok(stdin, reader, id, "subjects.list", json!({}));
    res["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|s| s["code"] == code)
        .and_then(|s| s["id"].as_str())
        .expect("subject code")
        .to_string()
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    session: &str,
    first: &str,
    last: &str,
    form: i64,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({
            "session": session,
            "firstName": first,
            "lastName": last,
            "admissionNumber": format!("F{}-{}", form, last),
            "form": form,
            "stream": "B",
            "guardianName": "Guardian",
            "guardianPhone": "+254700000000"
        }),
    );
    res["student"]["id"].as_str().expect("student id").to_string()
}

#[test]
fn admin_manages_students_teachers_and_subjects() {
    let workspace = temp_dir("reportcard-roster");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let admin = login(&mut stdin, &mut reader, "2", "principal@school.edu", "admin123");

    let subjects = request_ok(&mut stdin, &mut reader, "3", "subjects.list", json!({}));
    assert_eq!(subjects["subjects"].as_array().map(|a| a.len()), Some(8));

    let ann = create_student(&mut stdin, &mut reader, "4", &admin, "Ann", "Otieno", 3);
    let ben = create_student(&mut stdin, &mut reader, "5", &admin, "Ben", "Kamau", 4);
    let _cy = create_student(&mut stdin, &mut reader, "6", &admin, "Cy", "Wanjiru", 1);

    let bad_stream = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({
            "session": admin,
            "firstName": "Dee",
            "lastName": "Mwangi",
            "form": 1,
            "stream": "Z"
        }),
    );
    assert_eq!(error_code(&bad_stream), "bad_params");

    let form3 = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({ "form": 3 }));
    assert_eq!(form3["students"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(form3["students"][0]["id"], ann.as_str());

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "students.update",
        json!({
            "session": admin,
            "studentId": ann,
            "firstName": "Anne",
            "lastName": "Otieno",
            "form": 3,
            "stream": "C"
        }),
    );
    assert_eq!(updated["student"]["firstName"], "Anne");
    assert_eq!(updated["student"]["stream"], "C");

    let promoted = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "students.promote",
        json!({ "session": admin, "studentIds": [ann, ben] }),
    );
    assert_eq!(promoted["promoted"], 1);
    assert_eq!(promoted["graduated"], 1);
    let alumni = request_ok(&mut stdin, &mut reader, "11", "students.list", json!({ "form": 5 }));
    assert_eq!(alumni["students"][0]["id"], ben.as_str());

    let geo = subject_id_by_code(&mut stdin, &mut reader, "12", "GEO");
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "teachers.create",
        json!({
            "session": admin,
            "firstName": "Jane",
            "lastName": "Doe",
            "email": "j.doe@school.edu",
            "password": "password123",
            "subjectIds": [geo],
            "role": "teacher"
        }),
    );
    assert!(teacher["teacher"].get("password").is_none());
    let teacher_id = teacher["teacher"]["id"].as_str().expect("teacher id").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "14", "teachers.list", json!({}));
    for t in listed["teachers"].as_array().expect("teachers") {
        assert!(t.get("password").is_none());
    }

    let dup = request(
        &mut stdin,
        &mut reader,
        "15",
        "teachers.create",
        json!({
            "session": admin,
            "firstName": "Other",
            "lastName": "Doe",
            "email": "j.doe@school.edu",
            "password": "x"
        }),
    );
    assert_eq!(error_code(&dup), "conflict");

    let assigned = request(
        &mut stdin,
        &mut reader,
        "16",
        "subjects.delete",
        json!({ "session": admin, "subjectId": geo }),
    );
    assert_eq!(error_code(&assigned), "conflict");

    let music = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "subjects.create",
        json!({ "session": admin, "name": "Music", "code": "MUS" }),
    );
    let music_id = music["subject"]["id"].as_str().expect("subject id").to_string();
    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "subjects.update",
        json!({ "session": admin, "subjectId": music_id, "name": "Music & Drama", "code": "MUS" }),
    );
    assert_eq!(renamed["subject"]["name"], "Music & Drama");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "subjects.delete",
        json!({ "session": admin, "subjectId": music_id }),
    );

    let teacher_session = login(&mut stdin, &mut reader, "20", "j.doe@school.edu", "password123");
    let forbidden = request(
        &mut stdin,
        &mut reader,
        "21",
        "students.delete",
        json!({ "session": teacher_session, "studentId": ann }),
    );
    assert_eq!(error_code(&forbidden), "forbidden");

    let me = request_ok(
        &mut stdin,
        &mut reader,
        "22",
        "auth.whoami",
        json!({ "session": admin }),
    );
    let admin_id = me["teacher"]["id"].as_str().expect("admin id").to_string();
    let self_delete = request(
        &mut stdin,
        &mut reader,
        "23",
        "teachers.delete",
        json!({ "session": admin, "teacherId": admin_id }),
    );
    assert_eq!(error_code(&self_delete), "conflict");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "24",
        "teachers.delete",
        json!({ "session": admin, "teacherId": teacher_id }),
    );
    let orphaned = request(
        &mut stdin,
        &mut reader,
        "25",
        "auth.whoami",
        json!({ "session": teacher_session }),
    );
    assert_eq!(error_code(&orphaned), "unauthorized");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "26",
        "students.delete",
        json!({ "session": admin, "studentId": ann }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "27",
        "students.delete",
        json!({ "session": admin, "studentId": ann }),
    );
    assert_eq!(error_code(&gone), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn roster_survives_daemon_restart() {
    let workspace = temp_dir("reportcard-roster-restart");
    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        let admin = login(&mut stdin, &mut reader, "2", "principal@school.edu", "admin123");
        let _ = create_student(&mut stdin, &mut reader, "3", &admin, "Ann", "Otieno", 2);
        drop(stdin);
        let _ = child.wait();
    }

    let exe = env!("CARGO_BIN_EXE_reportcardd");
    let mut child = Command::new(exe)
        .env("REPORTCARDD_WORKSPACE", &workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportcardd");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let students = request_ok(&mut stdin, &mut reader, "1", "students.list", json!({}));
    let list = students["students"].as_array().expect("students");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["lastName"], "Otieno");
    let subjects = request_ok(&mut stdin, &mut reader, "2", "subjects.list", json!({}));
    assert_eq!(subjects["subjects"].as_array().map(|a| a.len()), Some(8));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
