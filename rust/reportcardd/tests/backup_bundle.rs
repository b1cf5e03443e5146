use serde_json::json;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
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

fn student_count(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, id: &str) -> usize {
    let res = request_ok(stdin, reader, id, "students.list", json!({}));
    res["students"].as_array().map(|a| a.len()).unwrap_or(0)
}

#[test]
fn bundle_export_then_import_restores_snapshot_and_settings() {
    let workspace = temp_dir("reportcard-backup-src");
    let out_dir = temp_dir("reportcard-backup-out");
    let bundle = out_dir.join("school.rcbundle.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let session = login(&mut stdin, &mut reader, "2", "principal@school.edu", "admin123");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "session": session,
            "firstName": "Ann",
            "lastName": "Otieno",
            "form": 1,
            "stream": "A"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "settings.set",
        json!({ "session": session, "key": "school.profile", "value": { "schoolName": "Before" } }),
    );

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["bundleFormat"], "reportcard-workspace-v1");
    assert_eq!(export["entryCount"], 3);
    assert!(bundle.is_file());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({
            "session": session,
            "firstName": "Ben",
            "lastName": "Kamau",
            "form": 1,
            "stream": "B"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "settings.set",
        json!({ "session": session, "key": "school.profile", "value": { "schoolName": "After" } }),
    );
    assert_eq!(student_count(&mut stdin, &mut reader, "8"), 2);

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "backup.importWorkspaceBundle",
        json!({ "session": session, "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(import["bundleFormatDetected"], "reportcard-workspace-v1");
    assert_eq!(import["counts"]["students"], 1);
    assert_eq!(student_count(&mut stdin, &mut reader, "10"), 1);

    let profile = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "settings.get",
        json!({ "key": "school.profile" }),
    );
    assert_eq!(profile["value"]["schoolName"], "Before");

    let stale = request(
        &mut stdin,
        &mut reader,
        "12",
        "auth.whoami",
        json!({ "session": session }),
    );
    assert_eq!(error_code(&stale), "unauthorized");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn raw_browser_blob_imports_as_snapshot() {
    let workspace = temp_dir("reportcard-backup-blob");
    let blob_path = workspace.join("schoolData.json");
    std::fs::write(
        &blob_path,
        json!({
            "students": [{
                "id": "std1", "firstName": "John", "lastName": "Smith",
                "admissionNumber": "F1-001", "form": 1, "stream": "A",
                "guardianName": "Mary Smith", "guardianPhone": "+2547123456789"
            }],
            "subjects": [{ "id": "subj1", "name": "Mathematics", "code": "MATH" }],
            "exams": [{
                "id": "exam1", "name": "Opener", "type": "TermStart", "term": 1,
                "year": 2024, "form": 1, "date": "2024-01-15"
            }],
            "marks": [{
                "id": "mark1", "studentId": "std1", "subjectId": "subj1",
                "examId": "exam1", "score": 76, "grade": ""
            }],
            "teachers": [{
                "id": "admin1", "firstName": "Principal", "lastName": "Smith",
                "email": "principal@school.edu", "password": "admin123",
                "subjectIds": [], "role": "admin"
            }],
            "activityLogs": []
        })
        .to_string(),
    )
    .expect("write blob");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let session = login(&mut stdin, &mut reader, "2", "principal@school.edu", "admin123");
    let import = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspaceBundle",
        json!({ "session": session, "inPath": blob_path.to_string_lossy() }),
    );
    assert_eq!(import["bundleFormatDetected"], "raw-snapshot-json");

    let marks = request_ok(&mut stdin, &mut reader, "4", "marks.list", json!({}));
    assert_eq!(marks["marks"][0]["grade"], "A-");
    let subjects = request_ok(&mut stdin, &mut reader, "5", "subjects.list", json!({}));
    assert_eq!(subjects["subjects"].as_array().map(|a| a.len()), Some(1));

    let stale = request(
        &mut stdin,
        &mut reader,
        "6",
        "backup.importWorkspaceBundle",
        json!({ "session": session, "inPath": blob_path.to_string_lossy() }),
    );
    assert_eq!(error_code(&stale), "unauthorized");

    let fresh = login(&mut stdin, &mut reader, "7", "principal@school.edu", "admin123");
    let missing = request(
        &mut stdin,
        &mut reader,
        "8",
        "backup.importWorkspaceBundle",
        json!({ "session": fresh, "inPath": workspace.join("nope.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

/// Copies `src` to `dst` with the manifest checksum removed and the snapshot
/// edited to drop every student.
fn write_unsigned_copy(src: &Path, dst: &Path) {
    let mut archive = zip::ZipArchive::new(File::open(src).expect("open bundle"))
        .expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let mut snapshot = String::new();
    archive
        .by_name("snapshot.json")
        .expect("snapshot entry")
        .read_to_string(&mut snapshot)
        .expect("read snapshot");

    let mut manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    manifest
        .as_object_mut()
        .expect("manifest object")
        .remove("snapshotSha256");
    let mut snapshot: serde_json::Value = serde_json::from_str(&snapshot).expect("snapshot json");
    snapshot["students"] = json!([]);

    let mut zip = zip::ZipWriter::new(File::create(dst).expect("create copy"));
    let opts = zip::write::FileOptions::default();
    zip.start_file("manifest.json", opts).expect("start manifest");
    zip.write_all(manifest.to_string().as_bytes())
        .expect("write manifest");
    zip.start_file("snapshot.json", opts).expect("start snapshot");
    zip.write_all(snapshot.to_string().as_bytes())
        .expect("write snapshot");
    zip.finish().expect("finish copy");
}

#[test]
fn bundle_without_checksum_leaves_workspace_untouched() {
    let workspace = temp_dir("reportcard-backup-unsigned");
    let bundle = workspace.join("export.zip");
    let unsigned = workspace.join("unsigned.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let session = login(&mut stdin, &mut reader, "2", "principal@school.edu", "admin123");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "session": session,
            "firstName": "Ann",
            "lastName": "Otieno",
            "form": 1,
            "stream": "A"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    write_unsigned_copy(&bundle, &unsigned);

    let rejected = request(
        &mut stdin,
        &mut reader,
        "5",
        "backup.importWorkspaceBundle",
        json!({ "session": session, "inPath": unsigned.to_string_lossy() }),
    );
    assert_eq!(error_code(&rejected), "backup_failed");
    assert_eq!(student_count(&mut stdin, &mut reader, "6"), 1);

    let still_valid = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "auth.whoami",
        json!({ "session": session }),
    );
    assert_eq!(still_valid["teacher"]["email"], "principal@school.edu");

    let _ = std::fs::remove_dir_all(workspace);
}
