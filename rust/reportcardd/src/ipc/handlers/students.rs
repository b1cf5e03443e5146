use crate::ipc::error::{err, ok, op_err};
use crate::ipc::helpers::{
    auth_ctx, optional_i64, optional_str, required_i64, required_str, string_list, ws, ws_mut,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Stream;
use crate::workspace::StudentInput;
use serde_json::json;

fn parse_stream(req: &Request, raw: &str) -> HandlerResult<Stream> {
    Stream::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "stream must be one of: A, B, C",
            Some(json!({ "stream": raw })),
        )
    })
}

fn student_input(req: &Request) -> HandlerResult<StudentInput> {
    let stream = required_str(req, "stream")?;
    Ok(StudentInput {
        first_name: required_str(req, "firstName")?,
        last_name: required_str(req, "lastName")?,
        admission_number: optional_str(req, "admissionNumber").unwrap_or_default(),
        form: required_i64(req, "form")?,
        stream: parse_stream(req, &stream)?,
        guardian_name: optional_str(req, "guardianName").unwrap_or_default(),
        guardian_phone: optional_str(req, "guardianPhone").unwrap_or_default(),
        image_url: optional_str(req, "imageUrl"),
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form = match optional_i64(req, "form") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let stream = match optional_str(req, "stream").map(|s| parse_stream(req, &s)).transpose() {
        Ok(v) => v,
        Err(e) => return e,
    };
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let students: Vec<_> = data
        .students
        .iter()
        .filter(|s| form.map(|f| s.form == f).unwrap_or(true))
        .filter(|s| stream.map(|st| s.stream == st).unwrap_or(true))
        .collect();
    ok(&req.id, json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match student_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.add_student(&ctx, input) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match student_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.update_student(&ctx, &student_id, input) {
        Ok(student) => ok(&req.id, json!({ "student": student })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.delete_student(&ctx, &student_id) {
        Ok(removed) => ok(&req.id, json!({ "ok": true, "marksRemoved": removed })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_students_promote(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ids = match string_list(req, "studentIds") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.promote_students(&ctx, &ids) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => op_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.promote" => Some(handle_students_promote(state, req)),
        _ => None,
    }
}
