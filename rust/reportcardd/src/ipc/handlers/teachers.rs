use crate::ipc::error::{err, ok, op_err};
use crate::ipc::helpers::{
    auth_ctx, optional_str, required_str, string_list, ws, ws_mut, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use crate::workspace::TeacherInput;
use serde_json::json;

fn teacher_input(req: &Request) -> HandlerResult<TeacherInput> {
    let role = match optional_str(req, "role") {
        None => Role::Teacher,
        Some(raw) => Role::parse(&raw).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "role must be one of: teacher, admin",
                Some(json!({ "role": raw })),
            )
        })?,
    };
    Ok(TeacherInput {
        first_name: required_str(req, "firstName")?,
        last_name: required_str(req, "lastName")?,
        email: required_str(req, "email")?,
        password: optional_str(req, "password"),
        subject_ids: string_list(req, "subjectIds")?,
        role,
    })
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let teachers: Vec<serde_json::Value> = data.teachers.iter().map(|t| t.public_view()).collect();
    ok(&req.id, json!({ "teachers": teachers }))
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match teacher_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.add_teacher(&ctx, input) {
        Ok(t) => ok(&req.id, json!({ "teacher": t.public_view() })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match teacher_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.update_teacher(&ctx, &teacher_id, input) {
        Ok(t) => ok(&req.id, json!({ "teacher": t.public_view() })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.delete_teacher(&ctx, &teacher_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => op_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        _ => None,
    }
}
