use crate::ipc::error::{ok, op_err};
use crate::ipc::helpers::{auth_ctx, required_str, ws, ws_mut, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::workspace::SubjectInput;
use serde_json::json;

fn subject_input(req: &Request) -> HandlerResult<SubjectInput> {
    Ok(SubjectInput {
        name: required_str(req, "name")?,
        code: required_str(req, "code")?,
    })
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match ws(state, req) {
        Ok(v) => ok(&req.id, json!({ "subjects": v.data().subjects })),
        Err(e) => e,
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match subject_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.add_subject(&ctx, input) {
        Ok(subject) => ok(&req.id, json!({ "subject": subject })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match subject_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.update_subject(&ctx, &subject_id, input) {
        Ok(subject) => ok(&req.id, json!({ "subject": subject })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.delete_subject(&ctx, &subject_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => op_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
