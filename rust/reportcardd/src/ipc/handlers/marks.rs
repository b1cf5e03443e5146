use crate::ipc::error::{err, ok, op_err};
use crate::ipc::helpers::{auth_ctx, optional_str, required_f64, required_str, ws, ws_mut};
use crate::ipc::types::{AppState, Request};
use crate::workspace::MarkInput;
use serde_json::json;

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = optional_str(req, "studentId");
    let subject_id = optional_str(req, "subjectId");
    let exam_id = optional_str(req, "examId");
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let marks: Vec<_> = data
        .marks
        .iter()
        .filter(|m| student_id.as_deref().map(|s| m.student_id == s).unwrap_or(true))
        .filter(|m| subject_id.as_deref().map(|s| m.subject_id == s).unwrap_or(true))
        .filter(|m| exam_id.as_deref().map(|e| m.exam_id == e).unwrap_or(true))
        .collect();
    ok(&req.id, json!({ "marks": marks }))
}

fn handle_marks_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let score = match required_f64(req, "score") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = MarkInput {
        student_id,
        subject_id,
        exam_id,
        score,
        remarks: optional_str(req, "remarks"),
    };
    match workspace.add_mark(&ctx, input) {
        Ok(mark) => ok(&req.id, json!({ "mark": mark })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_marks_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mark_id = match required_str(req, "markId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let score = match required_f64(req, "score") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.update_mark(&ctx, &mark_id, score, optional_str(req, "remarks")) {
        Ok(mark) => ok(&req.id, json!({ "mark": mark })),
        Err(e) => op_err(&req.id, e),
    }
}

fn handle_marks_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mark_id = match required_str(req, "markId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.delete_mark(&ctx, &mark_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => op_err(&req.id, e),
    }
}

/// `scores` maps student id to score. Non-numeric values are reported as
/// rejected entries rather than failing the whole request.
fn handle_marks_enter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("scores").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "scores must be an object of studentId -> score", None);
    };
    let scores: Vec<(String, f64)> = raw
        .iter()
        .map(|(student_id, v)| (student_id.clone(), v.as_f64().unwrap_or(f64::NAN)))
        .collect();
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.enter_marks(&ctx, &exam_id, &subject_id, &scores) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => op_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.list" => Some(handle_marks_list(state, req)),
        "marks.create" => Some(handle_marks_create(state, req)),
        "marks.update" => Some(handle_marks_update(state, req)),
        "marks.delete" => Some(handle_marks_delete(state, req)),
        "marks.enter" => Some(handle_marks_enter(state, req)),
        _ => None,
    }
}
