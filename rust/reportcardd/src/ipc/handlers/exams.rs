use crate::ipc::error::{err, ok, op_err};
use crate::ipc::helpers::{
    auth_ctx, optional_i64, optional_str, required_i64, required_str, ws, ws_mut, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::ExamType;
use crate::workspace::ExamInput;
use serde_json::json;

fn exam_input(req: &Request) -> HandlerResult<ExamInput> {
    let raw_type = required_str(req, "type")?;
    let exam_type = ExamType::parse(&raw_type).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "type must be one of: TermStart, MidTerm, EndTerm, Custom",
            Some(json!({ "type": raw_type })),
        )
    })?;
    Ok(ExamInput {
        name: required_str(req, "name")?,
        exam_type,
        term: required_i64(req, "term")?,
        year: required_i64(req, "year")?,
        form: required_i64(req, "form")?,
        date: optional_str(req, "date").unwrap_or_default(),
    })
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form = match optional_i64(req, "form") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = match optional_i64(req, "year") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match optional_i64(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let exams: Vec<_> = data
        .exams
        .iter()
        .filter(|e| form.map(|f| e.form == f).unwrap_or(true))
        .filter(|e| year.map(|y| e.year == y).unwrap_or(true))
        .filter(|e| term.map(|t| e.term == t).unwrap_or(true))
        .collect();
    ok(&req.id, json!({ "exams": exams }))
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match exam_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workspace.add_exam(&ctx, input) {
        Ok(exam) => ok(&req.id, json!({ "exam": exam })),
        Err(e) => op_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.create" => Some(handle_exams_create(state, req)),
        _ => None,
    }
}
