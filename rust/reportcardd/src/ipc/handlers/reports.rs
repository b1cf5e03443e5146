use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::settings::SCHOOL_PROFILE_KEY;
use crate::ipc::helpers::{optional_str, report_scope, required_i64, required_str, ws};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::json;

fn handle_student_report_card_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace = match ws(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year = match required_i64(req, "year") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = match required_i64(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(card) = reports::student_report_card(workspace.data(), &student_id, year, term) else {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    };
    let school = match db::settings_get_json(workspace.store().conn(), SCHOOL_PROFILE_KEY) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };

    let mut model = json!(card);
    model["school"] = school.unwrap_or(serde_json::Value::Null);
    ok(&req.id, model)
}

fn handle_form_report_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let scope = match report_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!(reports::form_report(data, &scope)))
}

/// The viewer comes from `session` when one is given; without it the
/// dashboard is unfiltered.
fn handle_dashboard_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let viewer = match optional_str(req, "session") {
        Some(token) => match state.sessions.resolve(&token, data) {
            Some(ctx) => data.teacher(&ctx.teacher_id),
            None => return err(&req.id, "unauthorized", "session is not valid", None),
        },
        None => None,
    };
    ok(&req.id, json!(reports::dashboard(data, viewer)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentReportCardModel" => Some(handle_student_report_card_model(state, req)),
        "reports.formReportModel" => Some(handle_form_report_model(state, req)),
        "reports.dashboardModel" => Some(handle_dashboard_model(state, req)),
        _ => None,
    }
}
