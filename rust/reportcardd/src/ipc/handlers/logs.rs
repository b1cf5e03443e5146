use crate::ipc::error::ok;
use crate::ipc::helpers::{optional_str, ws};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::json;

fn handle_logs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    let view = reports::activity_logs(
        data,
        optional_str(req, "search").as_deref(),
        optional_str(req, "action").as_deref(),
    );
    ok(&req.id, json!(view))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "logs.list" => Some(handle_logs_list(state, req)),
        _ => None,
    }
}
