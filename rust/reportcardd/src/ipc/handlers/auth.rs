use crate::auth::AuthContext;
use crate::ipc::error::{err, ok, op_err};
use crate::ipc::helpers::{auth_ctx, optional_str, required_str, ws, ws_mut};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let teacher = match workspace.login(&email, &password) {
        Ok(v) => v,
        Err(e) => return op_err(&req.id, e),
    };
    let session = state.sessions.issue(&teacher.id);
    ok(
        &req.id,
        json!({
            "session": session,
            "teacher": teacher.public_view(),
        }),
    )
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx: AuthContext = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = workspace.logout(&ctx) {
        return op_err(&req.id, e);
    }
    if let Some(token) = optional_str(req, "session") {
        state.sessions.revoke(&token);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_whoami(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let data = match ws(state, req) {
        Ok(v) => v.data(),
        Err(e) => return e,
    };
    match data.teacher(&ctx.teacher_id) {
        Some(t) => ok(&req.id, json!({ "teacher": t.public_view() })),
        None => err(&req.id, "unauthorized", "session is not valid", None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.whoami" => Some(handle_whoami(state, req)),
        _ => None,
    }
}
