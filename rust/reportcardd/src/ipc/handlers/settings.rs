use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{auth_ctx, optional_str, required_str, ws};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

pub const SCHOOL_PROFILE_KEY: &str = "school.profile";

/// Without `key`, returns every setting.
fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match ws(state, req) {
        Ok(v) => v.store().conn(),
        Err(e) => return e,
    };
    match optional_str(req, "key") {
        Some(key) => match db::settings_get_json(conn, &key) {
            Ok(value) => ok(&req.id, json!({ "key": key, "value": value })),
            Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
        },
        None => match db::settings_all(conn) {
            Ok(all) => ok(&req.id, json!({ "settings": all })),
            Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
        },
    }
}

fn handle_settings_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !ctx.is_admin() {
        return err(&req.id, "forbidden", "only administrators can change settings", None);
    }
    let key = match required_str(req, "key") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(value) = req.params.get("value") else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    if key == SCHOOL_PROFILE_KEY && !value.is_object() {
        return err(
            &req.id,
            "bad_params",
            "school.profile must be an object",
            Some(json!({ "key": key })),
        );
    }
    let conn = match ws(state, req) {
        Ok(v) => v.store().conn(),
        Err(e) => return e,
    };
    match db::settings_set_json(conn, &key, value) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_save_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.set" => Some(handle_settings_set(state, req)),
        _ => None,
    }
}
