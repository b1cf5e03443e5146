use serde_json::json;

use crate::auth::AuthContext;
use crate::calc::{ExamSelector, ReportScope};
use crate::db::SqliteStore;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::workspace::Workspace;

pub type HandlerResult<T> = Result<T, serde_json::Value>;

pub fn required_str(req: &Request, key: &str) -> HandlerResult<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent, null and blank strings all read as `None`.
pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required_i64(req: &Request, key: &str) -> HandlerResult<i64> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => {
            Err(err(&req.id, "bad_params", format!("missing {}", key), None))
        }
        Some(v) => v.as_i64().ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be an integer", key),
                Some(json!({ key: v })),
            )
        }),
    }
}

pub fn optional_i64(req: &Request, key: &str) -> HandlerResult<Option<i64>> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => required_i64(req, key).map(Some),
    }
}

pub fn required_f64(req: &Request, key: &str) -> HandlerResult<f64> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn string_list(req: &Request, key: &str) -> HandlerResult<Vec<String>> {
    let Some(raw) = req.params.get(key) else {
        return Ok(Vec::new());
    };
    let Some(items) = raw.as_array() else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be an array of strings", key),
            None,
        ));
    };
    items
        .iter()
        .map(|v| {
            v.as_str().map(|s| s.to_string()).ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be an array of strings", key),
                    None,
                )
            })
        })
        .collect()
}

pub fn ws<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a Workspace<SqliteStore>> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn ws_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> HandlerResult<&'a mut Workspace<SqliteStore>> {
    state
        .db
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Resolves `params.session` against the live roster.
pub fn auth_ctx(state: &AppState, req: &Request) -> HandlerResult<AuthContext> {
    let data = ws(state, req)?.data();
    let Some(token) = optional_str(req, "session") else {
        return Err(err(&req.id, "unauthorized", "login required", None));
    };
    state
        .sessions
        .resolve(&token, data)
        .ok_or_else(|| err(&req.id, "unauthorized", "session is not valid", None))
}

/// `form`, `year`, `term` and an optional `examId` (`"all"` for every exam).
pub fn report_scope(req: &Request) -> HandlerResult<ReportScope> {
    Ok(ReportScope {
        form: required_i64(req, "form")?,
        year: required_i64(req, "year")?,
        term: required_i64(req, "term")?,
        exam: ExamSelector::parse(optional_str(req, "examId").as_deref()),
    })
}
