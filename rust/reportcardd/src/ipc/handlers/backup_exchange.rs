use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok, op_err};
use crate::ipc::helpers::{auth_ctx, ws, ws_mut};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let workspace = match ws(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match db::settings_all(workspace.store().conn()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(workspace.data(), &settings, &out) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    };
    info!(path = %out_path, "workspace bundle exported");

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "snapshotSha256": export.snapshot_sha256,
        }),
    )
}

/// Replaces the current workspace contents. Admin only; every session,
/// including the caller's, is dropped afterwards.
fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match auth_ctx(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !ctx.is_admin() {
        return err(&req.id, "forbidden", "only administrators can import backups", None);
    }
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    let import = match backup::import_workspace_bundle(&src) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "backup_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            )
        }
    };

    let workspace = match ws_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = workspace.replace_snapshot(import.snapshot, import.settings.as_ref()) {
        return op_err(&req.id, e);
    }
    let data = workspace.data();
    let counts = json!({
        "students": data.students.len(),
        "subjects": data.subjects.len(),
        "exams": data.exams.len(),
        "marks": data.marks.len(),
        "teachers": data.teachers.len(),
    });
    state.sessions.clear();
    info!(path = %in_path, format = %import.bundle_format_detected, "workspace bundle imported");

    ok(
        &req.id,
        json!({
            "ok": true,
            "bundleFormatDetected": import.bundle_format_detected,
            "counts": counts,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
