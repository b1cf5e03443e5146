mod auth;
mod backup;
mod calc;
mod db;
mod grading;
mod ipc;
mod model;
mod reports;
mod workspace;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn init_logging() {
    // stdout carries the protocol, so logs only ever go to stderr.
    let filter = EnvFilter::try_from_env("REPORTCARDD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(stderr_layer).init();
}

fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let mut state = ipc::AppState::default();
    if let Ok(path) = std::env::var("REPORTCARDD_WORKSPACE") {
        let path = PathBuf::from(path);
        match ipc::open_workspace(&mut state, &path) {
            Ok(()) => info!(path = %path.display(), "workspace selected from environment"),
            Err(e) => error!(
                path = %path.display(),
                error = %format!("{e:#}"),
                "failed to open workspace"
            ),
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "reportcardd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, exiting");
}
