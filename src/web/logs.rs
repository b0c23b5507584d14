use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use super::AppState;

const DEFAULT_LINES: usize = 200;
const MAX_LINES: usize = 10_000;

#[derive(Debug, Deserialize)]
pub struct TailParams {
    pub lines: Option<usize>,
}

pub async fn logs_tail(
    State(state): State<AppState>,
    Query(params): Query<TailParams>,
) -> impl IntoResponse {
    let max_lines = params.lines.unwrap_or(DEFAULT_LINES).min(MAX_LINES);
    let Some(path) = resolve_log_file_path(&state.log_file).await else {
        return (StatusCode::NOT_FOUND, "Log file not available").into_response();
    };
    match fs::read_to_string(&path).await {
        Ok(contents) => {
            let lines: Vec<&str> = contents.lines().collect();
            let start = lines.len().saturating_sub(max_lines);
            let mut resp = Response::new(lines[start..].join("\n").into());
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            resp
        }
        Err(_) => (StatusCode::NOT_FOUND, "Log file not available").into_response(),
    }
}

/// Directory holding rotated files plus their `<prefix>.*.log` pattern
fn rotation_dir(configured: &Path) -> (PathBuf, String) {
    if configured.extension().is_some() {
        let dir = configured
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        (dir, "ampster".to_string())
    } else {
        (configured.to_path_buf(), "ampster".to_string())
    }
}

async fn find_latest_matching(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    let mut rd = fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = rd.next_entry().await {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !(name.starts_with(prefix) && name.ends_with(".log")) {
            continue;
        }
        if let Ok(md) = entry.metadata().await
            && md.is_file()
            && let Ok(modified) = md.modified()
            && best.as_ref().is_none_or(|(t, _)| modified > *t)
        {
            best = Some((modified, entry.path()));
        }
    }
    best.map(|(_, p)| p)
}

/// The configured file if it exists, else the newest rotated file beside it
pub(crate) async fn resolve_log_file_path(configured_path: &str) -> Option<PathBuf> {
    let configured = Path::new(configured_path);
    if let Ok(md) = fs::metadata(configured).await
        && md.is_file()
    {
        return Some(configured.to_path_buf());
    }
    let (dir, prefix) = rotation_dir(configured);
    find_latest_matching(&dir, &prefix).await
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/logs/tail", get(logs_tail))
}
