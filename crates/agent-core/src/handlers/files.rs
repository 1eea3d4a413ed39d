//! `files/*` — filesystem operations on device-accessible storage.
//!
//! Every action resolves its `path` query parameter against
//! [`AppState::files_root`] through [`resolve_path`], which rejects `..`
//! traversal before any I/O happens.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use agent_protocol::orchestrator::PushToPeerRequest;
use serde::Serialize;

use crate::error::AgentError;
use crate::handlers::required_json;
use crate::http::request::{ParsedRequest, RequestBody};
use crate::http::response::HttpResponse;
use crate::router::RoutedPath;
use crate::state::AppState;

const SEARCH_RESULT_CAP: usize = 500;

#[derive(Debug, Serialize)]
struct FileEntry {
    name: String,
    path: String,
    is_dir: bool,
    size: u64,
    modified_ms: u64,
    readable: bool,
    writable: bool,
}

#[derive(Serialize)]
struct ListResponse {
    count: usize,
    files: Vec<FileEntry>,
}

#[derive(Serialize)]
struct StorageResponse {
    total_bytes: u64,
    free_bytes: u64,
    used_bytes: u64,
}

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    match routed.action.as_str() {
        "list" => list(request, state).await,
        "read" => read(request, state).await,
        "write" => write(request, state).await,
        "stat" => stat(request, state).await,
        "exists" => exists(request, state).await,
        "hash" => hash(request, state).await,
        "mkdir" => mkdir(request, state).await,
        "delete" => delete(request, state).await,
        "search" => search(request, state).await,
        "storage" => storage(request, state).await,
        "push-to-peer" => push_to_peer(request, state).await,
        other => Err(AgentError::NotFound(format!("unknown files action {other}"))),
    }
}

/// Resolve `raw` against the sandbox root, rejecting any path whose
/// normalized form escapes it.
fn resolve_path(root: &Path, raw: &str) -> Result<PathBuf, AgentError> {
    let relative = raw.trim_start_matches('/');
    if relative.split('/').any(|seg| seg == "..") {
        return Err(AgentError::ClientInput(format!("path escapes sandbox: {raw}")));
    }
    Ok(root.join(relative))
}

fn required_path(request: &ParsedRequest) -> Result<String, AgentError> {
    request
        .query_param("path")
        .ok_or_else(|| AgentError::ClientInput("missing path parameter".to_string()))
}

async fn list(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(&path).await.map_err(AgentError::Io)?;
    while let Some(entry) = dir.next_entry().await.map_err(AgentError::Io)? {
        let meta = entry.metadata().await.map_err(AgentError::Io)?;
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path().display().to_string(),
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified_ms: modified_ms(&meta),
            readable: true,
            writable: !meta.permissions().readonly(),
        });
    }
    Ok(HttpResponse::ok(&ListResponse { count: entries.len(), files: entries }))
}

async fn read(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    let data = tokio::fs::read(&path).await.map_err(AgentError::Io)?;
    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Ok(HttpResponse::binary(200, "application/octet-stream", data)
        .with_header("Content-Disposition", format!("attachment; filename=\"{filename}\"")))
}

async fn write(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(AgentError::Io)?;
    }

    let written = match &request.body {
        RequestBody::Memory(bytes) => {
            tokio::fs::write(&path, bytes).await.map_err(AgentError::Io)?;
            bytes.len() as u64
        }
        RequestBody::TempFile(temp) => {
            tokio::fs::copy(temp, &path).await.map_err(AgentError::Io)?
        }
    };

    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok", "written": written})))
}

async fn stat(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    let meta = tokio::fs::metadata(&path).await.map_err(|_| AgentError::NotFound(format!("{} not found", path.display())))?;
    Ok(HttpResponse::ok(&serde_json::json!({
        "exists": true,
        "is_dir": meta.is_dir(),
        "size": meta.len(),
        "modified_ms": modified_ms(&meta),
    })))
}

async fn exists(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    Ok(HttpResponse::ok(&serde_json::json!({"exists": path.exists()})))
}

async fn hash(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    let mut file = tokio::fs::File::open(&path).await.map_err(AgentError::Io)?;
    let mut hasher = agent_crypto::StreamingHasher::new();
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = tokio::io::AsyncReadExt::read(&mut file, &mut buf).await.map_err(AgentError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>();
    Ok(HttpResponse::ok(&serde_json::json!({"sha256": digest})))
}

async fn mkdir(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    tokio::fs::create_dir_all(&path).await.map_err(AgentError::Io)?;
    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
}

async fn delete(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = resolve_path(&state.files_root, &required_path(request)?)?;
    let meta = tokio::fs::metadata(&path).await.map_err(|_| AgentError::NotFound(format!("{} not found", path.display())))?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(&path).await.map_err(AgentError::Io)?;
    } else {
        tokio::fs::remove_file(&path).await.map_err(AgentError::Io)?;
    }
    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
}

async fn search(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let root = resolve_path(&state.files_root, &required_path(request)?)?;
    let needle = request
        .query_param("query")
        .ok_or_else(|| AgentError::ClientInput("missing query parameter".to_string()))?
        .to_lowercase();

    let mut matches = Vec::new();
    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        if matches.len() >= SEARCH_RESULT_CAP {
            break;
        }
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if matches.len() >= SEARCH_RESULT_CAP {
                break;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.contains(&needle) {
                matches.push(path.display().to_string());
            }
            if let Ok(meta) = entry.metadata().await {
                if meta.is_dir() {
                    stack.push(path);
                }
            }
        }
    }

    Ok(HttpResponse::ok(&serde_json::json!({"count": matches.len(), "matches": matches})))
}

async fn storage(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let path = request
        .query_param("path")
        .map(|p| resolve_path(&state.files_root, &p))
        .transpose()?
        .unwrap_or_else(|| state.files_root.clone());
    let info = state.device_provider.storage(&path)?;
    Ok(HttpResponse::ok(&StorageResponse {
        total_bytes: info.total_bytes,
        free_bytes: info.free_bytes,
        used_bytes: info.total_bytes.saturating_sub(info.free_bytes),
    }))
}

/// Carries out an orchestrator transfer order: pushes a local file to one
/// of this device's own paired peers over TransferService, acting as the
/// client side of the push rather than the server side.
async fn push_to_peer(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let order: PushToPeerRequest = required_json(&body)?;

    let peer = state
        .pairing_store
        .get(&order.target_peer_id)
        .ok_or_else(|| AgentError::NotFound(format!("no paired device {}", order.target_peer_id)))?;
    let local_path = resolve_path(&state.files_root, &order.source_path)?;

    crate::transfer::push_file(&peer, &state.pairing_store.device_id(), &local_path, &order.target_path).await?;
    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
}

fn modified_ms(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
