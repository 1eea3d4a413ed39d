//! `shell/*` — remote command execution, backed by a [`ShellProvider`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AgentError;
use crate::handlers::body_json;
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::router::RoutedPath;
use crate::state::AppState;

const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);
const MAX_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Deserialize, Default)]
struct ExecRequest {
    command: String,
    #[serde(default)]
    deadline_ms: Option<u64>,
}

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    let provider = &state.shell_provider;

    match routed.action.as_str() {
        "exec" => {
            let body = request.body_bytes().await?;
            let parsed: ExecRequest = body_json(&body)?;
            if parsed.command.trim().is_empty() {
                return Err(AgentError::ClientInput("missing command".to_string()));
            }
            let deadline = parsed
                .deadline_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DEADLINE)
                .min(MAX_DEADLINE);
            let result = provider.exec(&parsed.command, deadline).await?;
            Ok(HttpResponse::ok(&result))
        }
        // The transport has no chunked/incremental response body, so this
        // reports itself as unimplemented rather than silently behaving
        // like a buffered `exec`.
        "exec-stream" => Err(AgentError::NotImplemented),
        "getprop" => {
            let key = request
                .query_param("key")
                .ok_or_else(|| AgentError::ClientInput("missing key parameter".to_string()))?;
            match provider.getprop(&key) {
                Some(value) => Ok(HttpResponse::ok(&serde_json::json!({"key": key, "value": value}))),
                None => Err(AgentError::NotFound(format!("property {key} not set"))),
            }
        }
        "settings" => settings(request, state).await,
        other => Err(AgentError::NotFound(format!("unknown shell action {other}"))),
    }
}

#[derive(Deserialize, Default)]
struct SettingsWriteRequest {
    namespace: String,
    key: String,
    value: String,
}

async fn settings(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    match request.method.as_str() {
        "GET" => {
            let namespace = request
                .query_param("namespace")
                .ok_or_else(|| AgentError::ClientInput("missing namespace parameter".to_string()))?;
            let key = request
                .query_param("key")
                .ok_or_else(|| AgentError::ClientInput("missing key parameter".to_string()))?;
            let command = format!("settings get {namespace} {key}");
            let result = state.shell_provider.exec(&command, DEFAULT_DEADLINE).await?;
            Ok(HttpResponse::ok(&serde_json::json!({"value": result.stdout.trim()})))
        }
        "POST" | "PUT" => {
            let body = request.body_bytes().await?;
            let parsed: SettingsWriteRequest = body_json(&body)?;
            let command = format!("settings put {} {} {}", parsed.namespace, parsed.key, parsed.value);
            let result = state.shell_provider.exec(&command, DEFAULT_DEADLINE).await?;
            if result.exit_code != 0 {
                return Err(AgentError::Internal(format!("settings put failed: {}", result.stderr)));
            }
            Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
        }
        other => Err(AgentError::ClientInput(format!("unsupported method {other} for settings"))),
    }
}
