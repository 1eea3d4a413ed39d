//! URL routing: `/api/<domain>/<action>[/<param>]` → a domain handler.
//!
//! The table is declared once and consulted by exact-match on domain; each
//! domain handler owns its own action dispatch. `peer` handles its own auth
//! (pairing endpoints are open, P2P data-plane endpoints require HMAC), so
//! the router calls it before the uniform [`AuthGate`] check runs.

use std::sync::Arc;

use agent_auth::{AuthGate, Principal, RequestContext};

use crate::error::AgentError;
use crate::handlers::{apps, contacts, device, files, orchestrator, peer, ping, shell, sms};
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::state::AppState;

/// A parsed `/api/<domain>/<action>[/<param>]` path.
pub struct RoutedPath {
    pub domain: String,
    pub action: String,
    pub param: Option<String>,
}

pub fn split_path(path: &str) -> Result<RoutedPath, AgentError> {
    let trimmed = path.trim_matches('/');
    let mut segments = trimmed.split('/');

    let prefix = segments.next().unwrap_or("");
    if prefix != "api" {
        return Err(AgentError::NotFound(format!("unknown path {path}")));
    }
    let domain = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::NotFound("missing domain segment".to_string()))?
        .to_string();
    let action = segments.next().unwrap_or("").to_string();
    let param = segments.next().map(str::to_string);

    Ok(RoutedPath { domain, action, param })
}

/// Dispatch a parsed request to its domain handler, after authenticating it
/// (except for `peer`, which makes its own auth decisions per action).
pub async fn dispatch(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    if routed.domain == "peer" {
        return peer::handle(request, routed, state).await;
    }

    authenticate(request, state)?;

    match routed.domain.as_str() {
        "ping" => ping::handle(request, state).await,
        "device" => device::handle(request, routed, state).await,
        "files" => files::handle(request, routed, state).await,
        "apps" => apps::handle(request, routed, state).await,
        "contacts" => contacts::handle(request, routed, state).await,
        "sms" => sms::handle(request, routed, state).await,
        "shell" => shell::handle(request, routed, state).await,
        "orchestrator" => orchestrator::handle(request, routed, state).await,
        _ => Err(AgentError::NotFound(format!("unknown domain {}", routed.domain))),
    }
}

pub fn authenticate(request: &ParsedRequest, state: &Arc<AppState>) -> Result<Principal, AgentError> {
    let token_query = request.query_param("token");
    let controller_token = request.header("x-agent-token").or(token_query.as_deref());

    let uri = request.uri();
    let ctx = RequestContext {
        method: &request.method,
        path: &uri,
        peer_address: &request.peer_addr.to_string(),
        is_loopback: request.peer_addr.ip().is_loopback(),
        controller_token,
        peer_id: request.header("x-peer-id"),
        peer_signature: request.header("x-peer-signature"),
        peer_timestamp: request.header("x-peer-timestamp"),
    };
    Ok(state.auth_gate.authenticate(&ctx, &state.pairing_store)?)
}
