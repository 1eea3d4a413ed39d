//! `peer/*` — the pairing state machine and HMAC-authenticated P2P data
//! plane. Unlike every other domain, `peer` decides its own authentication
//! per action: pairing endpoints are open, `send`/`request`/`relay` require
//! a verified peer HMAC.

use std::sync::Arc;

use agent_protocol::peer::{
    DiscoverEntry, DiscoverResponse, IdentityResponse, PairApproveRequest, PairApproveResponse,
    PairInitRequest, PairInitResponse, PairPendingEntry, PairPendingResponse, PairRejectRequest,
    PairedDeviceWire, PairedListResponse, PeerQueryRequest, PeerQueryResponse, RelayRequest,
    RevokeAllRequest, RevokeRequest,
};

use crate::error::AgentError;
use crate::handlers::required_json;
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::router::{self, RoutedPath};
use crate::state::AppState;

/// Platform property key a [`crate::providers::DeviceProvider`] sets to
/// `"true"` when the device has a screen lock configured. The host build
/// has no generic way to determine this and defaults to absent, so
/// `pair-approve` conservatively refuses on a bare host build until a real
/// platform provider wires the check.
const SCREEN_LOCK_PROP: &str = "screen_lock_enabled";

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    match routed.action.as_str() {
        "identity" => identity(state).await,
        "discover" => discover(state).await,
        "pair-init" => pair_init(request, state).await,
        "pair-pending" => pair_pending(state).await,
        "pair-approve" => pair_approve(request, state).await,
        "pair-reject" => pair_reject(request, state).await,
        "paired" => paired(request, state).await,
        "revoke" => revoke(request, state).await,
        "revoke-all" => revoke_all(request, state).await,
        "send" | "request" | "relay" => {
            let principal = authenticate_peer(request, state)?;
            match routed.action.as_str() {
                "send" => send(request, state, &principal).await,
                "request" => peer_request(request, state, &principal).await,
                _ => relay(request).await,
            }
        }
        other => Err(AgentError::NotFound(format!("unknown peer action {other}"))),
    }
}

fn to_wire(device: &agent_auth::PairedDevice) -> PairedDeviceWire {
    let view = device.public_view();
    PairedDeviceWire {
        peer_id: view.peer_id,
        human_label: view.human_label,
        peer_public_key: view.peer_public_key,
        last_known_address: view.last_known_address,
        paired_at: view.paired_at,
        last_seen: view.last_seen,
        trusted: view.trusted,
    }
}

async fn identity(state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    Ok(HttpResponse::ok(&IdentityResponse {
        device_id: state.pairing_store.device_id(),
        label: state.config.device_label.clone(),
        public_key: state.pairing_store.public_key_bytes(),
    }))
}

async fn discover(state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let peers = state
        .discovered_peers
        .iter()
        .map(|entry| DiscoverEntry {
            service_name: entry.key().clone(),
            host: entry.value().0.clone(),
            port: entry.value().1,
        })
        .collect();
    Ok(HttpResponse::ok(&DiscoverResponse { peers }))
}

async fn pair_init(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let req: PairInitRequest = required_json(&body)?;

    if state.pairing_store.get(&req.device_id).is_some() {
        return Ok(HttpResponse::ok(&PairInitResponse::AlreadyPaired {
            public_key: state.pairing_store.public_key_bytes(),
        }));
    }

    let peer_address = request.peer_addr.to_string();
    let pending = state.pairing_store.create_pending(req.device_id, req.label, req.public_key, peer_address)?;

    Ok(HttpResponse::ok(&PairInitResponse::PendingApproval {
        challenge_id: pending.challenge_id,
        public_key: state.pairing_store.public_key_bytes(),
        confirm_code: pending.confirm_code,
    }))
}

async fn pair_pending(state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let pending = state
        .pairing_store
        .list_pending()
        .into_iter()
        .map(|p| PairPendingEntry {
            challenge_id: p.challenge_id,
            peer_id: p.peer_id,
            peer_label: p.peer_label,
            confirm_code: p.confirm_code,
            created_at: p.created_at,
        })
        .collect();
    Ok(HttpResponse::ok(&PairPendingResponse { pending }))
}

async fn pair_approve(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let req: PairApproveRequest = required_json(&body)?;

    if !req.biometric_verified {
        return Err(AgentError::Unauthorized("pairing approval requires a biometric assertion".to_string()));
    }
    if state.device_provider.props().get(SCREEN_LOCK_PROP).map(String::as_str) != Some("true") {
        return Err(AgentError::Unauthorized("cannot pair while the device has no screen lock".to_string()));
    }

    let device = state
        .pairing_store
        .approve(&req.challenge_id)?
        .ok_or_else(|| AgentError::NotFound(format!("no pending pairing {}", req.challenge_id)))?;

    Ok(HttpResponse::ok(&PairApproveResponse {
        public_key: state.pairing_store.public_key_bytes(),
        peer: to_wire(&device),
    }))
}

async fn pair_reject(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let req: PairRejectRequest = required_json(&body)?;
    state.pairing_store.reject(&req.challenge_id);
    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
}

async fn paired(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    router::authenticate(request, state)?;
    let peers = state.pairing_store.list().iter().map(to_wire).collect();
    Ok(HttpResponse::ok(&PairedListResponse { peers }))
}

async fn revoke(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    router::authenticate(request, state)?;
    let body = request.body_bytes().await?;
    let req: RevokeRequest = required_json(&body)?;
    if !req.biometric_verified {
        return Err(AgentError::Unauthorized("revoke requires a biometric assertion".to_string()));
    }
    let removed = state.pairing_store.revoke(&req.peer_id)?;
    if !removed {
        return Err(AgentError::NotFound(format!("unknown peer {}", req.peer_id)));
    }
    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
}

async fn revoke_all(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    router::authenticate(request, state)?;
    let body = request.body_bytes().await?;
    let req: RevokeAllRequest = required_json(&body)?;
    if !req.biometric_verified {
        return Err(AgentError::Unauthorized("revoke-all requires a biometric assertion".to_string()));
    }
    state.pairing_store.revoke_all()?;
    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok"})))
}

fn authenticate_peer(request: &ParsedRequest, state: &Arc<AppState>) -> Result<agent_auth::Principal, AgentError> {
    let principal = router::authenticate(request, state)?;
    match principal {
        agent_auth::Principal::Peer(id) => Ok(agent_auth::Principal::Peer(id)),
        agent_auth::Principal::Controller => {
            Err(AgentError::Unauthorized("this endpoint requires peer HMAC authentication".to_string()))
        }
    }
}

async fn send(
    request: &ParsedRequest,
    _state: &Arc<AppState>,
    principal: &agent_auth::Principal,
) -> Result<HttpResponse, AgentError> {
    let agent_auth::Principal::Peer(peer_id) = principal else { unreachable!() };
    let body = request.body_bytes().await?;
    tracing::info!(peer_id, bytes = body.len(), "received peer send");
    Ok(HttpResponse::ok(&serde_json::json!({"status": "ok", "received_bytes": body.len()})))
}

async fn peer_request(
    request: &ParsedRequest,
    state: &Arc<AppState>,
    _principal: &agent_auth::Principal,
) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let req: PeerQueryRequest = required_json(&body)?;

    let routed = RoutedPath { domain: req.domain.clone(), action: req.action.clone(), param: None };
    let inner = match routed.domain.as_str() {
        "device" => crate::handlers::device::handle(request, &routed, state).await?,
        "ping" => crate::handlers::ping::handle(request, state).await?,
        _ => return Err(AgentError::ClientInput(format!("domain {} is not reachable via peer/request", req.domain))),
    };

    let body_value: serde_json::Value = match &inner.body {
        crate::http::response::ResponseBody::Json(bytes) => {
            serde_json::from_slice(bytes).unwrap_or(serde_json::Value::Null)
        }
        crate::http::response::ResponseBody::Binary { .. } => serde_json::Value::Null,
    };
    Ok(HttpResponse::ok(&PeerQueryResponse { body: body_value }))
}

/// Relaying through a third peer is deliberately left unimplemented rather
/// than inventing proxy semantics.
async fn relay(request: &ParsedRequest) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let _req: RelayRequest = required_json(&body)?;
    Err(AgentError::NotImplemented)
}
