//! `orchestrator/*` — fans out signed requests to paired peers through
//! [`agent_orchestrator::Orchestrator`]. The orchestrator only initiates;
//! it never terminates a request the way `peer/*` does.

use std::sync::Arc;

use agent_orchestrator::PeerOutcome;
use agent_protocol::orchestrator::{
    BroadcastOutcome, BroadcastRequest, BroadcastResponse, BroadcastResult, DeployToolkitResponse,
    DispatchRequest, DispatchResponse, OrchestratorStatusResponse, PushToPeerRequest, TopologyEntry,
    TopologyResponse, TransferOrderRequest, TransferOrderResponse,
};

use crate::error::AgentError;
use crate::handlers::required_json;
use crate::http::request::ParsedRequest;
use crate::http::response::HttpResponse;
use crate::router::RoutedPath;
use crate::state::AppState;

pub async fn handle(
    request: &ParsedRequest,
    routed: &RoutedPath,
    state: &Arc<AppState>,
) -> Result<HttpResponse, AgentError> {
    match routed.action.as_str() {
        "topology" => topology(state).await,
        "dispatch" => dispatch(request, state).await,
        "broadcast" => broadcast(request, state).await,
        "transfer" => transfer(request, state).await,
        "deploy-toolkit" => Ok(deploy_toolkit(state)),
        "status" | "sync" => status(state).await,
        other => Err(AgentError::NotFound(format!("unknown orchestrator action {other}"))),
    }
}

async fn topology(state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let peers = state.pairing_store.list();
    let probes = state.orchestrator.topology(&peers).await;
    let entries = probes
        .into_iter()
        .map(|(peer_id, reachable, latency_ms)| TopologyEntry { peer_id, reachable, latency_ms })
        .collect();
    Ok(HttpResponse::ok(&TopologyResponse { peers: entries }))
}

async fn dispatch(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let req: DispatchRequest = required_json(&body)?;
    let peer = state
        .pairing_store
        .get(&req.peer_id)
        .ok_or_else(|| AgentError::NotFound(format!("no paired device {}", req.peer_id)))?;

    let body = state
        .orchestrator
        .dispatch(&peer, &req.method, &req.path, req.body)
        .await
        .map_err(|e| AgentError::Internal(e.to_string()))?;

    Ok(HttpResponse::ok(&DispatchResponse { body }))
}

async fn broadcast(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let req: BroadcastRequest = required_json(&body)?;
    let peers = state.pairing_store.list();

    let outcomes = state.orchestrator.broadcast(&peers, &req.method, &req.path, req.body).await;
    let results = outcomes
        .into_iter()
        .map(|(peer_id, outcome)| BroadcastResult {
            peer_id,
            outcome: match outcome {
                PeerOutcome::Ok(body) => BroadcastOutcome::Ok { body },
                PeerOutcome::Error(error) => BroadcastOutcome::Error { error },
            },
        })
        .collect();

    Ok(HttpResponse::ok(&BroadcastResponse { results }))
}

/// Instructs `source_peer_id` to push a file to `target_peer_id` over
/// TransferService. The orchestrator only places the order — it does not
/// move the bytes itself.
async fn transfer(request: &ParsedRequest, state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let body = request.body_bytes().await?;
    let req: TransferOrderRequest = required_json(&body)?;

    let source = state
        .pairing_store
        .get(&req.source_peer_id)
        .ok_or_else(|| AgentError::NotFound(format!("no paired device {}", req.source_peer_id)))?;
    state
        .pairing_store
        .get(&req.target_peer_id)
        .ok_or_else(|| AgentError::NotFound(format!("no paired device {}", req.target_peer_id)))?;

    let order = PushToPeerRequest {
        target_peer_id: req.target_peer_id.clone(),
        source_path: req.source_path.clone(),
        target_path: req.target_path.clone(),
    };
    let order_body = serde_json::to_value(&order)
        .map_err(|e| AgentError::Internal(format!("failed to encode push-to-peer order: {e}")))?;

    let response = state.orchestrator.dispatch(&source, "POST", "/api/files/push-to-peer", Some(order_body)).await;

    match response {
        Ok(_) => Ok(HttpResponse::ok(&TransferOrderResponse { accepted: true, message: None })),
        Err(e) => Ok(HttpResponse::ok(&TransferOrderResponse { accepted: false, message: Some(e.to_string()) })),
    }
}

fn deploy_toolkit(state: &Arc<AppState>) -> HttpResponse {
    HttpResponse::ok(&DeployToolkitResponse { steps: state.orchestrator.deploy_toolkit_steps() })
}

async fn status(state: &Arc<AppState>) -> Result<HttpResponse, AgentError> {
    let peers = state.pairing_store.list();
    let known_peers = peers.len();
    let probes = state.orchestrator.topology(&peers).await;
    let reachable_peers = probes.iter().filter(|(_, reachable, _)| *reachable).count();
    Ok(HttpResponse::ok(&OrchestratorStatusResponse { known_peers, reachable_peers }))
}
