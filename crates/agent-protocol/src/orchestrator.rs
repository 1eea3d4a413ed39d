//! Wire types for `/api/orchestrator/*`, shared by `agent-core` (which
//! serves them) and `agent-client` (which constructs and interprets them).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologyEntry {
    pub peer_id: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopologyResponse {
    pub peers: Vec<TopologyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchRequest {
    pub peer_id: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResponse {
    pub body: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastRequest {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// One peer's outcome within a broadcast fan-out. Failures are represented
/// rather than dropped, so a broadcast result always has one entry per
/// paired peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BroadcastOutcome {
    Ok { body: Value },
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastResult {
    pub peer_id: String,
    #[serde(flatten)]
    pub outcome: BroadcastOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastResponse {
    pub results: Vec<BroadcastResult>,
}

/// `orchestrator/transfer`: the orchestrator only initiates — it instructs
/// `source_peer_id` to export `source_path` and push it to
/// `target_peer_id`'s advertised address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferOrderRequest {
    pub source_peer_id: String,
    pub target_peer_id: String,
    pub source_path: String,
    pub target_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferOrderResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `files/push-to-peer`: what the orchestrator hands the source peer to
/// carry out a `TransferOrderRequest` — `target_peer_id` must already be one
/// of the source's own paired devices, since the source signs the
/// TransferService push with that pairing's shared secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushToPeerRequest {
    pub target_peer_id: String,
    pub source_path: String,
    pub target_path: String,
}

/// `orchestrator/deploy-toolkit`: the ordered steps for pushing the agent
/// binary to another peer. Execution is client-driven; the core only
/// returns the plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployToolkitResponse {
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorStatusResponse {
    pub known_peers: usize,
    pub reachable_peers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_result_flattens_outcome_alongside_peer_id() {
        let result = BroadcastResult {
            peer_id: "peer-1".to_string(),
            outcome: BroadcastOutcome::Error { error: "timeout".to_string() },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["peer_id"], "peer-1");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "timeout");
    }

    #[test]
    fn broadcast_ok_round_trips() {
        let result = BroadcastResult {
            peer_id: "peer-2".to_string(),
            outcome: BroadcastOutcome::Ok { body: serde_json::json!({"version": "1.0"}) },
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: BroadcastResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn deploy_toolkit_steps_preserve_order() {
        let resp = DeployToolkitResponse {
            steps: vec!["download".into(), "send".into(), "install".into()],
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: DeployToolkitResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp.steps, back.steps);
    }
}
