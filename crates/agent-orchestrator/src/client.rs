//! Outbound counterpart to `agent-core`'s `peer` domain: builds signed HTTP
//! requests against paired peers and never lets one peer's failure abort a
//! batch operation.
//!
//! There is no persistent connection to manage — each operation is an
//! independent, timeout-bounded `reqwest` call, so the whole module is a
//! handful of async functions over a shared [`reqwest::Client`] rather than
//! a background task with a command channel.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use agent_auth::PairedDevice;
use serde_json::Value;

use crate::error::{OrchestratorError, Result};

/// Per-request timeout for everything except `topology`, which uses
/// [`TOPOLOGY_PROBE_TIMEOUT`] so an unreachable peer doesn't stall the
/// whole probe.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TOPOLOGY_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// One peer's outcome from a fan-out operation — never an `Err`, so callers
/// can always produce one entry per peer.
#[derive(Debug, Clone)]
pub enum PeerOutcome {
    Ok(Value),
    Error(String),
}

pub struct Orchestrator {
    http: reqwest::Client,
    device_id: String,
}

impl Orchestrator {
    pub fn new(device_id: String) -> Self {
        Self { http: reqwest::Client::new(), device_id }
    }

    /// Probe every given peer in parallel with a short timeout, reporting
    /// reachability and round-trip latency.
    pub async fn topology(&self, peers: &[PairedDevice]) -> Vec<(String, bool, Option<u64>)> {
        let probes = peers.iter().map(|peer| async move {
            let started = SystemTime::now();
            let url = format!("http://{}/api/ping", peer.last_known_address);
            let reachable = self
                .http
                .get(&url)
                .timeout(TOPOLOGY_PROBE_TIMEOUT)
                .send()
                .await
                .map(|resp| resp.status().is_success())
                .unwrap_or(false);
            let latency_ms = reachable.then(|| elapsed_ms(started));
            (peer.peer_id.clone(), reachable, latency_ms)
        });
        futures_join_all(probes).await
    }

    /// Send a single signed request to `peer`, returning its body verbatim.
    pub async fn dispatch(&self, peer: &PairedDevice, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        self.send_signed(peer, method, path, body).await
    }

    /// Send the same request to every peer in parallel; each peer's
    /// success or failure becomes one [`PeerOutcome`] — the batch never
    /// aborts early.
    pub async fn broadcast(&self, peers: &[PairedDevice], method: &str, path: &str, body: Option<Value>) -> Vec<(String, PeerOutcome)> {
        let calls = peers.iter().map(|peer| async move {
            let outcome = match self.send_signed(peer, method, path, body.clone()).await {
                Ok(value) => PeerOutcome::Ok(value),
                Err(e) => PeerOutcome::Error(e.to_string()),
            };
            (peer.peer_id.clone(), outcome)
        });
        futures_join_all(calls).await
    }

    /// The steps for pushing the agent binary to another peer. Execution is
    /// client-driven; this only returns the plan.
    pub fn deploy_toolkit_steps(&self) -> Vec<String> {
        vec![
            "download the agent-core binary for the target platform".to_string(),
            "send it to the target peer over TransferService".to_string(),
            "invoke shell/exec on the target peer to install and start it".to_string(),
        ]
    }

    async fn send_signed(&self, peer: &PairedDevice, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let timestamp = now_millis().to_string();
        let message = agent_auth::auth_gate::canonical_message(method, path, &timestamp);
        let signature = agent_crypto::hmac_hex(&peer.shared_secret, &message);

        let url = format!("http://{}{}", peer.last_known_address, path);
        let mut request = self
            .http
            .request(
                method.parse().map_err(|_| OrchestratorError::Transport(format!("invalid method {method}")))?,
                &url,
            )
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .header("X-Peer-Id", &self.device_id)
            .header("X-Peer-Signature", signature)
            .header("X-Peer-Timestamp", timestamp);

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                OrchestratorError::Timeout
            } else {
                OrchestratorError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(OrchestratorError::NonSuccessStatus(response.status().as_u16()));
        }

        response.json().await.map_err(|e| OrchestratorError::Transport(e.to_string()))
    }
}

/// `futures_util::future::join_all` would be the obvious pick, but pulling
/// in the whole `futures-util` dependency for one helper isn't worth it
/// here — spawning one task per future achieves the same "don't let a slow
/// peer block others" behavior.
async fn futures_join_all<F, T>(iter: impl Iterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = iter.map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(value) = handle.await {
            results.push(value);
        }
    }
    results
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn elapsed_ms(started: SystemTime) -> u64 {
    SystemTime::now().duration_since(started).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(peer_id: &str, address: &str) -> PairedDevice {
        PairedDevice {
            peer_id: peer_id.to_string(),
            human_label: "test".to_string(),
            peer_public_key: vec![4, 1, 2, 3],
            shared_secret: [7u8; 32],
            last_known_address: address.to_string(),
            paired_at: 0,
            last_seen: 0,
            trusted: true,
        }
    }

    #[tokio::test]
    async fn topology_reports_unreachable_peer() {
        let orchestrator = Orchestrator::new("local-device".to_string());
        let peers = vec![device("peer-1", "127.0.0.1:1")];
        let results = orchestrator.topology(&peers).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].1);
    }

    #[tokio::test]
    async fn broadcast_reports_one_outcome_per_peer_on_failure() {
        let orchestrator = Orchestrator::new("local-device".to_string());
        let peers = vec![device("peer-1", "127.0.0.1:1"), device("peer-2", "127.0.0.1:2")];
        let results = orchestrator.broadcast(&peers, "GET", "/api/ping", None).await;
        assert_eq!(results.len(), 2);
        for (_, outcome) in &results {
            assert!(matches!(outcome, PeerOutcome::Error(_)));
        }
    }

    #[test]
    fn deploy_toolkit_steps_are_ordered() {
        let orchestrator = Orchestrator::new("local-device".to_string());
        let steps = orchestrator.deploy_toolkit_steps();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].contains("download"));
    }
}
