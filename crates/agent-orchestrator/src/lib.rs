//! Outbound signed-HTTP client used by `agent-core`'s `orchestrator` domain
//! handler to talk to paired peers: topology probes, single-peer dispatch,
//! broadcast fan-out, and transfer orchestration.

pub mod client;
pub mod error;

pub use client::{Orchestrator, PeerOutcome};
pub use error::OrchestratorError;
