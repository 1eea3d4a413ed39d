//! Errors the orchestrator reports back up to `agent-core`. Per-peer
//! failures are carried as data inside [`crate::client::PeerOutcome`] rather
//! than through this type — `OrchestratorError` is for failures that
//! prevent the operation from running at all (e.g. the requested peer is
//! not paired).

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("unknown peer {0}")]
    UnknownPeer(String),

    #[error("peer {0} has no known address")]
    NoAddress(String),

    #[error("request to peer timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("peer responded with status {0}")]
    NonSuccessStatus(u16),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
