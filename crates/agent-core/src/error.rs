//! The unified error type for request handling, and its mapping to the
//! wire error envelope: one enum, `#[from]` conversions, a single place
//! that decides the status code. Mapped to `(u16, ErrorEnvelope)` instead
//! of an `IntoResponse` impl, since this transport has no web framework
//! response type to implement it for.

use agent_protocol::ErrorEnvelope;

/// The seven error kinds from the agent's error handling design. Handlers
/// translate platform-specific failures into one of these; `HashMismatch`
/// is not here because it is reported inside a 200 transfer response, not
/// as a protocol-level error.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    ClientInput(String),

    #[error("missing or invalid token")]
    Unauthenticated,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("not implemented")]
    NotImplemented,

    #[error("auth error: {0}")]
    Auth(#[from] agent_auth::AuthError),

    #[error("crypto error: {0}")]
    Crypto(#[from] agent_crypto::CryptoError),

    #[error("protocol error: {0}")]
    Protocol(#[from] agent_protocol::ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// The HTTP status code and JSON body to send for this error.
    pub fn status_and_body(&self) -> (u16, ErrorEnvelope) {
        let status = match self {
            AgentError::ClientInput(_) => 400,
            AgentError::Unauthenticated => 401,
            AgentError::Unauthorized(_) => 403,
            AgentError::NotFound(_) => 404,
            AgentError::NotImplemented => 501,
            AgentError::ResourceExhausted(_) => 503,
            AgentError::Internal(_) | AgentError::Io(_) => 500,
            AgentError::Auth(e) => auth_status(e),
            AgentError::Crypto(_) => 403,
            AgentError::Protocol(_) => 400,
        };
        (status, ErrorEnvelope::new(self.to_string()))
    }
}

fn auth_status(err: &agent_auth::AuthError) -> u16 {
    match err {
        agent_auth::AuthError::ClientInput(_) => 400,
        agent_auth::AuthError::Unauthenticated => 401,
        agent_auth::AuthError::Unauthorized(_) => 403,
        agent_auth::AuthError::NotFound(_) => 404,
        _ => 500,
    }
}

impl From<AgentError> for agent_protocol::ErrorEnvelope {
    fn from(err: AgentError) -> Self {
        err.status_and_body().1
    }
}
