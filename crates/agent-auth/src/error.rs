//! Error types for pairing storage and request authentication.

/// Errors that can occur while validating a request or mutating the
/// pairing store. Each variant maps to one of the error kinds in the
/// agent's error handling design (ClientInput / Unauthenticated /
/// Unauthorized / NotFound); the HTTP layer performs that mapping.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Headers present but malformed (bad timestamp, non-hex signature).
    #[error("Malformed auth headers: {0}")]
    ClientInput(String),

    /// Controller token missing or does not match.
    #[error("Missing or invalid controller token")]
    Unauthenticated,

    /// Peer HMAC invalid, peer unknown/untrusted, stale timestamp, or a
    /// pairing-only check (biometric assertion, insecure device) failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced pairing challenge or peer does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The pairing store's backing file could not be read or written.
    #[error("Pairing store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pairing store's backing file was not valid JSON.
    #[error("Pairing store corrupt: {0}")]
    Serialization(String),

    /// A cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] agent_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unauthorized() {
        let err = AuthError::Unauthorized("HMAC verification failed".to_string());
        assert_eq!(err.to_string(), "Unauthorized: HMAC verification failed");
    }

    #[test]
    fn error_display_not_found() {
        let err = AuthError::NotFound("challenge abc123".to_string());
        assert_eq!(err.to_string(), "Not found: challenge abc123");
    }

    #[test]
    fn error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(AuthError::Unauthenticated);
        assert!(err.to_string().contains("token"));
    }
}
