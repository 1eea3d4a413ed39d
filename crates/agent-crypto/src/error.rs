//! Error types for cryptographic operations.

use serde::Serialize;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, thiserror::Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum CryptoError {
    /// A key failed to parse from its wire encoding.
    #[error("Invalid key encoding: {0}")]
    InvalidKey(String),

    /// ECDH agreement failed (only occurs for degenerate/invalid points).
    #[error("Key agreement failed: {0}")]
    AgreementFailed(String),

    /// HMAC verification failed.
    #[error("HMAC verification failed")]
    VerificationFailed,
}

/// Convenience type alias for results using [`CryptoError`].
pub type Result<T> = std::result::Result<T, CryptoError>;
