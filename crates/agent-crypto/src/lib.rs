//! Cryptographic primitives backing the agent pairing and session protocol.
//!
//! Provides ECDH P-256 key agreement ([`KeyPair`]), HMAC-SHA256 request
//! signing ([`hmac_sign`]), the human-verifiable pairing confirmation code
//! ([`confirm_code`]), and plain SHA-256 content digests ([`digest`]).

pub mod confirm_code;
pub mod digest;
pub mod error;
pub mod hmac_sign;
pub mod keypair;

pub use confirm_code::confirm_code;
pub use digest::{sha256, sha256_hex, StreamingHasher};
pub use error::CryptoError;
pub use hmac_sign::{hmac_hex, verify_hmac};
pub use keypair::KeyPair;
