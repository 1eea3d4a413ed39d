//! HMAC-SHA256 signing and constant-time verification for session requests.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Compute `HMAC-SHA256(secret, message)` and return it as lowercase hex.
pub fn hmac_hex(secret: &[u8], message: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    let tag = mac.finalize().into_bytes();
    hex_lower(&tag)
}

/// Verify a lowercase-hex HMAC-SHA256 tag against `secret` and `message` in
/// constant time.
pub fn verify_hmac(secret: &[u8], message: &str, signature_hex: &str) -> Result<()> {
    let expected = hmac_hex(secret, message);
    let matches = expected.as_bytes().ct_eq(signature_hex.as_bytes()).into();
    if matches {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_signature() {
        let secret = b"shared-secret";
        let msg = "GET|/api/ping|1700000000000";
        let sig = hmac_hex(secret, msg);
        verify_hmac(secret, msg, &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let secret = b"shared-secret";
        let msg = "GET|/api/ping|1700000000000";
        let mut sig = hmac_hex(secret, msg);
        sig.replace_range(0..1, if sig.starts_with('0') { "1" } else { "0" });
        assert!(verify_hmac(secret, msg, &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let msg = "GET|/api/ping|1700000000000";
        let sig = hmac_hex(b"secret-a", msg);
        assert!(verify_hmac(b"secret-b", msg, &sig).is_err());
    }

    #[test]
    fn hmac_hex_is_deterministic() {
        let secret = b"k";
        let msg = "same message";
        assert_eq!(hmac_hex(secret, msg), hmac_hex(secret, msg));
    }
}
