//! ECDH P-256 key agreement for device pairing.
//!
//! Provides [`KeyPair`] for the agent's persisted identity key and
//! [`shared_secret`] for deriving the 32-byte secret both sides of a
//! pairing compute once, at approval time.

use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// A P-256 private/public key pair.
///
/// The private scalar is zeroized on drop; it never leaves the device once
/// generated or loaded from the pairing store.
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    #[zeroize(skip)]
    public: PublicKey,
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a new random P-256 key pair.
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Reconstruct a key pair from a persisted 32-byte scalar.
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("private scalar: {e}")))?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    /// The 32-byte private scalar, for persistence. Callers must store this
    /// with owner-only file permissions and never transmit it.
    pub fn private_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.secret.to_bytes());
        out
    }

    /// The public key encoded as an uncompressed SEC1 point (65 bytes:
    /// `0x04 || X || Y`). This is the fixed encoding exchanged during
    /// pairing and stored in `PairedDevice::peerPublicKey`.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Perform ECDH P-256 agreement against a peer's public key, then
    /// SHA-256 the raw agreement output. Both sides derive the same 32
    /// bytes given each other's public key and their own private key.
    pub fn shared_secret(&self, peer_public_bytes: &[u8]) -> Result<[u8; 32]> {
        let peer_public = decode_public_key(peer_public_bytes)?;
        let agreement = diffie_hellman(self.secret.to_nonzero_scalar(), peer_public.as_affine());

        let mut digest = Sha256::new();
        digest.update(agreement.raw_secret_bytes());
        let hash = digest.finalize();

        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);

        let mut raw = *agreement.raw_secret_bytes();
        raw.zeroize();

        Ok(out)
    }
}

/// Parse a peer's public key from its fixed SEC1-uncompressed encoding.
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_sec1_bytes(bytes).map_err(|e| CryptoError::InvalidKey(format!("public point: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_parties_derive_same_secret() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let secret_a = alice.shared_secret(&bob.public_key_bytes()).unwrap();
        let secret_b = bob.shared_secret(&alice.public_key_bytes()).unwrap();

        assert_eq!(secret_a, secret_b);
    }

    #[test]
    fn different_pairs_different_secrets() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let carol = KeyPair::generate();

        let secret_ab = alice.shared_secret(&bob.public_key_bytes()).unwrap();
        let secret_ac = alice.shared_secret(&carol.public_key_bytes()).unwrap();

        assert_ne!(secret_ab, secret_ac);
    }

    #[test]
    fn public_key_bytes_round_trip() {
        let kp = KeyPair::generate();
        let bytes = kp.public_key_bytes();
        assert_eq!(bytes.len(), 65);
        assert_eq!(bytes[0], 0x04);
        decode_public_key(&bytes).expect("should decode");
    }

    #[test]
    fn private_bytes_round_trip() {
        let kp = KeyPair::generate();
        let bytes = kp.private_bytes();
        let restored = KeyPair::from_private_bytes(&bytes).unwrap();
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn invalid_public_key_rejected() {
        let kp = KeyPair::generate();
        let err = kp.shared_secret(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }
}
