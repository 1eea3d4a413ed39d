//! Human out-of-band confirmation code derivation.

use sha2::{Digest, Sha256};

/// Derive the 6-digit confirmation code both sides of a pairing show to the
/// user for manual comparison.
///
/// The two public keys are canonicalized by lexicographic byte order before
/// hashing so both directions of the pairing (A validating B, and B
/// validating A) compute the identical code.
pub fn confirm_code(pub_a: &[u8], pub_b: &[u8]) -> String {
    let (first, second) = if pub_a <= pub_b {
        (pub_a, pub_b)
    } else {
        (pub_b, pub_a)
    };

    let mut digest = Sha256::new();
    digest.update(first);
    digest.update(b"|"); // unambiguous separator between the two keys
    digest.update(second);
    let hash = digest.finalize();

    let prefix = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
    format!("{:06}", prefix % 1_000_000)
}
