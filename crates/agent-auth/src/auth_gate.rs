//! Request authentication: controller static tokens and peer HMAC signatures.
//!
//! Two schemes protect the agent's HTTP surface:
//!
//! - **Controller token** — a single static secret (`X-Agent-Token` header or
//!   `token` query parameter) configured out of band. An empty configured
//!   token means "no controller auth configured"; requests from loopback are
//!   then let through, everything else is rejected.
//! - **Peer HMAC** — `X-Peer-Id` + `X-Peer-Signature` + `X-Peer-Timestamp`,
//!   verified against the paired device's shared secret. The signed message
//!   is the canonical string `METHOD|uri|timestamp`; timestamps older than
//!   five minutes are rejected as stale.
//!
//! `/api/ping` and everything under `/api/peer/` (the pairing handshake
//! itself) are exempt from both schemes. When a request carries peer
//! headers, peer auth takes precedence over the controller token even on
//! routes that would otherwise accept a token.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AuthError, Result};
use crate::pairing_store::PairingStore;

/// Paths that never require authentication.
const OPEN_PATH_PREFIXES: &[&str] = &["/api/ping", "/api/peer/"];

/// Requests signed more than this many milliseconds in the past (or future)
/// are rejected, limiting the window for replayed signatures.
pub const MAX_CLOCK_SKEW_MS: u64 = 5 * 60 * 1000;

/// The headers and metadata an HTTP request carries that `AuthGate` needs to
/// decide on. The transport layer is responsible for extracting these from
/// the raw request before calling [`AuthGate::authenticate`].
pub struct RequestContext<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub peer_address: &'a str,
    pub is_loopback: bool,
    pub controller_token: Option<&'a str>,
    pub peer_id: Option<&'a str>,
    pub peer_signature: Option<&'a str>,
    pub peer_timestamp: Option<&'a str>,
}

/// The identity a request authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Controller,
    Peer(String),
}

/// Validates inbound requests against the controller token and paired-peer
/// HMAC schemes.
pub struct AuthGate {
    controller_token: String,
}

impl AuthGate {
    pub fn new(controller_token: String) -> Self {
        Self { controller_token }
    }

    /// Authenticate a request, consulting `store` for peer secrets. On
    /// success, touches `last_seen` for the authenticating peer.
    pub fn authenticate(&self, ctx: &RequestContext, store: &PairingStore) -> Result<Principal> {
        if is_open_path(ctx.path) {
            return Ok(Principal::Controller);
        }

        if ctx.peer_id.is_some() || ctx.peer_signature.is_some() || ctx.peer_timestamp.is_some() {
            return self.authenticate_peer(ctx, store);
        }

        self.authenticate_controller(ctx)
    }

    fn authenticate_controller(&self, ctx: &RequestContext) -> Result<Principal> {
        if self.controller_token.is_empty() {
            return if ctx.is_loopback {
                Ok(Principal::Controller)
            } else {
                Err(AuthError::Unauthenticated)
            };
        }

        match ctx.controller_token {
            Some(token) if token == self.controller_token => Ok(Principal::Controller),
            _ => Err(AuthError::Unauthenticated),
        }
    }

    fn authenticate_peer(&self, ctx: &RequestContext, store: &PairingStore) -> Result<Principal> {
        let peer_id = ctx
            .peer_id
            .ok_or_else(|| AuthError::ClientInput("missing X-Peer-Id".to_string()))?;
        let signature = ctx
            .peer_signature
            .ok_or_else(|| AuthError::ClientInput("missing X-Peer-Signature".to_string()))?;
        let timestamp_str = ctx
            .peer_timestamp
            .ok_or_else(|| AuthError::ClientInput("missing X-Peer-Timestamp".to_string()))?;

        let timestamp: u64 = timestamp_str
            .parse()
            .map_err(|_| AuthError::ClientInput("X-Peer-Timestamp is not a valid integer".to_string()))?;

        let now = now_millis();
        let skew = now.abs_diff(timestamp);
        if skew > MAX_CLOCK_SKEW_MS {
            return Err(AuthError::Unauthorized("stale request timestamp".to_string()));
        }

        let device = store
            .get(peer_id)
            .ok_or_else(|| AuthError::Unauthorized(format!("unknown peer {peer_id}")))?;
        if !device.trusted {
            return Err(AuthError::Unauthorized(format!("peer {peer_id} is not trusted")));
        }

        let message = canonical_message(ctx.method, ctx.path, timestamp_str);
        agent_crypto::verify_hmac(&device.shared_secret, &message, signature)
            .map_err(|_| AuthError::Unauthorized("peer signature verification failed".to_string()))?;

        store.touch_seen(peer_id)?;
        if !ctx.peer_address.is_empty() {
            store.update_address(peer_id, ctx.peer_address)?;
        }

        Ok(Principal::Peer(peer_id.to_string()))
    }
}

/// The exact message peers sign: `METHOD|uri|timestamp`.
pub fn canonical_message(method: &str, path: &str, timestamp: &str) -> String {
    format!("{method}|{path}|{timestamp}")
}

fn is_open_path(path: &str) -> bool {
    OPEN_PATH_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx<'a>(
        method: &'a str,
        path: &'a str,
        controller_token: Option<&'a str>,
        peer_id: Option<&'a str>,
        peer_signature: Option<&'a str>,
        peer_timestamp: Option<&'a str>,
    ) -> RequestContext<'a> {
        RequestContext {
            method,
            path,
            peer_address: "10.0.0.5:1234",
            is_loopback: false,
            controller_token,
            peer_id,
            peer_signature,
            peer_timestamp,
        }
    }

    #[test]
    fn open_paths_never_require_auth() {
        let gate = AuthGate::new("secret".to_string());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        let c = ctx("GET", "/api/ping", None, None, None, None);
        assert_eq!(gate.authenticate(&c, &store).unwrap(), Principal::Controller);

        let c = ctx("POST", "/api/peer/pair-request", None, None, None, None);
        assert_eq!(gate.authenticate(&c, &store).unwrap(), Principal::Controller);
    }

    #[test]
    fn controller_token_match_succeeds() {
        let gate = AuthGate::new("s3cr3t".to_string());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        let c = ctx("GET", "/api/device/info", Some("s3cr3t"), None, None, None);
        assert_eq!(gate.authenticate(&c, &store).unwrap(), Principal::Controller);
    }

    #[test]
    fn controller_token_mismatch_rejected() {
        let gate = AuthGate::new("s3cr3t".to_string());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        let c = ctx("GET", "/api/device/info", Some("wrong"), None, None, None);
        assert!(matches!(gate.authenticate(&c, &store), Err(AuthError::Unauthenticated)));
    }

    #[test]
    fn empty_controller_token_allows_loopback_only() {
        let gate = AuthGate::new(String::new());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        let mut c = ctx("GET", "/api/device/info", None, None, None, None);
        c.is_loopback = true;
        assert_eq!(gate.authenticate(&c, &store).unwrap(), Principal::Controller);

        c.is_loopback = false;
        assert!(matches!(gate.authenticate(&c, &store), Err(AuthError::Unauthenticated)));
    }

    #[test]
    fn peer_hmac_round_trip_succeeds() {
        let gate = AuthGate::new(String::new());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        let other_dir = tempdir().unwrap();
        let other = PairingStore::load_or_create(other_dir.path().join("pairing_state")).unwrap();

        let pending = store
            .create_pending(
                other.device_id(),
                "Other".to_string(),
                other.public_key_bytes(),
                "10.0.0.5:1234".to_string(),
            )
            .unwrap();
        let device = store.approve(&pending.challenge_id).unwrap().unwrap();

        let timestamp = now_millis().to_string();
        let message = canonical_message("GET", "/api/device/info", &timestamp);
        let signature = agent_crypto::hmac_hex(&device.shared_secret, &message);

        let c = ctx(
            "GET",
            "/api/device/info",
            None,
            Some(&device.peer_id),
            Some(&signature),
            Some(&timestamp),
        );
        assert_eq!(
            gate.authenticate(&c, &store).unwrap(),
            Principal::Peer(device.peer_id.clone())
        );
    }

    #[test]
    fn peer_hmac_takes_precedence_over_token() {
        let gate = AuthGate::new("s3cr3t".to_string());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        // Peer headers present but bogus: must fail even though a valid
        // controller token is also attached, because peer auth takes
        // precedence whenever peer headers are present.
        let c = ctx(
            "GET",
            "/api/device/info",
            Some("s3cr3t"),
            Some("unknown-peer"),
            Some("deadbeef"),
            Some(&now_millis().to_string()),
        );
        assert!(matches!(gate.authenticate(&c, &store), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn stale_timestamp_rejected() {
        let gate = AuthGate::new(String::new());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        let stale = (now_millis() - MAX_CLOCK_SKEW_MS - 1000).to_string();
        let c = ctx(
            "GET",
            "/api/device/info",
            None,
            Some("peer-1"),
            Some("deadbeef"),
            Some(&stale),
        );
        assert!(matches!(gate.authenticate(&c, &store), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn unknown_peer_rejected() {
        let gate = AuthGate::new(String::new());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();

        let c = ctx(
            "GET",
            "/api/device/info",
            None,
            Some("ghost"),
            Some("deadbeef"),
            Some(&now_millis().to_string()),
        );
        assert!(matches!(gate.authenticate(&c, &store), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn tampered_signature_rejected() {
        let gate = AuthGate::new(String::new());
        let dir = tempdir().unwrap();
        let store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();
        let other_dir = tempdir().unwrap();
        let other = PairingStore::load_or_create(other_dir.path().join("pairing_state")).unwrap();

        let pending = store
            .create_pending(other.device_id(), "Other".into(), other.public_key_bytes(), String::new())
            .unwrap();
        let device = store.approve(&pending.challenge_id).unwrap().unwrap();

        let timestamp = now_millis().to_string();
        let c = ctx(
            "GET",
            "/api/device/info",
            None,
            Some(&device.peer_id),
            Some("0000000000000000000000000000000000000000000000000000000000000000"),
            Some(&timestamp),
        );
        assert!(matches!(gate.authenticate(&c, &store), Err(AuthError::Unauthorized(_))));
    }
}
