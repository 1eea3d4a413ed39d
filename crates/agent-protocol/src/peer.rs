//! JSON bodies exchanged between paired agents over `/api/peer/*`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A paired-device record as returned to API callers: every field except
/// the shared secret, which no endpoint ever returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairedDeviceWire {
    pub peer_id: String,
    pub human_label: String,
    pub peer_public_key: Vec<u8>,
    pub last_known_address: String,
    pub paired_at: u64,
    pub last_seen: u64,
    pub trusted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairInitRequest {
    pub device_id: String,
    pub label: String,
    pub public_key: Vec<u8>,
}

/// Response to `pair-init`. Both sides independently compute the same
/// `confirm_code` given the two public keys; the human compares them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairInitResponse {
    AlreadyPaired {
        public_key: Vec<u8>,
    },
    PendingApproval {
        challenge_id: String,
        public_key: Vec<u8>,
        confirm_code: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairPendingEntry {
    pub challenge_id: String,
    pub peer_id: String,
    pub peer_label: String,
    pub confirm_code: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairPendingResponse {
    pub pending: Vec<PairPendingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairApproveRequest {
    pub challenge_id: String,
    pub biometric_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairApproveResponse {
    pub public_key: Vec<u8>,
    pub peer: PairedDeviceWire,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairRejectRequest {
    pub challenge_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairedListResponse {
    pub peers: Vec<PairedDeviceWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevokeRequest {
    pub peer_id: String,
    pub biometric_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevokeAllRequest {
    pub biometric_verified: bool,
}

/// Identity disclosed by `peer/identity` — the local device id and public
/// key, so an initiator knows who it is talking to before pairing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityResponse {
    pub device_id: String,
    pub label: String,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverEntry {
    pub service_name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverResponse {
    pub peers: Vec<DiscoverEntry>,
}

/// `peer/request`: a structured query forwarded to a paired peer's
/// DomainHandlers and returned verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerQueryRequest {
    pub domain: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerQueryResponse {
    pub body: Value,
}

/// `peer/relay`: intentionally stubbed — the core returns HTTP 501 rather
/// than inventing proxy semantics. Kept as a typed request so the 501
/// handler can still validate the shape of what it refuses to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayRequest {
    pub target_peer_id: String,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_init_pending_tags_as_snake_case_status() {
        let resp = PairInitResponse::PendingApproval {
            challenge_id: "abc".to_string(),
            public_key: vec![4, 1, 2, 3],
            confirm_code: "123456".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""status":"pending_approval""#));
    }

    #[test]
    fn pair_init_already_paired_round_trip() {
        let resp = PairInitResponse::AlreadyPaired { public_key: vec![4, 9, 9] };
        let json = serde_json::to_string(&resp).unwrap();
        let back: PairInitResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, back);
    }

    #[test]
    fn paired_device_wire_has_no_shared_secret_field() {
        let json = serde_json::to_string(&PairedDeviceWire {
            peer_id: "p".into(),
            human_label: "l".into(),
            peer_public_key: vec![1],
            last_known_address: String::new(),
            paired_at: 0,
            last_seen: 0,
            trusted: true,
        })
        .unwrap();
        assert!(!json.contains("shared_secret"));
    }

    #[test]
    fn peer_query_request_without_params_round_trips() {
        let req = PeerQueryRequest {
            domain: "device".into(),
            action: "info".into(),
            params: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: PeerQueryRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);
    }
}
