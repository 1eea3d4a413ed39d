//! End-to-end scenarios driven over real TCP/HTTP connections: bind an
//! ephemeral listener, spawn the real accept loop, and drive it with
//! `reqwest` or a raw `TcpStream`.
//!
//! `PairingStore`/`AuthGate`'s own unit tests already cover the pairing
//! state machine and the auth-rejection cases (stale timestamp, tampered
//! signature, unknown peer, wrong controller token) at the API level, so
//! this file focuses on behavior that only exists once the real transport
//! is involved: a pairing handshake over HTTP, an authenticated peer
//! request signed the way a real peer would sign it, a controller token
//! rejection alongside an always-open `/api/ping`, a TransferService
//! push/pull round trip with digest verification over the real frame
//! protocol, and an orchestrator broadcast fanning out over real sockets
//! with one peer unreachable.
//!
//! `pair-approve` additionally gates on a platform-reported screen lock
//! (`handlers::peer::SCREEN_LOCK_PROP`), which the bare-host
//! `HostDeviceProvider` never reports. These tests build `AppState`
//! directly with `FakeDeviceProvider` instead of going through
//! `LifecycleController::build`, so pairing can be exercised end to end
//! without a real platform backend.

use std::sync::Arc;

use agent_auth::{AuthGate, PairingStore};
use agent_core::config::AgentConfig;
use agent_core::providers::fakes::{FakeDeviceProvider, FakeShellProvider};
use agent_core::providers::UnsupportedProvider;
use agent_core::state::{AppState, Counters};
use agent_protocol::peer::{PairApproveRequest, PairInitRequest, PairInitResponse};
use agent_protocol::{
    decode_frame, encode_frame, TransferOp, TransferRequestHeader, TransferResponseHeader, TransferStatus,
    TRANSFER_HEADER_SIZE,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Builds an `AppState` with fake providers (screen lock reported as
/// present) and the given controller token ("" means "no controller auth
/// configured", same as `AuthGate::new` documents), so loopback controller
/// requests and peer HMAC requests both authenticate without extra setup.
fn test_state_with_token(label: &str, controller_token: &str) -> (Arc<AppState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let files_root = dir.path().join("files");
    std::fs::create_dir_all(&files_root).unwrap();

    let pairing_store = PairingStore::load_or_create(dir.path().join("pairing_state")).unwrap();
    let device_id = pairing_store.device_id();

    let mut device_provider = FakeDeviceProvider::default();
    device_provider.props.insert("screen_lock_enabled".to_string(), "true".to_string());

    let config = AgentConfig {
        http_port: 0,
        transfer_port: 0,
        data_dir: dir.path().to_path_buf(),
        device_label: label.to_string(),
    };

    let state = Arc::new(AppState {
        config,
        pairing_store,
        auth_gate: AuthGate::new(controller_token.to_string()),
        device_provider: Arc::new(device_provider),
        apps_provider: Arc::new(UnsupportedProvider),
        contacts_provider: Arc::new(UnsupportedProvider),
        sms_provider: Arc::new(UnsupportedProvider),
        shell_provider: Arc::new(FakeShellProvider::default()),
        files_root,
        counters: Counters::default(),
        discovered_peers: dashmap::DashMap::new(),
        orchestrator: agent_orchestrator::Orchestrator::new(device_id),
    });

    (state, dir)
}

fn test_state(label: &str) -> (Arc<AppState>, TempDir) {
    test_state_with_token(label, "")
}

/// Binds an ephemeral HTTP listener for `state` and spawns the real accept
/// loop, returning the address it bound to.
async fn spawn_http(state: Arc<AppState>) -> std::net::SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(agent_core::http::serve(listener, state, stop_rx));
    addr
}

/// Same as [`spawn_http`] but for the TransferService listener.
async fn spawn_transfer(state: Arc<AppState>) -> std::net::SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(agent_core::transfer::serve(listener, state, stop_rx));
    addr
}

#[tokio::test]
async fn fresh_pairing_then_authenticated_peer_request() {
    let (state_a, _dir_a) = test_state("Device A");
    let (state_b, _dir_b) = test_state("Device B");

    let a_id = state_a.pairing_store.device_id();
    let a_pub = state_a.pairing_store.public_key_bytes();
    let b_pub = state_b.pairing_store.public_key_bytes();

    let addr_b = spawn_http(state_b.clone()).await;
    let client = reqwest::Client::new();

    // A initiates pairing against B over real HTTP.
    let resp: PairInitResponse = client
        .post(format!("http://{addr_b}/api/peer/pair-init"))
        .json(&PairInitRequest { device_id: a_id.clone(), label: "A".to_string(), public_key: a_pub.clone() })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let (challenge_id, confirm_code) = match resp {
        PairInitResponse::PendingApproval { challenge_id, confirm_code, public_key } => {
            assert_eq!(public_key, b_pub);
            (challenge_id, confirm_code)
        }
        other => panic!("expected pending_approval, got {other:?}"),
    };

    // Both sides independently compute the same confirmation code.
    assert_eq!(confirm_code, agent_crypto::confirm_code(&a_pub, &b_pub));

    // The local user approves on B.
    let status = client
        .post(format!("http://{addr_b}/api/peer/pair-approve"))
        .json(&PairApproveRequest { challenge_id, biometric_verified: true })
        .send()
        .await
        .unwrap()
        .status();
    assert!(status.is_success());

    let b_side_of_a = state_b.pairing_store.get(&a_id).expect("B should now have A paired");

    // A derives the same pairing locally (the initiator side of the
    // handshake never round-trips through HTTP — it already holds both
    // public keys and its own private key).
    let pending = state_a.pairing_store.create_pending(state_b.pairing_store.device_id(), "B".to_string(), b_pub, addr_b.to_string()).unwrap();
    let a_side_of_b = state_a.pairing_store.approve(&pending.challenge_id).unwrap().unwrap();
    assert_eq!(a_side_of_b.shared_secret, b_side_of_a.shared_secret);

    // A now signs a real peer request against B's device/info.
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis()
        .to_string();
    let message = agent_auth::auth_gate::canonical_message("GET", "/api/device/info", &timestamp);
    let signature = agent_crypto::hmac_hex(&a_side_of_b.shared_secret, &message);

    let resp = client
        .get(format!("http://{addr_b}/api/device/info"))
        .header("X-Peer-Id", &a_id)
        .header("X-Peer-Signature", signature)
        .header("X-Peer-Timestamp", timestamp)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unauthenticated_controller_request_is_rejected_over_real_http() {
    // A non-empty controller token so an absent header is rejected even
    // though the request arrives over loopback.
    let (state_b, _dir_b) = test_state_with_token("Device B", "s3cret");

    let addr_b = spawn_http(state_b).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("http://{addr_b}/api/device/info")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    // /api/ping stays open regardless of the configured token.
    let resp = client.get(format!("http://{addr_b}/api/ping")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn transfer_push_then_pull_round_trip() {
    let (state, _dir) = test_state("Device");
    let addr = spawn_transfer(state).await;

    let payload = b"round trip payload bytes".to_vec();

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let push_header = TransferRequestHeader {
        op: TransferOp::Push,
        path: "notes/a.txt".to_string(),
        size: Some(payload.len() as u64),
        token: None,
        peer_id: None,
        signature: None,
        timestamp: None,
    };
    stream.write_all(&encode_frame(&push_header).unwrap()).await.unwrap();
    stream.write_all(&payload).await.unwrap();
    stream.write_all(&agent_protocol::UNCOMPUTED_TRAILER).await.unwrap();
    stream.flush().await.unwrap();

    let mut resp_buf = [0u8; TRANSFER_HEADER_SIZE];
    stream.read_exact(&mut resp_buf).await.unwrap();
    let push_resp: TransferResponseHeader = decode_frame(&resp_buf).unwrap();
    assert_eq!(push_resp.status, TransferStatus::Ok);
    assert_eq!(push_resp.size, Some(payload.len() as u64));
    // The server-reported digest equals the independently computed one.
    assert_eq!(push_resp.hash, Some(agent_crypto::sha256_hex(&payload)));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let pull_header = TransferRequestHeader {
        op: TransferOp::Pull,
        path: "notes/a.txt".to_string(),
        size: None,
        token: None,
        peer_id: None,
        signature: None,
        timestamp: None,
    };
    stream.write_all(&encode_frame(&pull_header).unwrap()).await.unwrap();

    let mut resp_buf = [0u8; TRANSFER_HEADER_SIZE];
    stream.read_exact(&mut resp_buf).await.unwrap();
    let pull_resp: TransferResponseHeader = decode_frame(&resp_buf).unwrap();
    assert_eq!(pull_resp.status, TransferStatus::Ok);
    let size = pull_resp.size.unwrap() as usize;

    let mut body = vec![0u8; size];
    stream.read_exact(&mut body).await.unwrap();
    assert_eq!(body, payload);

    let mut trailer = [0u8; 32];
    stream.read_exact(&mut trailer).await.unwrap();
}

#[tokio::test]
async fn orchestrator_broadcast_reports_both_reachable_and_unreachable_peers() {
    let (state_a, _dir_a) = test_state("Device A");
    let (state_b, _dir_b) = test_state("Device B");

    let addr_b = spawn_http(state_b.clone()).await;

    let a_pub = state_a.pairing_store.public_key_bytes();
    let b_pending = state_b.pairing_store.create_pending(state_a.pairing_store.device_id(), "A".to_string(), a_pub, "127.0.0.1:0".to_string()).unwrap();
    let b_side_of_a = state_b.pairing_store.approve(&b_pending.challenge_id).unwrap().unwrap();

    let reachable = agent_auth::PairedDevice {
        peer_id: state_b.pairing_store.device_id(),
        human_label: "B".to_string(),
        peer_public_key: state_b.pairing_store.public_key_bytes(),
        shared_secret: b_side_of_a.shared_secret,
        last_known_address: addr_b.to_string(),
        paired_at: 0,
        last_seen: 0,
        trusted: true,
    };
    let unreachable = agent_auth::PairedDevice {
        peer_id: "ghost-device".to_string(),
        human_label: "Ghost".to_string(),
        peer_public_key: vec![4, 1, 2, 3],
        shared_secret: [0u8; 32],
        last_known_address: "127.0.0.1:1".to_string(),
        paired_at: 0,
        last_seen: 0,
        trusted: true,
    };

    let outcomes = state_a.orchestrator.broadcast(&[reachable, unreachable], "GET", "/api/ping", None).await;
    assert_eq!(outcomes.len(), 2);

    let ok_count = outcomes.iter().filter(|(_, o)| matches!(o, agent_orchestrator::PeerOutcome::Ok(_))).count();
    let err_count = outcomes.iter().filter(|(_, o)| matches!(o, agent_orchestrator::PeerOutcome::Error(_))).count();
    assert_eq!(ok_count, 1);
    assert_eq!(err_count, 1);
}
