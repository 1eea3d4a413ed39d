//! TransferService: the bulk binary-movement channel, an independent TCP
//! listener with its own frame protocol, no HTTP involved.
//! Structurally mirrors [`crate::http::serve`]'s accept-loop shape but the
//! per-connection body is the push/pull/stat frame exchange instead of
//! request parsing.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use agent_auth::{PairedDevice, Principal, RequestContext};
use agent_protocol::{
    decode_frame, encode_frame, TransferOp, TransferRequestHeader, TransferResponseHeader, TransferStatus,
    TRANSFER_HEADER_SIZE, TRANSFER_TRAILER_SIZE, UNCOMPUTED_TRAILER,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

use crate::error::AgentError;
use crate::state::AppState;

/// Caps simultaneous push/pull/stat exchanges; additional connections queue
/// on the semaphore rather than being rejected outright.
const MAX_CONCURRENT_TRANSFERS: usize = 4;

/// Shared between socket buffers and the copy loop.
const TRANSFER_BUFFER_SIZE: usize = 256 * 1024;

pub async fn serve(listener: TcpListener, state: Arc<AppState>, mut stop_rx: watch::Receiver<bool>) {
    tracing::info!(addr = ?listener.local_addr().ok(), "TransferService listening");
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TRANSFERS));

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let accepted = tokio::select! {
            result = tokio::time::timeout(std::time::Duration::from_secs(2), listener.accept()) => result,
            _ = stop_rx.changed() => continue,
        };

        let (stream, peer_addr) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to accept transfer connection");
                continue;
            }
            Err(_) => continue,
        };

        let state = state.clone();
        let semaphore = semaphore.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            state.counters.active_transfers.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = handle_connection(stream, peer_addr, &state).await {
                tracing::warn!(%peer_addr, error = %e, "transfer connection ended with an error");
            }
            state.counters.active_transfers.fetch_sub(1, Ordering::Relaxed);
        });
    }

    tracing::info!("TransferService accept loop stopped");
}

/// Enables `TCP_NODELAY` and raises the socket's send/receive buffers to
/// [`TRANSFER_BUFFER_SIZE`] so the kernel doesn't throttle a bulk transfer
/// down to its default (usually much smaller) buffer size.
fn tune_transfer_socket(stream: &TcpStream) {
    stream.set_nodelay(true).ok();
    let sock_ref = socket2::SockRef::from(stream);
    if let Err(e) = sock_ref.set_recv_buffer_size(TRANSFER_BUFFER_SIZE) {
        tracing::debug!(error = %e, "failed to raise SO_RCVBUF");
    }
    if let Err(e) = sock_ref.set_send_buffer_size(TRANSFER_BUFFER_SIZE) {
        tracing::debug!(error = %e, "failed to raise SO_SNDBUF");
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    state: &Arc<AppState>,
) -> Result<(), AgentError> {
    tune_transfer_socket(&stream);

    let mut header_buf = [0u8; TRANSFER_HEADER_SIZE];
    stream.read_exact(&mut header_buf).await.map_err(AgentError::Io)?;
    let header: TransferRequestHeader = decode_frame(&header_buf)?;

    if let Err(e) = authenticate(&header, peer_addr, state) {
        let response = TransferResponseHeader::error(e.to_string());
        write_frame(&mut stream, &response).await?;
        return Ok(());
    }

    let target = match resolve_path(&state.files_root, &header.path) {
        Ok(path) => path,
        Err(e) => {
            write_frame(&mut stream, &TransferResponseHeader::error(e.to_string())).await?;
            return Ok(());
        }
    };

    match header.op {
        TransferOp::Push => handle_push(&mut stream, &target, &header, state).await,
        TransferOp::Pull => handle_pull(&mut stream, &target, state).await,
        TransferOp::Stat => handle_stat(&mut stream, &target).await,
    }
}

fn authenticate(
    header: &TransferRequestHeader,
    peer_addr: std::net::SocketAddr,
    state: &Arc<AppState>,
) -> Result<Principal, AgentError> {
    let ctx = RequestContext {
        method: op_str(header.op),
        path: &header.path,
        peer_address: &peer_addr.to_string(),
        is_loopback: peer_addr.ip().is_loopback(),
        controller_token: header.token.as_deref(),
        peer_id: header.peer_id.as_deref(),
        peer_signature: header.signature.as_deref(),
        peer_timestamp: header.timestamp.as_deref(),
    };
    Ok(state.auth_gate.authenticate(&ctx, &state.pairing_store)?)
}

fn op_str(op: TransferOp) -> &'static str {
    match op {
        TransferOp::Push => "push",
        TransferOp::Pull => "pull",
        TransferOp::Stat => "stat",
    }
}

/// Rejects any path escaping `root`, mirroring
/// `handlers::files::resolve_path`.
fn resolve_path(root: &Path, raw: &str) -> Result<PathBuf, AgentError> {
    let trimmed = raw.trim_start_matches('/');
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err(AgentError::ClientInput("path escapes the sandbox root".to_string()));
    }
    Ok(root.join(trimmed))
}

async fn handle_push(
    stream: &mut TcpStream,
    target: &Path,
    header: &TransferRequestHeader,
    state: &Arc<AppState>,
) -> Result<(), AgentError> {
    let size = header
        .size
        .ok_or_else(|| AgentError::ClientInput("push requires a size field".to_string()))?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(target).await?;
    let mut hasher = agent_crypto::StreamingHasher::new();

    let mut remaining = size;
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        stream.read_exact(&mut buf[..take]).await.map_err(AgentError::Io)?;
        file.write_all(&buf[..take]).await?;
        hasher.update(&buf[..take]);
        remaining -= take as u64;
    }
    file.flush().await?;
    state.counters.total_bytes_transferred.fetch_add(size, Ordering::Relaxed);

    let mut trailer = [0u8; TRANSFER_TRAILER_SIZE];
    stream.read_exact(&mut trailer).await.map_err(AgentError::Io)?;

    let server_hash = hasher.finalize();
    let response = if trailer == UNCOMPUTED_TRAILER || trailer == server_hash {
        TransferResponseHeader::ok(size, hex_encode(&server_hash))
    } else {
        TransferResponseHeader::hash_mismatch(size, hex_encode(&server_hash))
    };
    write_frame(stream, &response).await
}

async fn handle_pull(stream: &mut TcpStream, target: &Path, state: &Arc<AppState>) -> Result<(), AgentError> {
    let metadata = match tokio::fs::metadata(target).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => {
            return write_frame(stream, &TransferResponseHeader::error("path is not a regular file")).await;
        }
        Err(_) => return write_frame(stream, &TransferResponseHeader::error("no such file")).await,
    };

    let size = metadata.len();
    let mut file = tokio::fs::File::open(target).await?;

    write_frame(stream, &TransferResponseHeader::ok(size, String::new())).await?;

    let mut hasher = agent_crypto::StreamingHasher::new();
    let mut remaining = size;
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        file.read_exact(&mut buf[..take]).await?;
        stream.write_all(&buf[..take]).await.map_err(AgentError::Io)?;
        hasher.update(&buf[..take]);
        remaining -= take as u64;
    }
    stream.flush().await.map_err(AgentError::Io)?;
    state.counters.total_bytes_transferred.fetch_add(size, Ordering::Relaxed);

    stream.write_all(&hasher.finalize()).await.map_err(AgentError::Io)
}

async fn handle_stat(stream: &mut TcpStream, target: &Path) -> Result<(), AgentError> {
    let response = match tokio::fs::metadata(target).await {
        Ok(metadata) => TransferResponseHeader {
            status: TransferStatus::Ok,
            size: Some(metadata.len()),
            hash: None,
            exists: Some(true),
            is_dir: Some(metadata.is_dir()),
            mtime: metadata.modified().ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok()).map(|d| d.as_millis() as u64),
            message: None,
        },
        Err(_) => TransferResponseHeader {
            status: TransferStatus::Ok,
            size: None,
            hash: None,
            exists: Some(false),
            is_dir: None,
            mtime: None,
            message: None,
        },
    };
    write_frame(stream, &response).await
}

async fn write_frame(stream: &mut TcpStream, header: &TransferResponseHeader) -> Result<(), AgentError> {
    let frame = encode_frame(header)?;
    stream.write_all(&frame).await.map_err(AgentError::Io)
}

/// Client side of a push: opens a TransferService connection to `peer` and
/// streams `local_path` to `remote_path`. Used by `handlers::files::push_to_peer`
/// to carry out an orchestrator transfer order — the source device acts as a
/// TransferService client against the target, the same role a controller
/// normally plays in a push.
///
/// `peer.last_known_address` carries the target's HTTP address; the transfer
/// port is assumed to be the shared default, since peers don't currently
/// advertise a non-default transfer port over the wire.
pub async fn push_file(peer: &PairedDevice, device_id: &str, local_path: &Path, remote_path: &str) -> Result<(), AgentError> {
    let host = peer
        .last_known_address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(&peer.last_known_address);
    let addr = format!("{host}:{}", crate::config::DEFAULT_TRANSFER_PORT);

    let metadata = tokio::fs::metadata(local_path).await?;
    let size = metadata.len();

    let timestamp = std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string();
    let message = agent_auth::auth_gate::canonical_message("push", remote_path, &timestamp);
    let signature = agent_crypto::hmac_hex(&peer.shared_secret, &message);

    let mut stream = TcpStream::connect(&addr).await.map_err(AgentError::Io)?;
    tune_transfer_socket(&stream);

    let header = TransferRequestHeader {
        op: TransferOp::Push,
        path: remote_path.to_string(),
        size: Some(size),
        token: None,
        peer_id: Some(device_id.to_string()),
        signature: Some(signature),
        timestamp: Some(timestamp),
    };
    let frame = encode_frame(&header)?;
    stream.write_all(&frame).await.map_err(AgentError::Io)?;

    let mut file = tokio::fs::File::open(local_path).await?;
    let mut hasher = agent_crypto::StreamingHasher::new();
    let mut remaining = size;
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    while remaining > 0 {
        let take = remaining.min(buf.len() as u64) as usize;
        file.read_exact(&mut buf[..take]).await?;
        stream.write_all(&buf[..take]).await.map_err(AgentError::Io)?;
        hasher.update(&buf[..take]);
        remaining -= take as u64;
    }
    stream.write_all(&hasher.finalize()).await.map_err(AgentError::Io)?;
    stream.flush().await.map_err(AgentError::Io)?;

    let mut response_buf = [0u8; TRANSFER_HEADER_SIZE];
    stream.read_exact(&mut response_buf).await.map_err(AgentError::Io)?;
    let response: TransferResponseHeader = decode_frame(&response_buf)?;

    match response.status {
        TransferStatus::Ok => Ok(()),
        TransferStatus::HashMismatch => Err(AgentError::Internal(format!("push to {addr} failed checksum verification"))),
        TransferStatus::Error => Err(AgentError::Internal(response.message.unwrap_or_else(|| "push rejected by peer".to_string()))),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
