//! HTTPService: the control-plane TCP listener. An accept loop spawns a
//! task per connection, owning `tokio::net::TcpListener` directly (rather
//! than handing it to a web framework) so
//! [`crate::lifecycle::LifecycleController`] can stop it by closing the
//! socket.

pub mod request;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::AgentError;
use crate::http::request::read_request;
use crate::http::response::{write_response, HttpResponse};
use crate::router;
use crate::state::AppState;

/// How long `accept()` blocks before re-checking the stop signal.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Runs the accept loop until `stop_rx` reports a shutdown request. Returns
/// once the listener has stopped accepting new connections; in-flight
/// connection tasks are detached and finish (or are cut off by client
/// disconnect) on their own.
pub async fn serve(listener: TcpListener, state: Arc<AppState>, mut stop_rx: watch::Receiver<bool>) {
    tracing::info!(addr = ?listener.local_addr().ok(), "HTTPService listening");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let accepted = tokio::select! {
            result = tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()) => result,
            _ = stop_rx.changed() => continue,
        };

        let (stream, peer_addr) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to accept connection");
                continue;
            }
            Err(_) => continue,
        };

        let state = state.clone();
        state.counters.connected_clients.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, &state).await {
                tracing::warn!(%peer_addr, error = %e, "connection ended with an error");
            }
            state.counters.connected_clients.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
        });
    }

    tracing::info!("HTTPService accept loop stopped");
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    state: &Arc<AppState>,
) -> Result<(), AgentError> {
    stream.set_nodelay(true).ok();
    let mut reader = BufReader::new(stream);

    let request = match read_request(&mut reader, peer_addr, &state.spool_dir()).await {
        Ok(req) => req,
        Err(e) => {
            let mut writer = tokio::io::BufWriter::new(reader.into_inner());
            return write_response(&mut writer, HttpResponse::from_error(&e)).await;
        }
    };

    let response = match router::split_path(&request.path) {
        Ok(routed) => match router::dispatch(&request, &routed, state).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(path = %request.path, error = %e, "request failed");
                HttpResponse::from_error(&e)
            }
        },
        Err(e) => HttpResponse::from_error(&e),
    };

    let mut writer = tokio::io::BufWriter::new(reader.into_inner());
    write_response(&mut writer, response).await
}
