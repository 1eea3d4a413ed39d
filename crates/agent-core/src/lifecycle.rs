//! LifecycleController: builds [`AppState`] once and starts/stops
//! HTTPService, TransferService, and Discovery together — generalized from
//! "one HTTP server" to "two raw listeners plus an mDNS watcher that all
//! stop on the same signal."

use std::sync::Arc;

use agent_auth::{AuthGate, PairingStore};
use rand::RngCore;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::AgentConfig;
use crate::discovery::Discovery;
use crate::error::AgentError;
use crate::providers::{HostDeviceProvider, HostShellProvider, UnsupportedProvider};
use crate::state::{AppState, Counters};

/// How long [`LifecycleController::stop`] waits for the accept-loop tasks to
/// notice the stop signal and return before giving up on the join.
const STOP_JOIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub struct LifecycleController {
    state: Arc<AppState>,
    stop_tx: watch::Sender<bool>,
    http_handle: Option<tokio::task::JoinHandle<()>>,
    transfer_handle: Option<tokio::task::JoinHandle<()>>,
    discovery: Option<Discovery>,
}

impl LifecycleController {
    /// Builds [`AppState`] from `config` — loading or creating the pairing
    /// identity and the controller auth token — without starting any
    /// listener yet.
    pub fn build(config: AgentConfig) -> Result<Self, AgentError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let pairing_store = PairingStore::load_or_create(config.pairing_store_path())?;
        let controller_token = load_or_create_token(&config.auth_token_path())?;
        let auth_gate = AuthGate::new(controller_token);
        let device_id = pairing_store.device_id();

        let files_root = config.data_dir.join("files");
        std::fs::create_dir_all(&files_root)?;

        let state = Arc::new(AppState {
            config: config.clone(),
            pairing_store,
            auth_gate,
            device_provider: Arc::new(HostDeviceProvider),
            apps_provider: Arc::new(UnsupportedProvider),
            contacts_provider: Arc::new(UnsupportedProvider),
            sms_provider: Arc::new(UnsupportedProvider),
            shell_provider: Arc::new(HostShellProvider),
            files_root,
            counters: Counters::default(),
            discovered_peers: dashmap::DashMap::new(),
            orchestrator: agent_orchestrator::Orchestrator::new(device_id),
        });

        let (stop_tx, _) = watch::channel(false);

        Ok(Self { state, stop_tx, http_handle: None, transfer_handle: None, discovery: None })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Binds both listeners, starts Discovery, and spawns the accept-loop
    /// tasks. Returns once both sockets are bound (not once they've
    /// finished serving).
    pub async fn start(&mut self) -> Result<(), AgentError> {
        let http_listener = TcpListener::bind(("0.0.0.0", self.state.config.http_port)).await?;
        let transfer_listener = TcpListener::bind(("0.0.0.0", self.state.config.transfer_port)).await?;

        let http_port = http_listener.local_addr()?.port();

        let stop_rx = self.stop_tx.subscribe();
        let state = self.state.clone();
        self.http_handle = Some(tokio::spawn(crate::http::serve(http_listener, state, stop_rx)));

        let stop_rx = self.stop_tx.subscribe();
        let state = self.state.clone();
        self.transfer_handle = Some(tokio::spawn(crate::transfer::serve(transfer_listener, state, stop_rx)));

        match Discovery::start(self.state.clone(), &self.state.pairing_store.device_id(), http_port) {
            Ok(discovery) => self.discovery = Some(discovery),
            Err(e) => tracing::warn!(error = %e, "mDNS discovery failed to start, continuing without it"),
        }

        tracing::info!(
            http_port,
            transfer_port = self.state.config.transfer_port,
            device_id = %self.state.pairing_store.device_id(),
            "agent-core started"
        );
        Ok(())
    }

    /// Signals both accept loops to stop, closes the mDNS daemon, and waits
    /// up to [`STOP_JOIN_TIMEOUT`] for the accept-loop tasks to finish.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);

        if let Some(discovery) = self.discovery.take() {
            discovery.shutdown();
        }

        let join_all = async {
            if let Some(handle) = self.http_handle.take() {
                let _ = handle.await;
            }
            if let Some(handle) = self.transfer_handle.take() {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(STOP_JOIN_TIMEOUT, join_all).await.is_err() {
            tracing::warn!("listeners did not stop within the bounded join period");
        }
    }

    /// A snapshot of process-wide counters, for a future `lifecycle/status`
    /// surface or diagnostics.
    pub fn status(&self) -> crate::state::CountersSnapshot {
        self.state.counters.snapshot(self.state.pairing_store.list().len())
    }
}

/// Loads the controller auth token from disk, generating and persisting a
/// fresh one on first run (same atomic write-then-rename idiom as
/// `PairingStore`).
fn load_or_create_token(path: &std::path::Path) -> Result<String, AgentError> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(trimmed);
        }
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, &token)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(token)
}
