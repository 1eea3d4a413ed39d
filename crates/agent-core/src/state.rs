//! Shared application state handed to every handler: configuration, the
//! pairing store, the auth gate, platform providers, and the process-wide
//! counters. Built once by [`crate::lifecycle::LifecycleController`] and
//! passed around as `Arc<AppState>`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use agent_auth::{AuthGate, PairingStore};
use agent_orchestrator::Orchestrator;
use dashmap::DashMap;

use crate::config::AgentConfig;
use crate::providers::{AppsProvider, ContactsProvider, DeviceProvider, ShellProvider, SmsProvider};

/// Monotonic reporting counters (§3); active counts may decrease.
#[derive(Default)]
pub struct Counters {
    pub total_bytes_transferred: AtomicU64,
    pub active_transfers: AtomicUsize,
    pub connected_clients: AtomicUsize,
}

impl Counters {
    pub fn snapshot(&self, paired_device_count: usize) -> CountersSnapshot {
        CountersSnapshot {
            total_bytes_transferred: self.total_bytes_transferred.load(Ordering::Relaxed),
            active_transfers: self.active_transfers.load(Ordering::Relaxed),
            connected_clients: self.connected_clients.load(Ordering::Relaxed),
            paired_device_count,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CountersSnapshot {
    pub total_bytes_transferred: u64,
    pub active_transfers: usize,
    pub connected_clients: usize,
    pub paired_device_count: usize,
}

pub struct AppState {
    pub config: AgentConfig,
    pub pairing_store: PairingStore,
    pub auth_gate: AuthGate,
    pub device_provider: std::sync::Arc<dyn DeviceProvider>,
    pub apps_provider: std::sync::Arc<dyn AppsProvider>,
    pub contacts_provider: std::sync::Arc<dyn ContactsProvider>,
    pub sms_provider: std::sync::Arc<dyn SmsProvider>,
    pub shell_provider: std::sync::Arc<dyn ShellProvider>,
    pub files_root: PathBuf,
    pub counters: Counters,
    /// Service name → (host, port), updated by [`crate::discovery::Discovery`]
    /// as mDNS browse events arrive. `peer/discover` reads a snapshot of it.
    pub discovered_peers: DashMap<String, (String, u16)>,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn spool_dir(&self) -> PathBuf {
        self.config.data_dir.join("spool")
    }
}
