//! Persisted paired-device records and the pending-pairing table.
//!
//! Backed by a single file (`pairing_state`) holding a version tag, the
//! local device id, the local private key, and the array of paired-device
//! records. Writes are atomic: the new contents are written to a sibling
//! `.tmp` file and renamed over the target, so a crash mid-write cannot
//! leave a half-written file in place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use agent_crypto::KeyPair;

use crate::error::{AuthError, Result};

/// Pending pairings older than this are treated as expired and are no
/// longer approvable.
pub const PENDING_LIFETIME_MS: u64 = 5 * 60 * 1000;

const STORE_FORMAT_VERSION: u32 = 1;

/// A peer this agent has completed pairing with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedDevice {
    pub peer_id: String,
    pub human_label: String,
    pub peer_public_key: Vec<u8>,
    pub shared_secret: [u8; 32],
    pub last_known_address: String,
    pub paired_at: u64,
    pub last_seen: u64,
    pub trusted: bool,
}

impl PairedDevice {
    /// The view returned by API endpoints: every field except the shared
    /// secret, which is never returned once pairing completes.
    pub fn public_view(&self) -> PairedDeviceView {
        PairedDeviceView {
            peer_id: self.peer_id.clone(),
            human_label: self.human_label.clone(),
            peer_public_key: self.peer_public_key.clone(),
            last_known_address: self.last_known_address.clone(),
            paired_at: self.paired_at,
            last_seen: self.last_seen,
            trusted: self.trusted,
        }
    }
}

/// A [`PairedDevice`] with its shared secret redacted, safe to return from
/// any endpoint (`peer/paired`, `pair-approve`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PairedDeviceView {
    pub peer_id: String,
    pub human_label: String,
    pub peer_public_key: Vec<u8>,
    pub last_known_address: String,
    pub paired_at: u64,
    pub last_seen: u64,
    pub trusted: bool,
}

/// A pairing in progress, awaiting local user approval.
#[derive(Debug, Clone)]
pub struct PendingPairing {
    pub challenge_id: String,
    pub peer_id: String,
    pub peer_label: String,
    pub peer_public_key: Vec<u8>,
    pub peer_address: String,
    pub confirm_code: String,
    pub created_at: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    version: u32,
    device_id: String,
    private_key: Vec<u8>,
    paired_devices: Vec<PairedDevice>,
}

struct Inner {
    device_id: String,
    keypair: KeyPair,
    devices: HashMap<String, PairedDevice>,
}

/// Owns all paired-device records and the in-flight pairing table.
///
/// Mutations to paired-device state serialize under a single writer-exclusive
/// lock; readers take a shared lock. The pending table is a lock-free
/// concurrent map (mirrors the room-table pattern used elsewhere in this
/// codebase for similarly short-lived, high-churn state) and is swept for
/// expired entries on every access.
pub struct PairingStore {
    path: PathBuf,
    inner: RwLock<Inner>,
    pending: DashMap<String, PendingPairing>,
}

impl PairingStore {
    /// Load the store from `path`, creating a fresh device identity and an
    /// empty device list if the file does not exist. Malformed paired-device
    /// entries are skipped (and logged) rather than failing the whole load.
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            let keypair = KeyPair::generate();
            let device_id = generate_device_id();
            let store = Self {
                path: path.clone(),
                inner: RwLock::new(Inner {
                    device_id,
                    keypair,
                    devices: HashMap::new(),
                }),
                pending: DashMap::new(),
            };
            store.persist_locked()?;
            return Ok(store);
        }

        let raw = std::fs::read(&path)?;
        let persisted: PersistedState = serde_json::from_slice(&raw)
            .map_err(|e| AuthError::Serialization(e.to_string()))?;

        if persisted.version != STORE_FORMAT_VERSION {
            tracing::warn!(
                version = persisted.version,
                "pairing store has an unexpected version tag, loading anyway"
            );
        }

        let keypair = KeyPair::from_private_bytes(&persisted.private_key)?;

        let mut devices = HashMap::new();
        for device in persisted.paired_devices {
            if device.peer_id.is_empty() || device.peer_public_key.is_empty() {
                tracing::warn!(peer_id = %device.peer_id, "skipping malformed paired-device entry");
                continue;
            }
            devices.insert(device.peer_id.clone(), device);
        }

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                device_id: persisted.device_id,
                keypair,
                devices,
            }),
            pending: DashMap::new(),
        })
    }

    pub fn device_id(&self) -> String {
        self.inner.read().unwrap().device_id.clone()
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.inner.read().unwrap().keypair.public_key_bytes()
    }

    /// Create a pending pairing and the confirmation code both sides will
    /// display. Does not mutate paired-device state.
    pub fn create_pending(
        &self,
        peer_id: String,
        label: String,
        peer_public_key: Vec<u8>,
        peer_address: String,
    ) -> Result<PendingPairing> {
        self.sweep_expired_pending();

        let local_public = self.public_key_bytes();
        let confirm_code = agent_crypto::confirm_code(&local_public, &peer_public_key);
        let challenge_id = generate_device_id();

        let pending = PendingPairing {
            challenge_id: challenge_id.clone(),
            peer_id,
            peer_label: label,
            peer_public_key,
            peer_address,
            confirm_code,
            created_at: now_millis(),
        };

        self.pending.insert(challenge_id, pending.clone());
        Ok(pending)
    }

    pub fn pending(&self, challenge_id: &str) -> Option<PendingPairing> {
        self.sweep_expired_pending();
        self.pending.get(challenge_id).map(|e| e.value().clone())
    }

    pub fn list_pending(&self) -> Vec<PendingPairing> {
        self.sweep_expired_pending();
        self.pending.iter().map(|e| e.value().clone()).collect()
    }

    /// Consume the pending record, derive the shared secret, and store the
    /// new paired device. Returns `Ok(None)` if the challenge does not exist
    /// or has expired.
    pub fn approve(&self, challenge_id: &str) -> Result<Option<PairedDevice>> {
        self.sweep_expired_pending();

        let Some((_, pending)) = self.pending.remove(challenge_id) else {
            return Ok(None);
        };

        let mut inner = self.inner.write().unwrap();
        let shared_secret = inner.keypair.shared_secret(&pending.peer_public_key)?;

        let now = now_millis();
        let device = PairedDevice {
            peer_id: pending.peer_id.clone(),
            human_label: pending.peer_label.clone(),
            peer_public_key: pending.peer_public_key.clone(),
            shared_secret,
            last_known_address: pending.peer_address.clone(),
            paired_at: now,
            last_seen: now,
            trusted: true,
        };
        inner.devices.insert(device.peer_id.clone(), device.clone());
        drop(inner);

        self.persist_locked()?;
        Ok(Some(device))
    }

    /// Drop a pending record without pairing.
    pub fn reject(&self, challenge_id: &str) {
        self.sweep_expired_pending();
        self.pending.remove(challenge_id);
    }

    pub fn get(&self, peer_id: &str) -> Option<PairedDevice> {
        self.inner.read().unwrap().devices.get(peer_id).cloned()
    }

    pub fn list(&self) -> Vec<PairedDevice> {
        self.inner.read().unwrap().devices.values().cloned().collect()
    }

    pub fn revoke(&self, peer_id: &str) -> Result<bool> {
        let removed = {
            let mut inner = self.inner.write().unwrap();
            inner.devices.remove(peer_id).is_some()
        };
        if removed {
            self.persist_locked()?;
        }
        Ok(removed)
    }

    pub fn revoke_all(&self) -> Result<()> {
        {
            let mut inner = self.inner.write().unwrap();
            inner.devices.clear();
        }
        self.persist_locked()
    }

    pub fn update_address(&self, peer_id: &str, address: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(device) = inner.devices.get_mut(peer_id) {
            device.last_known_address = address.to_string();
        }
        drop(inner);
        self.persist_locked()
    }

    pub fn touch_seen(&self, peer_id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(device) = inner.devices.get_mut(peer_id) {
            device.last_seen = now_millis();
        }
        drop(inner);
        self.persist_locked()
    }

    fn sweep_expired_pending(&self) {
        let cutoff = now_millis().saturating_sub(PENDING_LIFETIME_MS);
        self.pending.retain(|_, p| p.created_at >= cutoff);
    }

    fn persist_locked(&self) -> Result<()> {
        let inner = self.inner.read().unwrap();
        let persisted = PersistedState {
            version: STORE_FORMAT_VERSION,
            device_id: inner.device_id.clone(),
            private_key: inner.keypair.private_bytes().to_vec(),
            paired_devices: inner.devices.values().cloned().collect(),
        };
        drop(inner);
        write_atomic(&self.path, &serde_json::to_vec_pretty(&persisted)
            .map_err(|e| AuthError::Serialization(e.to_string()))?)
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn generate_device_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
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

    fn store_at(dir: &std::path::Path) -> PairingStore {
        PairingStore::load_or_create(dir.join("pairing_state")).unwrap()
    }

    #[test]
    fn fresh_store_has_device_identity_and_no_devices() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        assert!(!store.device_id().is_empty());
        assert!(store.list().is_empty());
    }

    #[test]
    fn reload_preserves_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairing_state");
        let store = PairingStore::load_or_create(&path).unwrap();
        let device_id = store.device_id();
        let public_key = store.public_key_bytes();
        drop(store);

        let reloaded = PairingStore::load_or_create(&path).unwrap();
        assert_eq!(reloaded.device_id(), device_id);
        assert_eq!(reloaded.public_key_bytes(), public_key);
    }

    #[test]
    fn approve_completes_pairing_and_derives_matching_secret() {
        let dir = tempdir().unwrap();
        let a = store_at(dir.path());

        let other_dir = tempdir().unwrap();
        let b = store_at(other_dir.path());

        let pending = a
            .create_pending(
                b.device_id(),
                "B's laptop".to_string(),
                b.public_key_bytes(),
                "10.0.0.2:15555".to_string(),
            )
            .unwrap();

        let device = a.approve(&pending.challenge_id).unwrap().unwrap();
        assert_eq!(device.peer_id, b.device_id());
        assert!(device.trusted);

        let b_secret = b
            .inner
            .read()
            .unwrap()
            .keypair
            .shared_secret(&a.public_key_bytes())
            .unwrap();
        assert_eq!(device.shared_secret, b_secret);
    }

    #[test]
    fn approve_unknown_challenge_returns_none() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        assert!(store.approve("does-not-exist").unwrap().is_none());
    }

    #[test]
    fn approve_is_not_repeatable() {
        let dir = tempdir().unwrap();
        let a = store_at(dir.path());
        let other = tempdir().unwrap();
        let b = store_at(other.path());

        let pending = a
            .create_pending(b.device_id(), "B".into(), b.public_key_bytes(), String::new())
            .unwrap();

        assert!(a.approve(&pending.challenge_id).unwrap().is_some());
        assert!(a.approve(&pending.challenge_id).unwrap().is_none());
    }

    #[test]
    fn reject_after_approve_is_a_no_op() {
        let dir = tempdir().unwrap();
        let a = store_at(dir.path());
        let other = tempdir().unwrap();
        let b = store_at(other.path());

        let pending = a
            .create_pending(b.device_id(), "B".into(), b.public_key_bytes(), String::new())
            .unwrap();
        a.approve(&pending.challenge_id).unwrap();

        // Already consumed by approve; reject on the same id touches nothing.
        a.reject(&pending.challenge_id);
        assert_eq!(a.list().len(), 1);
    }

    #[test]
    fn expired_pending_cannot_be_approved() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());

        let pending = store
            .create_pending(
                "peer-1".into(),
                "Peer One".into(),
                vec![4, 1, 2, 3],
                String::new(),
            )
            .unwrap();

        // Force the entry to look older than the 5 minute lifetime.
        store
            .pending
            .get_mut(&pending.challenge_id)
            .unwrap()
            .created_at = now_millis() - PENDING_LIFETIME_MS - 1;

        assert!(store.approve(&pending.challenge_id).unwrap().is_none());
    }

    #[test]
    fn revoke_removes_device() {
        let dir = tempdir().unwrap();
        let a = store_at(dir.path());
        let other = tempdir().unwrap();
        let b = store_at(other.path());

        let pending = a
            .create_pending(b.device_id(), "B".into(), b.public_key_bytes(), String::new())
            .unwrap();
        a.approve(&pending.challenge_id).unwrap();
        assert_eq!(a.list().len(), 1);

        assert!(a.revoke(&b.device_id()).unwrap());
        assert!(a.list().is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairing_state");

        let keypair = KeyPair::generate();
        let persisted = PersistedState {
            version: STORE_FORMAT_VERSION,
            device_id: "dev-1".to_string(),
            private_key: keypair.private_bytes().to_vec(),
            paired_devices: vec![
                PairedDevice {
                    peer_id: String::new(), // malformed: empty peer id
                    human_label: "broken".into(),
                    peer_public_key: vec![],
                    shared_secret: [0u8; 32],
                    last_known_address: String::new(),
                    paired_at: 0,
                    last_seen: 0,
                    trusted: true,
                },
                PairedDevice {
                    peer_id: "good-peer".into(),
                    human_label: "ok".into(),
                    peer_public_key: vec![4, 1, 2, 3],
                    shared_secret: [1u8; 32],
                    last_known_address: String::new(),
                    paired_at: 0,
                    last_seen: 0,
                    trusted: true,
                },
            ],
        };
        std::fs::write(&path, serde_json::to_vec(&persisted).unwrap()).unwrap();

        let store = PairingStore::load_or_create(&path).unwrap();
        assert_eq!(store.list().len(), 1);
        assert!(store.get("good-peer").is_some());
    }

    #[test]
    fn public_view_never_exposes_shared_secret() {
        let device = PairedDevice {
            peer_id: "peer".into(),
            human_label: "label".into(),
            peer_public_key: vec![1, 2, 3],
            shared_secret: [9u8; 32],
            last_known_address: String::new(),
            paired_at: 0,
            last_seen: 0,
            trusted: true,
        };
        let json = serde_json::to_string(&device.public_view()).unwrap();
        assert!(!json.contains("shared_secret"));
    }
}
