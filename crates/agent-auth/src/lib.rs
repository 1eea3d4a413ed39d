//! Pairing storage and request authentication for the agent core.
//!
//! [`pairing_store`] persists this agent's identity and its paired-device
//! list to a single file and tracks in-flight pairing challenges.
//! [`auth_gate`] validates inbound requests against either a static
//! controller token or a paired peer's HMAC signature.

pub mod auth_gate;
pub mod error;
pub mod pairing_store;

pub use auth_gate::{AuthGate, Principal, RequestContext};
pub use error::AuthError;
pub use pairing_store::{PairedDevice, PairedDeviceView, PairingStore, PendingPairing};
