//! Wire types shared by the agent's HTTP, transfer, and peer-to-peer
//! protocols.
//!
//! [`error`] defines the uniform JSON error envelope every failing HTTP
//! response carries. [`transfer`] defines the fixed 512-byte header frame
//! that opens and closes every TransferService exchange. [`peer`] and
//! [`orchestrator`] define the request/response bodies exchanged between
//! paired agents — one struct pair per action, since routing here is
//! method/action-based rather than a single tagged message enum.

pub mod error;
pub mod orchestrator;
pub mod peer;
pub mod transfer;

pub use error::{ErrorEnvelope, ProtocolError};
pub use transfer::{
    decode_frame, encode_frame, TransferOp, TransferRequestHeader, TransferResponseHeader,
    TransferStatus, TRANSFER_HEADER_SIZE, TRANSFER_TRAILER_SIZE, UNCOMPUTED_TRAILER,
};
