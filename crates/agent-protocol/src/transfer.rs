//! The fixed-size header frame that opens and closes every TransferService
//! exchange: a 512-byte, NUL-padded, UTF-8 JSON object.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Size in bytes of every transfer header frame, request or response.
pub const TRANSFER_HEADER_SIZE: usize = 512;

/// Length of the trailing content digest that follows a push/pull payload.
pub const TRANSFER_TRAILER_SIZE: usize = 32;

/// A trailer of all-zero bytes means "client did not compute a digest" and
/// is accepted rather than compared.
pub const UNCOMPUTED_TRAILER: [u8; TRANSFER_TRAILER_SIZE] = [0u8; TRANSFER_TRAILER_SIZE];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferOp {
    Push,
    Pull,
    Stat,
}

/// The header a transfer client sends to open an exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRequestHeader {
    pub op: TransferOp,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Ok,
    HashMismatch,
    Error,
}

/// The header a transfer server replies with (push: after reading the
/// trailer; pull: before streaming the payload; stat: the entire response).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferResponseHeader {
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_dir: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransferResponseHeader {
    pub fn ok(size: u64, hash: String) -> Self {
        Self {
            status: TransferStatus::Ok,
            size: Some(size),
            hash: Some(hash),
            exists: None,
            is_dir: None,
            mtime: None,
            message: None,
        }
    }

    pub fn hash_mismatch(size: u64, server_hash: String) -> Self {
        Self {
            status: TransferStatus::HashMismatch,
            size: Some(size),
            hash: Some(server_hash),
            exists: None,
            is_dir: None,
            mtime: None,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TransferStatus::Error,
            size: None,
            hash: None,
            exists: None,
            is_dir: None,
            mtime: None,
            message: Some(message.into()),
        }
    }
}

/// Encode `value` as a JSON object padded with NUL bytes to exactly
/// [`TRANSFER_HEADER_SIZE`] bytes. Fails if the JSON encoding itself does
/// not fit.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<[u8; TRANSFER_HEADER_SIZE]> {
    let json = serde_json::to_vec(value).map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
    if json.len() > TRANSFER_HEADER_SIZE {
        return Err(ProtocolError::FrameError(format!(
            "encoded header is {} bytes, exceeds {TRANSFER_HEADER_SIZE}",
            json.len()
        )));
    }
    let mut frame = [0u8; TRANSFER_HEADER_SIZE];
    frame[..json.len()].copy_from_slice(&json);
    Ok(frame)
}

/// Decode a [`TRANSFER_HEADER_SIZE`]-byte frame back into `T`, trimming the
/// trailing NUL padding before parsing.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(frame: &[u8]) -> Result<T> {
    let end = frame.iter().position(|&b| b == 0).unwrap_or(frame.len());
    serde_json::from_slice(&frame[..end]).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_round_trips_through_frame() {
        let header = TransferRequestHeader {
            op: TransferOp::Push,
            path: "/sdcard/DCIM/photo.jpg".to_string(),
            size: Some(123_456),
            token: Some("abc123".to_string()),
            peer_id: None,
            signature: None,
            timestamp: None,
        };
        let frame = encode_frame(&header).unwrap();
        assert_eq!(frame.len(), TRANSFER_HEADER_SIZE);
        let decoded: TransferRequestHeader = decode_frame(&frame).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn response_header_round_trips_through_frame() {
        let header = TransferResponseHeader::ok(1024, "deadbeef".repeat(8));
        let frame = encode_frame(&header).unwrap();
        let decoded: TransferResponseHeader = decode_frame(&frame).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn stat_response_carries_no_payload_fields() {
        let header = TransferResponseHeader {
            status: TransferStatus::Ok,
            size: Some(42),
            hash: None,
            exists: Some(true),
            is_dir: Some(false),
            mtime: Some(1_700_000_000_000),
            message: None,
        };
        let frame = encode_frame(&header).unwrap();
        let decoded: TransferResponseHeader = decode_frame(&frame).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn oversized_header_rejected() {
        let header = TransferRequestHeader {
            op: TransferOp::Push,
            path: "x".repeat(1000),
            size: None,
            token: None,
            peer_id: None,
            signature: None,
            timestamp: None,
        };
        assert!(matches!(encode_frame(&header), Err(ProtocolError::FrameError(_))));
    }

    #[test]
    fn uncomputed_trailer_is_all_zero() {
        assert_eq!(UNCOMPUTED_TRAILER, [0u8; TRANSFER_TRAILER_SIZE]);
    }

    #[test]
    fn op_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TransferOp::Pull).unwrap(), r#""pull""#);
    }
}
