//! Property-based tests for agent-protocol's transfer frame encoding.

use agent_protocol::{decode_frame, encode_frame, TransferOp, TransferRequestHeader};
use proptest::prelude::*;

fn op_strategy() -> impl Strategy<Value = TransferOp> {
    prop_oneof![Just(TransferOp::Push), Just(TransferOp::Pull), Just(TransferOp::Stat)]
}

fn path_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9/_.]{1,120}"
}

proptest! {
    // Every request header that fits in the frame round-trips exactly.
    #[test]
    fn request_header_frame_round_trip(
        op in op_strategy(),
        path in path_strategy(),
        size in proptest::option::of(0u64..10_000_000_000),
    ) {
        let header = TransferRequestHeader {
            op,
            path,
            size,
            token: None,
            peer_id: None,
            signature: None,
            timestamp: None,
        };
        let frame = encode_frame(&header).expect("fits in frame");
        prop_assert_eq!(frame.len(), agent_protocol::TRANSFER_HEADER_SIZE);
        let decoded: TransferRequestHeader = decode_frame(&frame).expect("decodes");
        prop_assert_eq!(decoded, header);
    }
}
