//! Fuzz target: `FrameParser::push`
//!
//! Drives arbitrary byte sequences into the byte-at-a-time parser and
//! asserts that it never panics, never yields a payload larger than one
//! frame, and always accepts a clean frame after a reset.
//!
//! cargo fuzz run fuzz_frame_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use uavlink::link::codec::{
    FrameParser, MAX_PACKET_LENGTH, MAX_PAYLOAD_LENGTH, MessageType, ObjectLookup, ObjectShape,
    ParseStatus, encode_frame,
};

/// Even ids are multi-instance, odd ids single-instance, size from the low byte.
struct Synthetic;

impl ObjectLookup for Synthetic {
    fn shape(&self, object_id: u32) -> Option<ObjectShape> {
        (object_id & 0x8000_0000 == 0).then(|| ObjectShape {
            num_bytes: (object_id & 0x1FF) as usize,
            single_instance: object_id & 1 == 1,
        })
    }
}

fuzz_target!(|data: &[u8]| {
    let mut parser = FrameParser::new();

    for &b in data {
        if let ParseStatus::Complete(frame) = parser.push(b, &Synthetic) {
            assert!(frame.payload.len() <= MAX_PAYLOAD_LENGTH, "payload exceeds one frame");
        }
    }

    // After a reset the parser must accept a known-good frame.
    parser.reset();
    let mut buf = [0u8; MAX_PACKET_LENGTH];
    let n = encode_frame(MessageType::Obj, 0x0000_0003, None, &[1, 2, 3], &mut buf).unwrap();
    let mut complete = 0;
    for &b in &buf[..n] {
        if let ParseStatus::Complete(_) = parser.push(b, &Synthetic) {
            complete += 1;
        }
    }
    assert_eq!(complete, 1);
});
