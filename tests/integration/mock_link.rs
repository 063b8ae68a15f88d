//! Recording transport for integration tests.
//!
//! Captures every write as one entry so tests can assert on the exact
//! frames an engine emitted, while the engine owns the transport.

use std::sync::Arc;

use parking_lot::Mutex;
use uavlink::config::LinkConfig;
use uavlink::link::codec::{FrameParser, MAX_PACKET_LENGTH, MessageType, ObjectLookup, ParseStatus, encode_frame};
use uavlink::link::{LinkEngine, Transport};
use uavlink::objects::{ObjectFlags, ObjectRegistry};

pub const SENSOR: u32 = 0x1234_ABCD;
pub const WAYPOINT: u32 = 0x0000_2000;

// ── RecordingTransport ────────────────────────────────────────

#[derive(Default)]
struct Shared {
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
}

/// Handle kept by the test to inspect what the engine wrote.
#[derive(Clone, Default)]
pub struct Wire(Arc<Mutex<Shared>>);

impl Wire {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.lock().writes.clone()
    }

    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.0.lock().writes)
    }

    pub fn write_count(&self) -> usize {
        self.0.lock().writes.len()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.lock().fail_writes = fail;
    }
}

pub struct RecordingTransport(Wire);

impl Transport for RecordingTransport {
    type Error = &'static str;

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        let mut shared = self.0.0.lock();
        if shared.fail_writes {
            return Err("link down");
        }
        shared.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// Registry with a single-instance `Sensor` (4 bytes) and a
/// multi-instance `Waypoint` (2 bytes).
pub fn registry() -> Arc<ObjectRegistry> {
    let reg = ObjectRegistry::default();
    reg.register(SENSOR, "Sensor", ObjectFlags::SINGLE, 4)
        .expect("register sensor");
    reg.register(WAYPOINT, "Waypoint", ObjectFlags::MULTI, 2)
        .expect("register waypoint");
    Arc::new(reg)
}

pub fn engine() -> (LinkEngine<RecordingTransport>, Wire) {
    engine_with(registry())
}

pub fn engine_with(registry: Arc<ObjectRegistry>) -> (LinkEngine<RecordingTransport>, Wire) {
    let wire = Wire::default();
    let engine = LinkEngine::new(registry, RecordingTransport(wire.clone()), LinkConfig::default())
        .expect("default config is valid");
    (engine, wire)
}

pub fn frame(kind: MessageType, id: u32, inst: Option<u16>, payload: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; MAX_PACKET_LENGTH];
    let n = encode_frame(kind, id, inst, payload, &mut buf).expect("frame fits");
    buf[..n].to_vec()
}

/// Decoded frame: (type, object id, instance, payload).
pub type Decoded = (MessageType, u32, u16, Vec<u8>);

pub fn decode(bytes: &[u8], lookup: &impl ObjectLookup) -> Vec<Decoded> {
    let mut parser = FrameParser::new();
    let mut out = Vec::new();
    for &b in bytes {
        if let ParseStatus::Complete(f) = parser.push(b, lookup) {
            out.push((f.kind, f.object_id, f.instance, f.payload.to_vec()));
        }
    }
    out
}
