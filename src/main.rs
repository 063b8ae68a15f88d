//! UAVLink loopback demo.
//!
//! Wires a "flight" and a "ground" engine back-to-back over in-memory
//! pipes and runs the three transaction shapes of the link:
//!
//! ```text
//! ┌──────────────┐   MemoryTransport   ┌──────────────┐
//! │ ground       │ ───── OBJ_REQ ────▶ │ flight       │
//! │ LinkEngine   │ ◀──── OBJ ───────── │ LinkEngine   │
//! │              │ ───── OBJ_ACK ────▶ │              │
//! │              │ ◀──── ACK ───────── │              │
//! │              │ ───── OBJ_REQ ────▶ │ (unknown id) │
//! │              │ ◀──── NACK ──────── │              │
//! └──────────────┘                     └──────────────┘
//! ```
//!
//! Run with `RUST_LOG=debug` to see every transaction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use log::{info, warn};

use uavlink::config::LinkConfig;
use uavlink::diagnostics::Diagnostics;
use uavlink::error::{Error, LinkError};
use uavlink::link::{LinkEngine, MemoryTransport};
use uavlink::objects::{DataObject, EventKind, EventQueue, ObjectFlags, ObjectRegistry, drain_events};

type Engine = LinkEngine<MemoryTransport>;

const WAYPOINT_ID: u32 = 0x0000_2000;
const GROUND_ONLY_ID: u32 = 0x0000_3000;

static WAYPOINT_EVENTS: EventQueue = EventQueue::new();

/// Vehicle attitude, single instance.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Attitude {
    roll_deg: f32,
    pitch_deg: f32,
    yaw_deg: f32,
}

impl DataObject for Attitude {
    const OBJECT_ID: u32 = 0x0000_1000;
    const NAME: &'static str = "Attitude";
    const FLAGS: ObjectFlags = ObjectFlags::SINGLE;
    const NUM_BYTES: usize = 12;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.roll_deg.to_le_bytes());
        out[4..8].copy_from_slice(&self.pitch_deg.to_le_bytes());
        out[8..12].copy_from_slice(&self.yaw_deg.to_le_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        let f = |i: usize| f32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Self {
            roll_deg: f(0),
            pitch_deg: f(4),
            yaw_deg: f(8),
        }
    }
}

fn build_registry(config: &LinkConfig) -> Result<Arc<ObjectRegistry>> {
    let registry = ObjectRegistry::new(config);
    registry.register_type::<Attitude>()?;
    registry.register(WAYPOINT_ID, "Waypoint", ObjectFlags::MULTI, 8)?;
    Ok(Arc::new(registry))
}

fn spawn_reader(name: &str, engine: Arc<Engine>, stop: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    let label = name.to_owned();
    let handle = thread::Builder::new()
        .name(format!("{name}-rx"))
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match engine.poll_transport() {
                    Ok(0) => thread::sleep(Duration::from_millis(1)),
                    Ok(_) => {}
                    Err(e) => {
                        warn!("{}: reader stopped: {}", label, e);
                        break;
                    }
                }
            }
        })?;
    Ok(handle)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("UAVLink loopback v{}", env!("CARGO_PKG_VERSION"));

    let config = LinkConfig::default();
    config.validate()?;
    let timeout_ms = config.transaction_timeout_ms;

    // ── 1. Registries and engines ─────────────────────────────
    let flight_registry = build_registry(&config)?;
    let ground_registry = build_registry(&config)?;
    ground_registry.register(GROUND_ONLY_ID, "GroundOnly", ObjectFlags::SINGLE, 4)?;

    let (flight_end, ground_end) = MemoryTransport::pair();
    let flight = Arc::new(LinkEngine::new(flight_registry.clone(), flight_end, config.clone())?);
    let ground = Arc::new(LinkEngine::new(ground_registry.clone(), ground_end, config)?);

    let waypoint = flight_registry
        .get_by_id(WAYPOINT_ID)
        .context("waypoint not registered")?;
    flight_registry.connect_queue(waypoint, &WAYPOINT_EVENTS, EventKind::Updated.into())?;

    let stop = Arc::new(AtomicBool::new(false));
    let readers = [
        spawn_reader("flight", flight.clone(), stop.clone())?,
        spawn_reader("ground", ground.clone(), stop.clone())?,
    ];

    // ── 2. Ground requests the flight attitude ────────────────
    let attitude = Attitude {
        roll_deg: 2.5,
        pitch_deg: -1.0,
        yaw_deg: 270.0,
    };
    flight_registry.set_typed(0, &attitude)?;

    let att_obj = ground_registry
        .get_by_id(Attitude::OBJECT_ID)
        .context("attitude not registered")?;
    ground
        .send_object_request(att_obj, 0, timeout_ms)
        .context("attitude request")?;
    let received: Attitude = ground_registry.get_typed(0)?;
    ensure!(received == attitude, "attitude mismatch: {:?}", received);
    info!("ground: attitude {:?}", received);

    // ── 3. Ground uploads waypoint 2, acknowledged ────────────
    let ground_wp = ground_registry
        .get_by_id(WAYPOINT_ID)
        .context("waypoint not registered")?;
    ground_registry.create_instance(ground_wp)?;
    ground_registry.create_instance(ground_wp)?;
    let mut wp_data = [0u8; 8];
    wp_data[..4].copy_from_slice(&47.397_f32.to_le_bytes());
    wp_data[4..].copy_from_slice(&8.545_f32.to_le_bytes());
    ground_registry.set_instance_data(ground_wp, 2, &wp_data)?;

    ground
        .send_object(ground_wp, 2, true, timeout_ms)
        .context("waypoint upload")?;
    ensure!(flight_registry.num_instances(waypoint)? == 3, "waypoint back-fill failed");
    drain_events(&WAYPOINT_EVENTS, |e| {
        info!("flight: waypoint instance {} {:?}", e.instance, e.kind);
    });

    // ── 4. Request an object the flight side does not know ────
    let ground_only = ground_registry
        .get_by_id(GROUND_ONLY_ID)
        .context("ground-only object not registered")?;
    match ground.send_object_request(ground_only, 0, timeout_ms) {
        Err(Error::Link(LinkError::Timeout)) => info!("ground: unknown object NACKed, request timed out"),
        other => warn!("ground: unexpected outcome {:?}", other),
    }

    // ── 5. Shutdown and report ────────────────────────────────
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        if r.join().is_err() {
            warn!("reader thread panicked");
        }
    }

    for (name, engine) in [("flight", &flight), ("ground", &ground)] {
        info!("{}:", name);
        let diag = Diagnostics::collect(&**engine);
        diag.log();
        info!("{}: diagnostics record {} bytes", name, diag.to_bytes()?.len());
    }

    Ok(())
}
