//! Fuzz target: `LinkEngine::process_input`
//!
//! Feeds arbitrary bytes into an engine with a small registry and checks
//! the registry invariants hold afterwards: instance 0 of every object
//! survives and metaobjects keep exactly one instance.
//!
//! cargo fuzz run fuzz_link_engine

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use uavlink::config::LinkConfig;
use uavlink::link::{LinkEngine, NullTransport};
use uavlink::objects::{ObjectFlags, ObjectRegistry};

fuzz_target!(|data: &[u8]| {
    let config = LinkConfig {
        max_instances: 32,
        ..LinkConfig::default()
    };
    let registry = Arc::new(ObjectRegistry::new(&config));
    let _ = registry.register(0x10, "Gps", ObjectFlags::SINGLE, 4);
    let _ = registry.register(0x20, "Track", ObjectFlags::MULTI, 2);
    let engine = LinkEngine::new(registry.clone(), NullTransport, config).unwrap();

    engine.process_input(data);

    let stats = engine.stats();
    assert_eq!(stats.rx_bytes as usize, data.len());
    registry.iterate(|obj| {
        let count = registry.num_instances(obj).unwrap();
        assert!(count >= 1);
        if registry.is_metaobject(obj).unwrap() {
            assert_eq!(count, 1);
        }
    });
});
