//! Integration tests for the object registry.
//!
//! Covers registration uniqueness, instance back-fill ordering, access
//! rights and subscriber delivery through the public API only.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uavlink::error::{Error, RegistryError};
use uavlink::objects::{
    ALL_INSTANCES, AccessMode, EventCallback, EventKind, EventQueue, Metadata, ObjectEvent,
    ObjectFlags, ObjectId, drain_events,
};

use crate::mock_link::{SENSOR, WAYPOINT, registry};

static BACKFILL_EVENTS: EventQueue = EventQueue::new();
static MASKED_EVENTS: EventQueue = EventQueue::new();

#[test]
fn second_registration_fails_and_keeps_first_object() {
    let reg = registry();
    let sensor = reg.get_by_id(SENSOR).expect("sensor registered");
    reg.set_data(sensor, &[0xA, 0xB, 0xC, 0xD]).unwrap();

    let again = reg.register(SENSOR, "Impostor", ObjectFlags::MULTI, 16);
    assert_eq!(again, Err(Error::Registry(RegistryError::DuplicateId)));

    let info = reg.info(sensor).unwrap();
    assert_eq!(info.name, "Sensor");
    assert_eq!(info.num_bytes, 4);
    assert!(info.flags.single_instance);
    assert_eq!(reg.pack(sensor, 0).unwrap(), vec![0xA, 0xB, 0xC, 0xD]);
    assert_eq!(reg.get_by_name("Impostor"), None);
}

#[test]
fn unpack_backfills_in_order_with_events() {
    let reg = registry();
    let wp = reg.get_by_id(WAYPOINT).unwrap();
    assert_eq!(reg.create_instance(wp).unwrap(), 1);
    reg.connect_queue(wp, &BACKFILL_EVENTS, EventKind::Updated.into())
        .unwrap();

    reg.unpack(wp, 3, &[0x33, 0x44]).unwrap();

    let mut events = Vec::new();
    drain_events(&BACKFILL_EVENTS, |e| events.push(e));
    let instances: Vec<u16> = events.iter().map(|e| e.instance).collect();
    assert_eq!(instances, vec![2, 3]);
    assert!(events.iter().all(|e| e.kind == EventKind::Updated && e.object == wp));

    assert_eq!(reg.num_instances(wp).unwrap(), 4);
    assert_eq!(reg.pack(wp, 3).unwrap(), vec![0x33, 0x44]);
    assert_eq!(reg.pack(wp, 2).unwrap(), vec![0, 0]);
}

#[test]
fn read_only_object_refuses_local_writes() {
    let reg = registry();
    let sensor = ObjectId::new(SENSOR);
    let mut meta = reg.get_metadata(sensor).unwrap();
    meta.access = AccessMode::ReadOnly;
    reg.set_metadata(sensor, &meta).unwrap();

    assert!(reg.is_read_only(sensor).unwrap());
    assert_eq!(
        reg.set_data(sensor, &[1, 2, 3, 4]),
        Err(Error::Registry(RegistryError::AccessDenied))
    );
    assert_eq!(reg.pack(sensor, 0).unwrap(), vec![0, 0, 0, 0]);

    reg.set_metadata(sensor, &Metadata::DEFAULT).unwrap();
    reg.set_data(sensor, &[1, 2, 3, 4]).unwrap();
}

#[test]
fn metaobject_is_linked_and_named() {
    let reg = registry();
    let wp = ObjectId::new(WAYPOINT);
    let meta = reg.linked_object(wp).unwrap().expect("metaobject");
    assert_eq!(meta.raw(), WAYPOINT + 1);
    assert_eq!(reg.get_by_name("WaypointMeta"), Some(meta));
    assert!(reg.is_metaobject(meta).unwrap());
    assert_eq!(reg.num_bytes(meta).unwrap(), 19);
    assert_eq!(
        reg.create_instance(meta),
        Err(Error::Registry(RegistryError::SingleInstance))
    );
}

#[test]
fn mask_selects_event_kinds() {
    let reg = registry();
    let wp = ObjectId::new(WAYPOINT);
    reg.connect_queue(wp, &MASKED_EVENTS, EventKind::UpdateRequested.into())
        .unwrap();

    reg.set_data(wp, &[1, 1]).unwrap();
    reg.updated(wp).unwrap();
    reg.request_instance_update(wp, 0).unwrap();

    let mut kinds = Vec::new();
    drain_events(&MASKED_EVENTS, |e| kinds.push((e.kind, e.instance)));
    assert_eq!(kinds, vec![(EventKind::UpdateRequested, 0)]);

    reg.disconnect_queue(wp, &MASKED_EVENTS).unwrap();
    assert_eq!(
        reg.disconnect_queue(wp, &MASKED_EVENTS),
        Err(Error::Registry(RegistryError::NotSubscribed))
    );
}

#[test]
fn callback_reconnect_updates_mask() {
    let reg = registry();
    let sensor = ObjectId::new(SENSOR);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let cb: EventCallback = Arc::new(move |_: &ObjectEvent| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    reg.connect_callback(sensor, cb.clone(), EventKind::UpdatedManual.into())
        .unwrap();
    reg.connect_callback(sensor, cb.clone(), EventKind::Updated.into())
        .unwrap();
    assert_eq!(reg.info(sensor).unwrap().subscribers, 1);

    reg.updated(sensor).unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 0);
    reg.set_data(sensor, &[0; 4]).unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 1);
}

#[test]
fn wildcard_is_not_a_writable_instance() {
    let reg = registry();
    let wp = ObjectId::new(WAYPOINT);
    assert!(reg.unpack(wp, ALL_INSTANCES, &[0, 0]).is_err());
    assert_eq!(reg.num_instances(wp).unwrap(), 1);
}
