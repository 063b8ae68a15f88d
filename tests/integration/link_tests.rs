//! Integration tests for the link engine's receive and transmit paths.

use uavlink::config::LinkConfig;
use uavlink::link::codec::MessageType;
use uavlink::link::{LinkEngine, MemoryTransport};
use uavlink::objects::{ALL_INSTANCES, ObjectFlags, ObjectId};

use crate::mock_link::{SENSOR, WAYPOINT, decode, engine, engine_with, frame, registry};

const CONCRETE_FRAME: [u8; 13] = [
    0x3C, 0x20, 0x0C, 0x00, 0xCD, 0xAB, 0x34, 0x12, 0x01, 0x02, 0x03, 0x04, 0xDF,
];

#[test]
fn concrete_frame_is_serialized_exactly() {
    let (engine, wire) = engine();
    let sensor = ObjectId::new(SENSOR);
    engine.registry().set_data(sensor, &[1, 2, 3, 4]).unwrap();
    engine.send_object(sensor, 0, false, 0).unwrap();
    assert_eq!(wire.take_writes(), vec![CONCRETE_FRAME.to_vec()]);
}

#[test]
fn concrete_frame_is_applied_once() {
    let (engine, wire) = engine();
    for b in CONCRETE_FRAME {
        engine.process_input_byte(b);
    }
    let stats = engine.stats();
    assert_eq!(stats.rx_objects, 1);
    assert_eq!(stats.rx_errors, 0);
    assert_eq!(
        engine.registry().pack(ObjectId::new(SENSOR), 0).unwrap(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(wire.write_count(), 0);
}

#[test]
fn every_checksum_bit_flip_is_rejected() {
    let (engine, _wire) = engine();
    for bit in 0..8 {
        let mut bytes = CONCRETE_FRAME;
        bytes[12] ^= 1 << bit;
        engine.process_input(&bytes);
    }
    let stats = engine.stats();
    assert_eq!(stats.rx_errors, 8);
    assert_eq!(stats.rx_objects, 0);
    assert_eq!(
        engine.registry().pack(ObjectId::new(SENSOR), 0).unwrap(),
        vec![0; 4]
    );

    // The parser resynchronizes on the next good frame.
    engine.process_input(&CONCRETE_FRAME);
    assert_eq!(engine.stats().rx_objects, 1);
}

#[test]
fn garbage_between_frames_is_skipped() {
    let (engine, _wire) = engine();
    let mut stream = vec![0x00, 0xFF, 0x13];
    stream.extend_from_slice(&CONCRETE_FRAME);
    stream.extend_from_slice(&[0x55, 0xAA]);
    stream.extend_from_slice(&frame(MessageType::Obj, WAYPOINT, Some(4), &[9, 8]));
    engine.process_input(&stream);

    let stats = engine.stats();
    assert_eq!(stats.rx_objects, 2);
    assert_eq!(stats.rx_errors, 0);
    assert_eq!(
        engine.registry().num_instances(ObjectId::new(WAYPOINT)).unwrap(),
        5
    );
}

#[test]
fn oversized_declared_size_is_dropped_and_parser_resyncs() {
    let (engine, _wire) = engine();
    // Declared size 267 exceeds max header plus max payload.
    engine.process_input(&[0x3C, 0x20, 0x0B, 0x01]);
    assert_eq!(engine.stats().rx_errors, 1);

    engine.process_input(&CONCRETE_FRAME);
    let stats = engine.stats();
    assert_eq!(stats.rx_errors, 1);
    assert_eq!(stats.rx_objects, 1);
}

#[test]
fn object_over_payload_limit_is_dropped() {
    let reg = registry();
    reg.register(0x3000, "Bulk", ObjectFlags::SINGLE, 257)
        .unwrap();
    let (engine, wire) = engine_with(reg);

    // Largest accepted size, addressed at the 257-byte object.
    engine.process_input(&[0x3C, 0x20, 0x0A, 0x01, 0x00, 0x30, 0x00, 0x00]);
    assert_eq!(engine.stats().rx_errors, 1);
    assert_eq!(engine.stats().rx_objects, 0);

    engine.process_input(&CONCRETE_FRAME);
    assert_eq!(engine.stats().rx_objects, 1);
    assert_eq!(wire.write_count(), 0);
}

#[test]
fn single_instance_wildcard_sends_one_frame_for_instance_zero() {
    let (engine, wire) = engine();
    engine
        .send_object(ObjectId::new(SENSOR), ALL_INSTANCES, false, 0)
        .unwrap();
    let writes = wire.take_writes();
    assert_eq!(writes.len(), 1);
    // 8-byte header, no instance field.
    assert_eq!(u16::from_le_bytes([writes[0][2], writes[0][3]]), 8 + 4);
    assert_eq!(
        decode(&writes[0], &**engine.registry()),
        vec![(MessageType::Obj, SENSOR, 0, vec![0; 4])]
    );
}

#[test]
fn unknown_object_request_yields_one_nack() {
    let (engine, wire) = engine();
    let objects_before = engine.registry().object_count();
    engine.process_input(&frame(MessageType::ObjReq, 0x0BAD_0000, None, &[]));

    let writes = wire.take_writes();
    assert_eq!(writes, vec![frame(MessageType::Nack, 0x0BAD_0000, None, &[])]);
    assert_eq!(engine.registry().object_count(), objects_before);
    assert_eq!(engine.stats().rx_errors, 0);
}

#[test]
fn wildcard_request_returns_every_instance() {
    let (engine, wire) = engine();
    let wp = ObjectId::new(WAYPOINT);
    engine.registry().unpack(wp, 1, &[1, 1]).unwrap();
    engine.process_input(&frame(MessageType::ObjReq, WAYPOINT, Some(ALL_INSTANCES), &[]));

    let frames: Vec<_> = wire
        .take_writes()
        .iter()
        .flat_map(|w| decode(w, &**engine.registry()))
        .collect();
    assert_eq!(
        frames,
        vec![
            (MessageType::Obj, WAYPOINT, 0, vec![0, 0]),
            (MessageType::Obj, WAYPOINT, 1, vec![1, 1]),
        ]
    );
}

#[test]
fn nack_is_ignored_on_receive() {
    let (engine, wire) = engine();
    engine.process_input(&frame(MessageType::Nack, SENSOR, None, &[]));
    assert_eq!(engine.stats().rx_objects, 1);
    assert_eq!(engine.stats().rx_errors, 0);
    assert_eq!(wire.write_count(), 0);
}

#[test]
fn transport_failure_counts_tx_error() {
    let (engine, wire) = engine();
    wire.fail_writes(true);
    assert!(engine.send_object(ObjectId::new(SENSOR), 0, false, 0).is_err());
    assert_eq!(engine.stats().tx_errors, 1);
    assert_eq!(engine.stats().tx_objects, 0);
}

#[test]
fn two_engines_stay_in_sync_over_memory_pipe() {
    let flight_reg = registry();
    let ground_reg = registry();
    let (a, b) = MemoryTransport::pair();
    let flight = LinkEngine::new(flight_reg.clone(), a, LinkConfig::default()).unwrap();
    let ground = LinkEngine::new(ground_reg.clone(), b, LinkConfig::default()).unwrap();

    let wp = ObjectId::new(WAYPOINT);
    flight_reg.unpack(wp, 2, &[7, 7]).unwrap();
    flight.send_object(wp, ALL_INSTANCES, false, 0).unwrap();
    while ground.poll_transport().unwrap() > 0 {}

    assert_eq!(ground_reg.num_instances(wp).unwrap(), 3);
    assert_eq!(ground_reg.pack(wp, 2).unwrap(), vec![7, 7]);
    assert_eq!(ground.stats().rx_objects, 3);
    assert_eq!(flight.stats().tx_objects, 3);
    assert_eq!(ground.stats().rx_bytes, flight.stats().tx_bytes);
}
