//! Integration tests for acknowledged transactions.
//!
//! The "peer" is played by the test thread: it watches the recording
//! transport and feeds the matching reply back into the engine.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use uavlink::error::{Error, LinkError};
use uavlink::link::codec::MessageType;
use uavlink::objects::ObjectId;

use crate::mock_link::{SENSOR, WAYPOINT, Wire, engine, frame};

fn wait_for_writes(wire: &Wire, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while wire.write_count() < n {
        assert!(Instant::now() < deadline, "engine never transmitted");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn acked_send_succeeds_when_ack_arrives() {
    let (engine, wire) = engine();
    let engine = Arc::new(engine);
    let sender = engine.clone();
    let h = thread::spawn(move || sender.send_object(ObjectId::new(SENSOR), 0, true, 2_000));

    wait_for_writes(&wire, 1);
    assert_eq!(wire.writes()[0][1], MessageType::ObjAck as u8);
    engine.process_input(&frame(MessageType::Ack, SENSOR, None, &[]));

    assert_eq!(h.join().unwrap(), Ok(()));
    assert!(!engine.transaction_pending());
}

#[test]
fn acked_send_times_out_without_ack() {
    let (engine, wire) = engine();
    let start = Instant::now();
    let r = engine.send_object(ObjectId::new(SENSOR), 0, true, 50);
    let elapsed = start.elapsed();

    assert_eq!(r, Err(Error::Link(LinkError::Timeout)));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(wire.write_count(), 1);
    assert!(!engine.transaction_pending());
}

#[test]
fn ack_for_other_instance_does_not_resolve() {
    let (engine, wire) = engine();
    let engine = Arc::new(engine);
    let sender = engine.clone();
    let h = thread::spawn(move || sender.send_object(ObjectId::new(WAYPOINT), 0, true, 100));

    wait_for_writes(&wire, 1);
    engine.process_input(&frame(MessageType::Ack, WAYPOINT, Some(1), &[]));
    engine.process_input(&frame(MessageType::Ack, SENSOR, None, &[]));

    assert_eq!(h.join().unwrap(), Err(Error::Link(LinkError::Timeout)));
}

#[test]
fn request_resolves_on_object_reply() {
    let (engine, wire) = engine();
    let engine = Arc::new(engine);
    let requester = engine.clone();
    let h = thread::spawn(move || requester.send_object_request(ObjectId::new(SENSOR), 0, 2_000));

    wait_for_writes(&wire, 1);
    assert_eq!(wire.writes()[0], frame(MessageType::ObjReq, SENSOR, None, &[]));
    engine.process_input(&frame(MessageType::Obj, SENSOR, None, &[4, 3, 2, 1]));

    assert_eq!(h.join().unwrap(), Ok(()));
    assert_eq!(
        engine.registry().pack(ObjectId::new(SENSOR), 0).unwrap(),
        vec![4, 3, 2, 1]
    );
}

#[test]
fn object_that_fails_to_unpack_does_not_resolve_request() {
    let (engine, wire) = engine();
    let engine = Arc::new(engine);
    let requester = engine.clone();
    // Above the default instance ceiling, so the reply cannot be stored.
    let h = thread::spawn(move || requester.send_object_request(ObjectId::new(WAYPOINT), 1500, 80));

    wait_for_writes(&wire, 1);
    engine.process_input(&frame(MessageType::Obj, WAYPOINT, Some(1500), &[1, 2]));

    assert_eq!(h.join().unwrap(), Err(Error::Link(LinkError::Timeout)));
    let stats = engine.stats();
    assert_eq!(stats.rx_objects, 1);
    assert_eq!(stats.rx_errors, 1);
    assert_eq!(engine.registry().num_instances(ObjectId::new(WAYPOINT)).unwrap(), 1);
}

#[test]
fn nack_leaves_request_to_time_out() {
    let (engine, wire) = engine();
    let engine = Arc::new(engine);
    let requester = engine.clone();
    let h = thread::spawn(move || requester.send_object_request(ObjectId::new(SENSOR), 0, 60));

    wait_for_writes(&wire, 1);
    engine.process_input(&frame(MessageType::Nack, SENSOR, None, &[]));
    assert_eq!(h.join().unwrap(), Err(Error::Link(LinkError::Timeout)));
}

#[test]
fn acked_transactions_run_one_at_a_time() {
    let (engine, wire) = engine();
    let engine = Arc::new(engine);

    let first = engine.clone();
    let h1 = thread::spawn(move || first.send_object(ObjectId::new(SENSOR), 0, true, 2_000));
    wait_for_writes(&wire, 1);

    let second = engine.clone();
    let h2 = thread::spawn(move || second.send_object(ObjectId::new(WAYPOINT), 0, true, 2_000));

    // The second transaction must not transmit while the first is pending.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(wire.write_count(), 1);

    engine.process_input(&frame(MessageType::Ack, SENSOR, None, &[]));
    assert_eq!(h1.join().unwrap(), Ok(()));

    wait_for_writes(&wire, 2);
    engine.process_input(&frame(MessageType::Ack, WAYPOINT, Some(0), &[]));
    assert_eq!(h2.join().unwrap(), Ok(()));
}

#[test]
fn plain_send_proceeds_during_pending_transaction() {
    let (engine, wire) = engine();
    let engine = Arc::new(engine);
    let sender = engine.clone();
    let h = thread::spawn(move || sender.send_object(ObjectId::new(SENSOR), 0, true, 2_000));
    wait_for_writes(&wire, 1);

    engine
        .send_object(ObjectId::new(WAYPOINT), 0, false, 0)
        .unwrap();
    assert_eq!(wire.write_count(), 2);

    engine.process_input(&frame(MessageType::Ack, SENSOR, None, &[]));
    assert_eq!(h.join().unwrap(), Ok(()));
}
