//! Link engine: object frames in, registry updates out, and back.
//!
//! The engine owns a [`Transport`] and a [`FrameParser`]. Bytes are fed
//! via [`LinkEngine::process_input_byte`] (or pulled with
//! [`LinkEngine::poll_transport`]); every complete frame is dispatched:
//!
//! | Type    | Action                                                    |
//! |---------|-----------------------------------------------------------|
//! | OBJ     | unpack into the registry, resolve a matching transaction  |
//! | OBJ_ACK | unpack, answer with ACK                                   |
//! | OBJ_REQ | answer with OBJ (every instance for the wildcard) or NACK |
//! | ACK     | resolve a matching transaction                            |
//! | NACK    | ignored, the requester times out                          |
//!
//! Locking:
//!
//! - A reentrant mutex makes one receive call and one send call mutually
//!   exclusive. It is reentrant so that replies sent from the receive
//!   path, and subscriber callbacks that send, do not deadlock.
//! - Acknowledged sends additionally take the [`TransactionLock`]: one
//!   transaction is in flight at a time, FIFO. The initiator waits on the
//!   [`ResponseSignal`] *without* holding the engine lock.
//!
//! Subscriber callbacks run on the receiving thread with the engine lock
//! held. They may send plain objects but must not start acknowledged
//! transactions.

use core::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::objects::{ALL_INSTANCES, ObjectId, ObjectRegistry};

use super::codec::{
    FrameParser, MAX_PACKET_LENGTH, MAX_PAYLOAD_LENGTH, MessageType, ObjectLookup, ParseStatus,
    encode_frame, has_instance_field,
};
use super::transaction::{PendingResponse, ResponseSignal, TransactionLock};
use super::transport::Transport;

/// Link traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub tx_bytes: u32,
    pub rx_bytes: u32,
    /// Object payload bytes sent.
    pub tx_object_bytes: u32,
    /// Object payload bytes received.
    pub rx_object_bytes: u32,
    /// Frames sent, NACKs excluded.
    pub tx_objects: u32,
    /// Frames received intact.
    pub rx_objects: u32,
    pub tx_errors: u32,
    /// Frames dropped or refused.
    pub rx_errors: u32,
}

/// Owned copy of a parsed frame, released from the parser borrow.
struct Received {
    kind: MessageType,
    object_id: u32,
    instance: u16,
    payload: heapless::Vec<u8, MAX_PAYLOAD_LENGTH>,
}

struct EngineState<T> {
    parser: FrameParser,
    transport: T,
    tx_buf: [u8; MAX_PACKET_LENGTH],
    stats: LinkStats,
    pending: Option<PendingResponse>,
}

/// Protocol engine bound to one transport.
pub struct LinkEngine<T: Transport> {
    registry: Arc<ObjectRegistry>,
    state: ReentrantMutex<RefCell<EngineState<T>>>,
    transactions: TransactionLock,
    response: ResponseSignal,
    config: LinkConfig,
}

impl<T: Transport> LinkEngine<T> {
    pub fn new(registry: Arc<ObjectRegistry>, transport: T, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            state: ReentrantMutex::new(RefCell::new(EngineState {
                parser: FrameParser::new(),
                transport,
                tx_buf: [0; MAX_PACKET_LENGTH],
                stats: LinkStats::default(),
                pending: None,
            })),
            transactions: TransactionLock::new(),
            response: ResponseSignal::new(),
            config,
        })
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn stats(&self) -> LinkStats {
        self.state.lock().borrow().stats
    }

    pub fn reset_stats(&self) {
        self.state.lock().borrow_mut().stats = LinkStats::default();
    }

    /// Whether an acknowledged transaction is waiting for its response.
    pub fn transaction_pending(&self) -> bool {
        self.state.lock().borrow().pending.is_some()
    }

    /// Run `f` with exclusive access to the transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        f(&mut st.transport)
    }

    // ── Receive path ──────────────────────────────────────────

    /// Feed one received byte.
    pub fn process_input_byte(&self, byte: u8) {
        let guard = self.state.lock();

        let received = {
            let mut st = guard.borrow_mut();
            let st = &mut *st;
            st.stats.rx_bytes = st.stats.rx_bytes.wrapping_add(1);

            match st.parser.push(byte, &*self.registry) {
                ParseStatus::Pending => None,
                ParseStatus::Rejected(reason) => {
                    st.stats.rx_errors = st.stats.rx_errors.wrapping_add(1);
                    trace!("link: frame dropped ({:?})", reason);
                    None
                }
                ParseStatus::Complete(frame) => {
                    match heapless::Vec::from_slice(frame.payload) {
                        Ok(payload) => {
                            st.stats.rx_objects = st.stats.rx_objects.wrapping_add(1);
                            st.stats.rx_object_bytes = st
                                .stats
                                .rx_object_bytes
                                .wrapping_add(frame.payload.len() as u32);
                            Some(Received {
                                kind: frame.kind,
                                object_id: frame.object_id,
                                instance: frame.instance,
                                payload,
                            })
                        }
                        Err(()) => {
                            st.stats.rx_errors = st.stats.rx_errors.wrapping_add(1);
                            None
                        }
                    }
                }
            }
        };

        if let Some(frame) = received {
            if let Err(e) = self.dispatch(&frame) {
                debug!(
                    "link: {:?} 0x{:08X}/{} refused: {}",
                    frame.kind, frame.object_id, frame.instance, e
                );
                let mut st = guard.borrow_mut();
                st.stats.rx_errors = st.stats.rx_errors.wrapping_add(1);
            }
        }
    }

    /// Feed a run of received bytes.
    pub fn process_input(&self, data: &[u8]) {
        for &b in data {
            self.process_input_byte(b);
        }
    }

    /// Pull up to `rx_chunk_size` bytes from the transport and process them.
    ///
    /// Returns the number of bytes read.
    pub fn poll_transport(&self) -> Result<usize> {
        let mut buf = [0u8; MAX_PAYLOAD_LENGTH];
        let chunk = &mut buf[..self.config.rx_chunk_size.min(MAX_PAYLOAD_LENGTH)];
        let n = self.with_transport(|t| t.read(chunk)).map_err(|e| {
            warn!("link: transport read failed: {:?}", e);
            LinkError::Transport
        })?;
        self.process_input(&chunk[..n]);
        Ok(n)
    }

    fn dispatch(&self, frame: &Received) -> Result<()> {
        trace!(
            "link: rx {:?} 0x{:08X}/{} ({} bytes)",
            frame.kind,
            frame.object_id,
            frame.instance,
            frame.payload.len()
        );

        match frame.kind {
            MessageType::Obj => {
                let obj = self.writable_target(frame)?;
                self.registry.unpack(obj, frame.instance, &frame.payload)?;
                self.resolve_pending(frame.object_id, frame.instance);
                Ok(())
            }
            MessageType::ObjAck => {
                let obj = self.writable_target(frame)?;
                self.registry.unpack(obj, frame.instance, &frame.payload)?;
                self.transmit(MessageType::Ack, obj, frame.instance)
            }
            MessageType::ObjReq => match self.registry.get_by_id(frame.object_id) {
                Some(obj) => self.transmit(MessageType::Obj, obj, frame.instance),
                None => self.send_nack(frame.object_id),
            },
            MessageType::Ack => {
                if frame.instance == ALL_INSTANCES {
                    return Err(LinkError::InvalidInstance.into());
                }
                self.resolve_pending(frame.object_id, frame.instance);
                Ok(())
            }
            MessageType::Nack => Ok(()),
        }
    }

    fn writable_target(&self, frame: &Received) -> Result<ObjectId> {
        if frame.instance == ALL_INSTANCES {
            return Err(LinkError::InvalidInstance.into());
        }
        Ok(self
            .registry
            .get_by_id(frame.object_id)
            .ok_or(LinkError::UnknownObject)?)
    }

    fn resolve_pending(&self, object_id: u32, instance: u16) {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        if st.pending.is_some_and(|p| p.matches(object_id, instance)) {
            st.pending = None;
            self.response.give();
        }
    }

    // ── Transmit path ─────────────────────────────────────────

    /// Send an object's data.
    ///
    /// Unacknowledged sends return once the frames are written.
    /// Acknowledged sends wait up to `timeout_ms` for the peer's ACK.
    /// [`ALL_INSTANCES`] sends every existing instance (instance 0 for
    /// single-instance objects).
    pub fn send_object(&self, obj: ObjectId, inst: u16, acked: bool, timeout_ms: u32) -> Result<()> {
        if acked {
            self.transaction(MessageType::ObjAck, obj, inst, timeout_ms)
        } else {
            self.transmit(MessageType::Obj, obj, inst)
        }
    }

    /// Ask the peer for an object's data and wait up to `timeout_ms` for it.
    pub fn send_object_request(&self, obj: ObjectId, inst: u16, timeout_ms: u32) -> Result<()> {
        self.transaction(MessageType::ObjReq, obj, inst, timeout_ms)
    }

    fn transaction(&self, kind: MessageType, obj: ObjectId, inst: u16, timeout_ms: u32) -> Result<()> {
        let _txn = self.transactions.acquire();

        let inst = if inst == ALL_INSTANCES && self.registry.is_single_instance(obj)? {
            0
        } else {
            inst
        };

        debug!("link: {:?} {}/{} started", kind, obj, inst);
        {
            let guard = self.state.lock();
            guard.borrow_mut().pending = Some(PendingResponse {
                object_id: obj.raw(),
                instance: inst,
            });
            if let Err(e) = self.transmit(kind, obj, inst) {
                guard.borrow_mut().pending = None;
                return Err(e);
            }
        }

        if self.response.wait(Duration::from_millis(u64::from(timeout_ms))) {
            debug!("link: {:?} {}/{} completed", kind, obj, inst);
            return Ok(());
        }

        // A response racing the deadline may have given the signal after
        // the wait returned; clearing under the lock stops further gives.
        let guard = self.state.lock();
        guard.borrow_mut().pending = None;
        self.response.drain();
        warn!(
            "link: {:?} {}/{} timed out after {} ms",
            kind, obj, inst, timeout_ms
        );
        Err(LinkError::Timeout.into())
    }

    /// Serialize and write `kind` frames for `obj`, expanding the wildcard.
    fn transmit(&self, kind: MessageType, obj: ObjectId, inst: u16) -> Result<()> {
        let single = self.registry.is_single_instance(obj)?;
        let inst = if inst == ALL_INSTANCES && single { 0 } else { inst };

        match kind {
            MessageType::Obj | MessageType::ObjAck if inst == ALL_INSTANCES => {
                // Hold the lock so the instance set is sent as one burst.
                let _guard = self.state.lock();
                for n in 0..self.registry.num_instances(obj)? {
                    self.send_single(kind, obj, n)?;
                }
                Ok(())
            }
            MessageType::Ack if inst == ALL_INSTANCES => Err(LinkError::InvalidInstance.into()),
            MessageType::Nack => Err(LinkError::InvalidMessageType.into()),
            _ => self.send_single(kind, obj, inst),
        }
    }

    fn send_single(&self, kind: MessageType, obj: ObjectId, inst: u16) -> Result<()> {
        let payload = if kind.carries_payload() {
            self.registry.pack(obj, inst)?
        } else {
            Vec::new()
        };
        let shape = self.registry.shape(obj.raw());
        let instance = has_instance_field(kind, shape).then_some(inst);

        self.write_frame(kind, obj.raw(), instance, &payload, true)
    }

    fn send_nack(&self, object_id: u32) -> Result<()> {
        debug!("link: NACK for unknown object 0x{:08X}", object_id);
        self.write_frame(MessageType::Nack, object_id, None, &[], false)
    }

    fn write_frame(
        &self,
        kind: MessageType,
        object_id: u32,
        instance: Option<u16>,
        payload: &[u8],
        count_object: bool,
    ) -> Result<()> {
        let guard = self.state.lock();
        let mut st = guard.borrow_mut();
        let st = &mut *st;

        let n = encode_frame(kind, object_id, instance, payload, &mut st.tx_buf)?;
        let written = st
            .transport
            .write(&st.tx_buf[..n])
            .and_then(|w| st.transport.flush().map(|()| w));

        match written {
            Ok(w) if w == n => {
                st.stats.tx_bytes = st.stats.tx_bytes.wrapping_add(n as u32);
                if count_object {
                    st.stats.tx_objects = st.stats.tx_objects.wrapping_add(1);
                    st.stats.tx_object_bytes =
                        st.stats.tx_object_bytes.wrapping_add(payload.len() as u32);
                }
                trace!("link: tx {:?} 0x{:08X} ({} bytes)", kind, object_id, n);
                Ok(())
            }
            Ok(w) => {
                st.stats.tx_errors = st.stats.tx_errors.wrapping_add(1);
                warn!("link: short write ({} of {} bytes)", w, n);
                Err(LinkError::Transport.into())
            }
            Err(e) => {
                st.stats.tx_errors = st.stats.tx_errors.wrapping_add(1);
                warn!("link: transport write failed: {:?}", e);
                Err(LinkError::Transport.into())
            }
        }
    }
}
