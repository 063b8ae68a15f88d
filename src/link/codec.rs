//! Object frame codec.
//!
//! Wire format (all multi-byte fields little-endian):
//! ```text
//! ┌──────┬──────┬──────────┬──────────────┬──────────────┬─────────────┬────┐
//! │ 0x3C │ type │ size (2B)│ object id 4B │ instance 2B? │ payload 0-N │ cs │
//! └──────┴──────┴──────────┴──────────────┴──────────────┴─────────────┴────┘
//! ```
//!
//! - `size` counts header and payload, not the checksum byte.
//! - The instance field is present for every frame about a multi-instance
//!   object except NACK. Single-instance objects never carry it.
//! - `cs` is a running CRC-8 (poly 0x07, init 0) over every prior byte.
//!
//! [`FrameParser`] is driven one byte at a time. Header fields depend on
//! the object definition, so the parser resolves ids through an
//! [`ObjectLookup`] as soon as the object id is complete.

use crc::{CRC_8_SMBUS, Crc};

use crate::error::{LinkError, Result};

/// Frame start marker.
pub const SYNC_VAL: u8 = 0x3C;
/// Version bits of the type byte.
pub const TYPE_MASK: u8 = 0xF8;
pub const TYPE_VER: u8 = 0x20;

pub const MIN_HEADER_LENGTH: usize = 8;
pub const MAX_HEADER_LENGTH: usize = 10;
pub const CHECKSUM_LENGTH: usize = 1;
/// Largest object payload carried in one frame.
pub const MAX_PAYLOAD_LENGTH: usize = 256;
pub const MAX_PACKET_LENGTH: usize = MAX_HEADER_LENGTH + MAX_PAYLOAD_LENGTH + CHECKSUM_LENGTH;

const INSTANCE_FIELD_LENGTH: usize = 2;

/// Running frame checksum (CRC-8, polynomial 0x07, init 0).
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Fold one byte into a running checksum.
pub fn crc8_update(cs: u8, byte: u8) -> u8 {
    let mut digest = CRC8.digest_with_initial(cs);
    digest.update(&[byte]);
    digest.finalize()
}

/// Checksum of a whole buffer.
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Message subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Object data, no acknowledgement.
    Obj = TYPE_VER,
    /// Request for object data.
    ObjReq = TYPE_VER | 0x01,
    /// Object data, acknowledgement requested.
    ObjAck = TYPE_VER | 0x02,
    Ack = TYPE_VER | 0x03,
    /// The requested object does not exist on this side.
    Nack = TYPE_VER | 0x04,
}

impl MessageType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x20 => Some(Self::Obj),
            0x21 => Some(Self::ObjReq),
            0x22 => Some(Self::ObjAck),
            0x23 => Some(Self::Ack),
            0x24 => Some(Self::Nack),
            _ => None,
        }
    }

    /// Whether frames of this type carry object data.
    pub fn carries_payload(self) -> bool {
        matches!(self, Self::Obj | Self::ObjAck)
    }
}

/// What the codec needs to know about an object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectShape {
    pub num_bytes: usize,
    pub single_instance: bool,
}

/// Resolves object ids while a frame is being parsed.
pub trait ObjectLookup {
    fn shape(&self, object_id: u32) -> Option<ObjectShape>;
}

/// Whether a frame of `kind` about an object of `shape` carries the
/// instance field. Unknown objects never do.
pub fn has_instance_field(kind: MessageType, shape: Option<ObjectShape>) -> bool {
    kind != MessageType::Nack && shape.is_some_and(|s| !s.single_instance)
}

/// Serialize one frame into `out`.
///
/// Returns the number of bytes written, checksum included.
pub fn encode_frame(
    kind: MessageType,
    object_id: u32,
    instance: Option<u16>,
    payload: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD_LENGTH {
        return Err(LinkError::PayloadTooLarge.into());
    }
    let header_len = MIN_HEADER_LENGTH + instance.map_or(0, |_| INSTANCE_FIELD_LENGTH);
    let size = header_len + payload.len();
    let total = size + CHECKSUM_LENGTH;
    if out.len() < total {
        return Err(LinkError::PayloadTooLarge.into());
    }

    out[0] = SYNC_VAL;
    out[1] = kind as u8;
    out[2..4].copy_from_slice(&(size as u16).to_le_bytes());
    out[4..8].copy_from_slice(&object_id.to_le_bytes());
    if let Some(inst) = instance {
        out[8..10].copy_from_slice(&inst.to_le_bytes());
    }
    out[header_len..size].copy_from_slice(payload);
    out[size] = crc8(&out[..size]);

    Ok(total)
}

// ── Receive side ──────────────────────────────────────────────

/// Why a frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Version bits or subtype not recognised.
    BadType,
    /// Declared size outside the legal range.
    BadSize,
    /// Object id not registered (and not an OBJ_REQ).
    UnknownObject,
    /// Object data larger than one frame.
    PayloadTooLarge,
    /// Declared size disagrees with the object layout.
    SizeMismatch,
    BadChecksum,
}

/// A complete, checksum-verified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: MessageType,
    pub object_id: u32,
    /// 0 when the frame has no instance field.
    pub instance: u16,
    pub payload: &'a [u8],
}

/// Result of feeding one byte.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseStatus<'a> {
    /// More bytes needed.
    Pending,
    Complete(Frame<'a>),
    /// The frame was dropped; the parser is back at SYNC.
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Sync,
    Type,
    Size,
    ObjId,
    InstId,
    Data,
    Cs,
}

/// Byte-at-a-time frame parser.
///
/// Every rejection returns to [`RxState::Sync`]; bytes outside a frame
/// are skipped silently.
pub struct FrameParser {
    state: RxState,
    cs: u8,
    kind: MessageType,
    packet_size: usize,
    object_id: u32,
    instance: u16,
    length: usize,
    /// Bytes accumulated in the current multi-byte field.
    count: usize,
    /// Bytes consumed since the sync byte, inclusive.
    consumed: usize,
    payload: heapless::Vec<u8, MAX_PAYLOAD_LENGTH>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: RxState::Sync,
            cs: 0,
            kind: MessageType::Obj,
            packet_size: 0,
            object_id: 0,
            instance: 0,
            length: 0,
            count: 0,
            consumed: 0,
            payload: heapless::Vec::new(),
        }
    }

    /// True while no frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == RxState::Sync
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = RxState::Sync;
    }

    fn reject(&mut self, reason: RejectReason) -> ParseStatus<'_> {
        self.state = RxState::Sync;
        ParseStatus::Rejected(reason)
    }

    /// Feed one byte.
    pub fn push(&mut self, byte: u8, lookup: &impl ObjectLookup) -> ParseStatus<'_> {
        if self.state != RxState::Sync {
            self.consumed += 1;
        }

        match self.state {
            RxState::Sync => {
                if byte != SYNC_VAL {
                    return ParseStatus::Pending;
                }
                self.cs = crc8_update(0, byte);
                self.consumed = 1;
                self.state = RxState::Type;
            }

            RxState::Type => {
                self.cs = crc8_update(self.cs, byte);
                if byte & TYPE_MASK != TYPE_VER {
                    return self.reject(RejectReason::BadType);
                }
                let Some(kind) = MessageType::from_u8(byte) else {
                    return self.reject(RejectReason::BadType);
                };
                self.kind = kind;
                self.packet_size = 0;
                self.count = 0;
                self.state = RxState::Size;
            }

            RxState::Size => {
                self.cs = crc8_update(self.cs, byte);
                self.packet_size |= usize::from(byte) << (8 * self.count);
                self.count += 1;
                if self.count < 2 {
                    return ParseStatus::Pending;
                }
                if self.packet_size < MIN_HEADER_LENGTH
                    || self.packet_size > MAX_HEADER_LENGTH + MAX_PAYLOAD_LENGTH
                {
                    return self.reject(RejectReason::BadSize);
                }
                self.object_id = 0;
                self.count = 0;
                self.state = RxState::ObjId;
            }

            RxState::ObjId => {
                self.cs = crc8_update(self.cs, byte);
                self.object_id |= u32::from(byte) << (8 * self.count);
                self.count += 1;
                if self.count < 4 {
                    return ParseStatus::Pending;
                }

                let shape = lookup.shape(self.object_id);
                if shape.is_none() && self.kind != MessageType::ObjReq {
                    return self.reject(RejectReason::UnknownObject);
                }
                self.length = match shape {
                    Some(s) if self.kind.carries_payload() => s.num_bytes,
                    _ => 0,
                };
                if self.length > MAX_PAYLOAD_LENGTH {
                    return self.reject(RejectReason::PayloadTooLarge);
                }
                let with_instance = has_instance_field(self.kind, shape);
                let header_len =
                    MIN_HEADER_LENGTH + if with_instance { INSTANCE_FIELD_LENGTH } else { 0 };
                if header_len + self.length != self.packet_size {
                    return self.reject(RejectReason::SizeMismatch);
                }

                self.instance = 0;
                self.count = 0;
                self.payload.clear();
                self.state = if with_instance {
                    RxState::InstId
                } else {
                    self.after_header()
                };
            }

            RxState::InstId => {
                self.cs = crc8_update(self.cs, byte);
                self.instance |= u16::from(byte) << (8 * self.count);
                self.count += 1;
                if self.count < 2 {
                    return ParseStatus::Pending;
                }
                self.count = 0;
                self.state = self.after_header();
            }

            RxState::Data => {
                self.cs = crc8_update(self.cs, byte);
                // Capacity is MAX_PAYLOAD_LENGTH and length was checked against it.
                if self.payload.push(byte).is_err() {
                    return self.reject(RejectReason::PayloadTooLarge);
                }
                if self.payload.len() == self.length {
                    self.state = RxState::Cs;
                }
            }

            RxState::Cs => {
                if byte != self.cs {
                    return self.reject(RejectReason::BadChecksum);
                }
                if self.consumed != self.packet_size + CHECKSUM_LENGTH {
                    return self.reject(RejectReason::SizeMismatch);
                }
                self.state = RxState::Sync;
                return ParseStatus::Complete(Frame {
                    kind: self.kind,
                    object_id: self.object_id,
                    instance: self.instance,
                    payload: &self.payload,
                });
            }
        }

        ParseStatus::Pending
    }

    fn after_header(&self) -> RxState {
        if self.length > 0 {
            RxState::Data
        } else {
            RxState::Cs
        }
    }
}
