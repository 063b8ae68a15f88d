//! Unified error types for the object registry and telemetry link.
//!
//! A single `Error` enum that every subsystem converts into, so callers
//! can propagate with `?` regardless of which layer failed. All variants
//! are `Copy`; nothing here allocates.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An object registry operation failed.
    Registry(RegistryError),
    /// A link (protocol engine) operation failed.
    Link(LinkError),
    /// Configuration is invalid.
    Config(&'static str),
    /// A record failed to serialize or deserialize.
    Encode(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Encode(msg) => write!(f, "encode: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The object id (or its metaobject id) is already registered.
    DuplicateId,
    /// The id cannot be registered (its metaobject id would overflow).
    InvalidId,
    /// No object is registered under this handle.
    NotFound,
    /// The addressed instance does not exist.
    NoSuchInstance,
    /// The instance id is at or above the configured ceiling.
    InstanceLimit,
    /// Single-instance objects only have instance 0.
    SingleInstance,
    /// `offset + size` exceeds the object's byte size.
    OutOfBounds,
    /// The object's metadata marks it read-only.
    AccessDenied,
    /// Metadata of a metaobject is a constant.
    MetaobjectImmutable,
    /// Supplied buffer length differs from the object's byte size.
    SizeMismatch,
    /// Stored metadata bytes do not decode.
    CorruptMetadata,
    /// The subscriber is not connected to this object.
    NotSubscribed,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId => write!(f, "object id already registered"),
            Self::InvalidId => write!(f, "invalid object id"),
            Self::NotFound => write!(f, "object not found"),
            Self::NoSuchInstance => write!(f, "instance does not exist"),
            Self::InstanceLimit => write!(f, "instance id above limit"),
            Self::SingleInstance => write!(f, "single-instance object"),
            Self::OutOfBounds => write!(f, "field access out of bounds"),
            Self::AccessDenied => write!(f, "object is read-only"),
            Self::MetaobjectImmutable => write!(f, "metaobject metadata is immutable"),
            Self::SizeMismatch => write!(f, "data size mismatch"),
            Self::CorruptMetadata => write!(f, "metadata does not decode"),
            Self::NotSubscribed => write!(f, "subscriber not connected"),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No matching ACK/response arrived before the deadline.
    Timeout,
    /// The all-instances wildcard is not valid for this message.
    InvalidInstance,
    /// Object data does not fit in a single frame.
    PayloadTooLarge,
    /// The transport failed to accept the frame.
    Transport,
    /// The object id is not registered.
    UnknownObject,
    /// The message type cannot be sent through this path.
    InvalidMessageType,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "transaction timed out"),
            Self::InvalidInstance => write!(f, "all-instances selector not allowed"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::Transport => write!(f, "transport write failed"),
            Self::UnknownObject => write!(f, "unknown object"),
            Self::InvalidMessageType => write!(f, "invalid message type"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
