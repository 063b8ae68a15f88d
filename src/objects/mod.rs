//! Object model: registry, metadata, events and typed views.

pub mod events;
pub mod metadata;
pub mod registry;
pub mod typed;

pub use events::{EventCallback, EventKind, EventMask, EventQueue, ObjectEvent, drain_events};
pub use metadata::{AccessMode, Metadata, UpdateMode};
pub use registry::{ALL_INSTANCES, ObjectFlags, ObjectId, ObjectInfo, ObjectRegistry, RegistryStats};
pub use typed::DataObject;
