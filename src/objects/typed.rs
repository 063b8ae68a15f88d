//! Typed views over registry objects.
//!
//! Generated object definitions implement [`DataObject`] so callers can
//! read and write fields instead of raw byte buffers. Encoding is the
//! packed little-endian layout used on the wire.

use crate::error::{RegistryError, Result};

use super::registry::{ObjectFlags, ObjectId, ObjectRegistry};

/// A fixed-layout object definition.
pub trait DataObject: Sized {
    const OBJECT_ID: u32;
    const NAME: &'static str;
    const FLAGS: ObjectFlags;
    /// Packed size in bytes.
    const NUM_BYTES: usize;

    /// Write the packed form. `out` is exactly `NUM_BYTES` long.
    fn encode(&self, out: &mut [u8]);

    /// Read the packed form. `data` is exactly `NUM_BYTES` long.
    fn decode(data: &[u8]) -> Self;
}

impl ObjectRegistry {
    /// Register `T` using its declared id, name and layout.
    pub fn register_type<T: DataObject>(&self) -> Result<ObjectId> {
        self.register(T::OBJECT_ID, T::NAME, T::FLAGS, T::NUM_BYTES)
    }

    pub fn get_typed<T: DataObject>(&self, inst: u16) -> Result<T> {
        let obj = self
            .get_by_id(T::OBJECT_ID)
            .ok_or(RegistryError::NotFound)?;
        let mut buf = vec![0u8; T::NUM_BYTES];
        self.get_instance_data(obj, inst, &mut buf)?;
        Ok(T::decode(&buf))
    }

    pub fn set_typed<T: DataObject>(&self, inst: u16, value: &T) -> Result<()> {
        let obj = self
            .get_by_id(T::OBJECT_ID)
            .ok_or(RegistryError::NotFound)?;
        let mut buf = vec![0u8; T::NUM_BYTES];
        value.encode(&mut buf);
        self.set_instance_data(obj, inst, &buf)
    }
}
