//! Runtime diagnostics.
//!
//! A [`Diagnostics`] snapshot combines link and registry counters so a
//! single record can be logged, sent to the ground station or persisted.
//! Snapshots are postcard-encoded; a record always fits a single frame.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::link::codec::MAX_PAYLOAD_LENGTH;
use crate::link::{LinkEngine, LinkStats, Transport};
use crate::objects::RegistryStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub link: LinkStats,
    pub registry: RegistryStats,
    /// Registered objects, metaobjects included.
    pub objects: u32,
    /// Instances across every object.
    pub instances: u32,
    pub transaction_pending: bool,
}

impl Diagnostics {
    /// Collect counters from an engine and its registry.
    pub fn collect<T: Transport>(engine: &LinkEngine<T>) -> Self {
        let registry = engine.registry();
        Self {
            link: engine.stats(),
            registry: registry.stats(),
            objects: registry.object_count() as u32,
            instances: registry.instance_count() as u32,
            transaction_pending: engine.transaction_pending(),
        }
    }

    /// Encode into `buf`, returning the used prefix.
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8]> {
        postcard::to_slice(self, buf).map_err(|_| Error::Encode("diagnostics buffer too small"))
    }

    /// Encode into a payload-sized buffer.
    pub fn to_bytes(&self) -> Result<heapless::Vec<u8, MAX_PAYLOAD_LENGTH>> {
        let mut buf = [0u8; MAX_PAYLOAD_LENGTH];
        let used = self.encode(&mut buf)?;
        heapless::Vec::from_slice(used).map_err(|()| Error::Encode("diagnostics record too large"))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes).map_err(|_| Error::Encode("diagnostics record does not decode"))
    }

    /// Emit the snapshot at info level.
    pub fn log(&self) {
        log::info!(
            "diag: objects={} instances={} rx={}B/{}obj/{}err tx={}B/{}obj/{}err events_dropped={}",
            self.objects,
            self.instances,
            self.link.rx_bytes,
            self.link.rx_objects,
            self.link.rx_errors,
            self.link.tx_bytes,
            self.link.tx_objects,
            self.link.tx_errors,
            self.registry.event_errors,
        );
    }
}
