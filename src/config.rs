//! Link configuration parameters
//!
//! Tunables for the object registry and the protocol engine. Values can be
//! loaded from any serde format (the ground tools keep them in JSON, the
//! flight side stores them postcard-encoded).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::link::codec::MAX_PAYLOAD_LENGTH;
use crate::objects::ALL_INSTANCES;

/// Core link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    // --- Transactions ---
    /// Default time to wait for an ACK or requested object (milliseconds)
    pub transaction_timeout_ms: u32,

    // --- Registry ---
    /// Instance ids at or above this value are never created
    pub max_instances: u16,

    // --- Receive path ---
    /// Bytes pulled from the transport per poll
    pub rx_chunk_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            // Transactions
            transaction_timeout_ms: 250,

            // Registry
            max_instances: 1000,

            // Receive path
            rx_chunk_size: 64,
        }
    }
}

impl LinkConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.transaction_timeout_ms == 0 {
            return Err(Error::Config("transaction timeout must be non-zero"));
        }
        if self.max_instances == 0 || self.max_instances >= ALL_INSTANCES {
            return Err(Error::Config("max_instances must be in 1..0xFFFF"));
        }
        if self.rx_chunk_size == 0 || self.rx_chunk_size > MAX_PAYLOAD_LENGTH {
            return Err(Error::Config("rx_chunk_size must be in 1..=256"));
        }
        Ok(())
    }
}
