//! Per-object metadata.
//!
//! Every data object owns a companion metaobject (id + 1) whose single
//! instance holds the packed [`Metadata`] below. Metaobjects themselves
//! report [`Metadata::DEFAULT`] and cannot be changed.
//!
//! Packed layout (19 bytes, little-endian):
//! ```text
//! ┌────────┬────────────┬───────────┬──────────┬──────────────┐
//! │ access │ gcs_access │ tlm_acked │ tlm_mode │ tlm_period 4B│
//! ├────────┴──┬─────────┴──┬────────┴──────────┼──────────────┤
//! │ gcs_acked │ gcs_mode   │ gcs_period 4B     │ log_mode     │
//! ├───────────┴────────────┴───────────────────┴──────────────┤
//! │ log_period 4B                                             │
//! └───────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Size of the packed metadata record.
pub const METADATA_SIZE: usize = 19;

/// Who may write an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AccessMode {
    ReadWrite = 0,
    ReadOnly = 1,
}

impl AccessMode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::ReadWrite),
            1 => Some(Self::ReadOnly),
            _ => None,
        }
    }
}

/// When an object is pushed on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum UpdateMode {
    /// Every `period_ms`.
    Periodic = 0,
    /// Whenever the data changes.
    OnChange = 1,
    /// Only when explicitly requested.
    Manual = 2,
    /// Never.
    Never = 3,
}

impl UpdateMode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Periodic),
            1 => Some(Self::OnChange),
            2 => Some(Self::Manual),
            3 => Some(Self::Never),
            _ => None,
        }
    }
}

/// Access rights and update cadence of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Access level on this side of the link.
    pub access: AccessMode,
    /// Access level granted to the ground station.
    pub gcs_access: AccessMode,
    /// Telemetry updates sent from this side require an ACK.
    pub telemetry_acked: bool,
    pub telemetry_update_mode: UpdateMode,
    pub telemetry_update_period_ms: u32,
    /// Telemetry updates sent by the ground station require an ACK.
    pub gcs_telemetry_acked: bool,
    pub gcs_telemetry_update_mode: UpdateMode,
    pub gcs_telemetry_update_period_ms: u32,
    pub logging_update_mode: UpdateMode,
    pub logging_update_period_ms: u32,
}

impl Metadata {
    /// Read-write, acknowledged, on-change, period 0 on every channel.
    pub const DEFAULT: Self = Self {
        access: AccessMode::ReadWrite,
        gcs_access: AccessMode::ReadWrite,
        telemetry_acked: true,
        telemetry_update_mode: UpdateMode::OnChange,
        telemetry_update_period_ms: 0,
        gcs_telemetry_acked: true,
        gcs_telemetry_update_mode: UpdateMode::OnChange,
        gcs_telemetry_update_period_ms: 0,
        logging_update_mode: UpdateMode::OnChange,
        logging_update_period_ms: 0,
    };

    pub fn is_read_only(&self) -> bool {
        self.access == AccessMode::ReadOnly
    }

    /// Encode into the fixed wire layout.
    pub fn pack(&self) -> [u8; METADATA_SIZE] {
        let mut out = [0u8; METADATA_SIZE];
        out[0] = self.access as u8;
        out[1] = self.gcs_access as u8;
        out[2] = u8::from(self.telemetry_acked);
        out[3] = self.telemetry_update_mode as u8;
        out[4..8].copy_from_slice(&self.telemetry_update_period_ms.to_le_bytes());
        out[8] = u8::from(self.gcs_telemetry_acked);
        out[9] = self.gcs_telemetry_update_mode as u8;
        out[10..14].copy_from_slice(&self.gcs_telemetry_update_period_ms.to_le_bytes());
        out[14] = self.logging_update_mode as u8;
        out[15..19].copy_from_slice(&self.logging_update_period_ms.to_le_bytes());
        out
    }

    /// Decode from the fixed wire layout.
    ///
    /// Returns `None` if `data` is short or an enum byte is out of range.
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() < METADATA_SIZE {
            return None;
        }
        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        Some(Self {
            access: AccessMode::from_u8(data[0])?,
            gcs_access: AccessMode::from_u8(data[1])?,
            telemetry_acked: data[2] != 0,
            telemetry_update_mode: UpdateMode::from_u8(data[3])?,
            telemetry_update_period_ms: u32_at(4),
            gcs_telemetry_acked: data[8] != 0,
            gcs_telemetry_update_mode: UpdateMode::from_u8(data[9])?,
            gcs_telemetry_update_period_ms: u32_at(10),
            logging_update_mode: UpdateMode::from_u8(data[14])?,
            logging_update_period_ms: u32_at(15),
        })
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::DEFAULT
    }
}
