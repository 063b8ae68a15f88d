//! UAV object registry and telemetry link.
//!
//! Flight-side and ground-side code share typed data objects through an
//! [`ObjectRegistry`](objects::ObjectRegistry) and keep them synchronized
//! over any byte channel with a [`LinkEngine`](link::LinkEngine).
//!
//! ```text
//! app tasks ──set/get──▶ ObjectRegistry ──events──▶ subscriber queues
//!                              ▲   │
//!                        unpack│   │pack
//!                              │   ▼
//!            transport ◀──▶ LinkEngine (parser · transactions)
//! ```

#![deny(unused_must_use)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod link;
pub mod objects;

pub use error::{Error, Result};
