//! Transport-agnostic telemetry link.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Link Stack                           │
//! │                                                            │
//! │  ┌───────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │ Transport │──▶│  Codec   │──▶│  Engine (dispatcher)  │  │
//! │  │ (trait)   │   │ (parser) │   │  → ObjectRegistry     │  │
//! │  └───────────┘   └──────────┘   └───────────────────────┘  │
//! │       ▲                                    │               │
//! │       │              ┌─────────────────────┘               │
//! │       │              ▼                                     │
//! │  ┌───────────┐   ┌──────────────┐                          │
//! │  │ Transport │◀──│ Transactions │  (ACK / request wait)    │
//! │  │ (write)   │   │ (FIFO lock)  │                          │
//! │  └───────────┘   └──────────────┘                          │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod engine;
pub mod transaction;
pub mod transport;

pub use engine::{LinkEngine, LinkStats};
pub use transport::{MemoryTransport, NullTransport, Transport};
