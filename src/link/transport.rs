//! Transport abstraction: any byte-oriented channel.
//!
//! Concrete implementations live with the caller (UART, radio modem,
//! UDP socket). The link engine is generic over `Transport`, so adding a
//! new transport requires zero changes to the protocol logic.
//!
//! Two in-crate implementations are provided:
//! - [`NullTransport`] discards writes and never reads.
//! - [`MemoryTransport`] is one end of an in-process byte pipe, used by
//!   the loopback binary and the tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

/// A null transport that discards all writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}

type Pipe = Arc<Mutex<VecDeque<u8>>>;

/// Error returned once the write side has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

/// One end of an in-memory duplex byte pipe.
pub struct MemoryTransport {
    rx: Pipe,
    tx: Pipe,
    closed: bool,
}

impl MemoryTransport {
    /// Two connected ends: bytes written to one are read from the other.
    pub fn pair() -> (Self, Self) {
        let a_to_b: Pipe = Arc::default();
        let b_to_a: Pipe = Arc::default();
        (
            Self {
                rx: b_to_a.clone(),
                tx: a_to_b.clone(),
                closed: false,
            },
            Self {
                rx: a_to_b,
                tx: b_to_a,
                closed: false,
            },
        )
    }

    /// Make further writes fail, as a dropped serial link would.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Bytes waiting to be read on this end.
    pub fn pending(&self) -> usize {
        self.rx.lock().len()
    }

    /// Take every byte waiting on this end.
    pub fn take_all(&mut self) -> Vec<u8> {
        self.rx.lock().drain(..).collect()
    }
}

impl Transport for MemoryTransport {
    type Error = Closed;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Closed> {
        let mut rx = self.rx.lock();
        let n = buf.len().min(rx.len());
        for (dst, src) in buf.iter_mut().zip(rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Closed> {
        if self.closed {
            return Err(Closed);
        }
        self.tx.lock().extend(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Closed> {
        Ok(())
    }

    fn available(&self) -> bool {
        !self.rx.lock().is_empty()
    }
}
