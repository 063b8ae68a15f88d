//! Acknowledged-transaction primitives.
//!
//! - [`TransactionLock`]: one acknowledged transaction in flight at a
//!   time, waiters served in arrival order.
//! - [`ResponseSignal`]: single-slot wake-up given by the receive path
//!   when the awaited frame arrives.
//! - [`PendingResponse`]: the (object, instance) the initiator waits on.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::objects::ALL_INSTANCES;

#[derive(Default)]
struct Tickets {
    next: u64,
    serving: u64,
}

/// FIFO ticket lock serializing acknowledged transactions.
#[derive(Default)]
pub struct TransactionLock {
    tickets: Mutex<Tickets>,
    turn: Condvar,
}

impl TransactionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every earlier caller has released.
    pub fn acquire(&self) -> TransactionGuard<'_> {
        let mut tickets = self.tickets.lock();
        let mine = tickets.next;
        tickets.next = tickets.next.wrapping_add(1);
        while tickets.serving != mine {
            self.turn.wait(&mut tickets);
        }
        TransactionGuard { lock: self }
    }

    /// Callers holding or waiting for the lock.
    pub fn queued(&self) -> u64 {
        let tickets = self.tickets.lock();
        tickets.next.wrapping_sub(tickets.serving)
    }
}

/// Held for the duration of one transaction.
pub struct TransactionGuard<'a> {
    lock: &'a TransactionLock,
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        let mut tickets = self.lock.tickets.lock();
        tickets.serving = tickets.serving.wrapping_add(1);
        drop(tickets);
        self.lock.turn.notify_all();
    }
}

/// Single-slot binary signal.
#[derive(Default)]
pub struct ResponseSignal {
    given: Mutex<bool>,
    cond: Condvar,
}

impl ResponseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release one waiter. Giving an already-given signal is a no-op.
    pub fn give(&self) {
        *self.given.lock() = true;
        self.cond.notify_one();
    }

    /// Wait up to `timeout` for the signal, consuming it.
    ///
    /// Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut given = self.given.lock();
        while !*given {
            if self.cond.wait_until(&mut given, deadline).timed_out() {
                break;
            }
        }
        core::mem::replace(&mut *given, false)
    }

    /// Discard a signal nobody waited for. Never blocks on the signal.
    pub fn drain(&self) -> bool {
        core::mem::replace(&mut *self.given.lock(), false)
    }
}

/// Expected responder of the transaction in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingResponse {
    pub object_id: u32,
    /// [`ALL_INSTANCES`] accepts any instance.
    pub instance: u16,
}

impl PendingResponse {
    pub fn matches(&self, object_id: u32, instance: u16) -> bool {
        self.object_id == object_id
            && (self.instance == instance || self.instance == ALL_INSTANCES)
    }
}
