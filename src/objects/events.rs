//! Object event dispatch.
//!
//! Every instance create/update notifies the subscribers connected to the
//! object whose event mask matches. Two kinds of subscriber exist:
//!
//! - **Queues**: bounded `embassy-sync` channels owned by a consumer task.
//!   Delivery uses `try_send`; a full queue drops the event and the
//!   registry counts it in `event_errors`.
//! - **Callbacks**: invoked synchronously on the thread that produced the
//!   event. They must not block.
//!
//! ```text
//! ┌──────────────┐  ObjectEvent  ┌──────────────┐
//! │  Registry    │──try_send────▶│ EventQueue   │──▶ consumer task
//! │  (producer)  │──call────────▶│ callback     │   (same thread)
//! └──────────────┘               └──────────────┘
//! ```

use core::ops::BitOr;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use super::registry::ObjectId;

/// Depth of each subscriber queue.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Event kinds, one bit each so they can be combined into a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// Instance data was created, written or unpacked from the link.
    Updated = 0x01,
    /// Retransmission was forced without touching the data.
    UpdatedManual = 0x02,
    /// A peer should be asked for the current data.
    UpdateRequested = 0x04,
}

/// Set of [`EventKind`]s a subscriber wants.
///
/// An empty mask subscribes to everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u8);

impl EventMask {
    pub const ALL: Self = Self(0x07);
    pub const NONE: Self = Self(0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn matches(self, kind: EventKind) -> bool {
        self.0 == 0 || self.0 & kind as u8 != 0
    }
}

impl From<EventKind> for EventMask {
    fn from(kind: EventKind) -> Self {
        Self(kind as u8)
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr for EventKind {
    type Output = EventMask;

    fn bitor(self, rhs: Self) -> EventMask {
        EventMask::from(self) | EventMask::from(rhs)
    }
}

/// A single notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectEvent {
    pub object: ObjectId,
    /// Instance id, or [`ALL_INSTANCES`](super::ALL_INSTANCES).
    pub instance: u16,
    pub kind: EventKind,
}

/// Bounded queue a consumer task drains.
pub type EventQueue = Channel<CriticalSectionRawMutex, ObjectEvent, EVENT_QUEUE_DEPTH>;

/// Synchronous subscriber. Identity is the `Arc` allocation.
pub type EventCallback = Arc<dyn Fn(&ObjectEvent) + Send + Sync>;

/// Drain all pending events of `queue` into `handler`, in FIFO order.
pub fn drain_events(queue: &EventQueue, mut handler: impl FnMut(ObjectEvent)) {
    while let Ok(event) = queue.try_receive() {
        handler(event);
    }
}

// ── Subscriber bookkeeping ────────────────────────────────────

#[derive(Clone)]
pub(crate) enum Subscriber {
    Queue(&'static EventQueue),
    Callback(EventCallback),
}

impl Subscriber {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Queue(a), Self::Queue(b)) => core::ptr::eq(*a, *b),
            (Self::Callback(a), Self::Callback(b)) => {
                core::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
            }
            _ => false,
        }
    }

    /// Returns `false` if the event had to be dropped.
    pub(crate) fn deliver(&self, event: &ObjectEvent) -> bool {
        match self {
            Self::Queue(queue) => queue.try_send(*event).is_ok(),
            Self::Callback(cb) => {
                cb(event);
                true
            }
        }
    }
}

struct Subscription {
    subscriber: Subscriber,
    mask: EventMask,
}

/// Subscribers connected to one object, in connection order.
#[derive(Default)]
pub(crate) struct SubscriberList {
    entries: Vec<Subscription>,
}

impl SubscriberList {
    /// Connect, or update the mask if this subscriber is already connected.
    pub(crate) fn connect(&mut self, subscriber: Subscriber, mask: EventMask) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.subscriber.same_as(&subscriber))
        {
            entry.mask = mask;
            return;
        }
        self.entries.push(Subscription { subscriber, mask });
    }

    /// Returns `false` if the subscriber was not connected.
    pub(crate) fn disconnect(&mut self, subscriber: &Subscriber) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !e.subscriber.same_as(subscriber));
        self.entries.len() != before
    }

    /// Snapshot of the subscribers interested in `kind`.
    pub(crate) fn matching(&self, kind: EventKind) -> Vec<Subscriber> {
        self.entries
            .iter()
            .filter(|e| e.mask.matches(kind))
            .map(|e| e.subscriber.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
