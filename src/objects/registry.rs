//! Object registry.
//!
//! Owns every object definition, its instances and its subscribers.
//! Definitions are registered once at startup and live for the process
//! lifetime; [`ObjectId`] handles therefore never dangle.
//!
//! - Objects are keyed by id in an ordered map.
//! - Instances are a dense `Vec` indexed by instance id; instance 0 exists
//!   from registration on, and creating instance N back-fills every
//!   missing id below it.
//! - Each non-meta object `id` is paired with a metaobject `id + 1`
//!   holding its packed [`Metadata`].
//!
//! Events are collected while the registry lock is held and delivered
//! after it is released, so callbacks may call back into the registry.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::LinkConfig;
use crate::error::{RegistryError, Result};
use crate::link::codec::{ObjectLookup, ObjectShape};

use super::events::{
    EventCallback, EventKind, EventMask, EventQueue, ObjectEvent, Subscriber, SubscriberList,
};
use super::metadata::{AccessMode, METADATA_SIZE, Metadata};

/// Instance selector meaning "every existing instance".
pub const ALL_INSTANCES: u16 = 0xFFFF;

/// Handle of a registered object (its numeric id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(u32);

impl ObjectId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Static properties fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectFlags {
    pub is_metaobject: bool,
    pub single_instance: bool,
    pub settings: bool,
}

impl ObjectFlags {
    pub const SINGLE: Self = Self {
        is_metaobject: false,
        single_instance: true,
        settings: false,
    };

    pub const MULTI: Self = Self {
        is_metaobject: false,
        single_instance: false,
        settings: false,
    };

    pub const SETTINGS: Self = Self {
        is_metaobject: false,
        single_instance: true,
        settings: true,
    };

    const META: Self = Self {
        is_metaobject: true,
        single_instance: true,
        settings: false,
    };
}

/// Snapshot of an object definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub name: String,
    pub flags: ObjectFlags,
    pub num_bytes: usize,
    pub num_instances: u16,
    /// Metaobject for data objects, parent for metaobjects.
    pub linked: Option<ObjectId>,
    pub subscribers: usize,
}

/// Registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Events dropped because a subscriber queue was full.
    pub event_errors: u32,
}

// ── Internal storage ──────────────────────────────────────────

struct ObjectEntry {
    id: ObjectId,
    name: String,
    flags: ObjectFlags,
    num_bytes: usize,
    linked: Option<ObjectId>,
    instances: Vec<Box<[u8]>>,
    subscribers: SubscriberList,
}

impl ObjectEntry {
    fn new(id: ObjectId, name: String, flags: ObjectFlags, num_bytes: usize) -> Self {
        Self {
            id,
            name,
            flags,
            num_bytes,
            linked: None,
            instances: vec![vec![0u8; num_bytes].into_boxed_slice()],
            subscribers: SubscriberList::default(),
        }
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            id: self.id,
            name: self.name.clone(),
            flags: self.flags,
            num_bytes: self.num_bytes,
            num_instances: self.instances.len() as u16,
            linked: self.linked,
            subscribers: self.subscribers.len(),
        }
    }

    fn instance(&self, inst: u16) -> core::result::Result<&[u8], RegistryError> {
        self.instances
            .get(usize::from(inst))
            .map(AsRef::as_ref)
            .ok_or(RegistryError::NoSuchInstance)
    }

    fn instance_mut(&mut self, inst: u16) -> core::result::Result<&mut [u8], RegistryError> {
        self.instances
            .get_mut(usize::from(inst))
            .map(AsMut::as_mut)
            .ok_or(RegistryError::NoSuchInstance)
    }

    /// Create instances up to and including `inst`.
    ///
    /// Returns the ids created, lowest first.
    fn grow_to(
        &mut self,
        inst: u16,
        max_instances: u16,
    ) -> core::result::Result<Vec<u16>, RegistryError> {
        if self.flags.single_instance && inst != 0 {
            return Err(RegistryError::SingleInstance);
        }
        if inst >= max_instances {
            return Err(RegistryError::InstanceLimit);
        }
        let first = self.instances.len() as u16;
        let mut created = Vec::new();
        for n in first..=inst {
            self.instances
                .push(vec![0u8; self.num_bytes].into_boxed_slice());
            created.push(n);
        }
        Ok(created)
    }
}

#[derive(Default)]
struct RegistryInner {
    objects: BTreeMap<ObjectId, ObjectEntry>,
    stats: RegistryStats,
}

impl RegistryInner {
    fn entry(&self, obj: ObjectId) -> core::result::Result<&ObjectEntry, RegistryError> {
        self.objects.get(&obj).ok_or(RegistryError::NotFound)
    }

    fn entry_mut(&mut self, obj: ObjectId) -> core::result::Result<&mut ObjectEntry, RegistryError> {
        self.objects.get_mut(&obj).ok_or(RegistryError::NotFound)
    }

    /// Metadata access check for local writes. Metaobjects are unchecked.
    fn check_writable(&self, entry: &ObjectEntry) -> core::result::Result<(), RegistryError> {
        if entry.flags.is_metaobject {
            return Ok(());
        }
        let Some(meta_id) = entry.linked else {
            return Ok(());
        };
        let meta = self.entry(meta_id)?;
        if meta.instance(0)?[0] == AccessMode::ReadOnly as u8 {
            return Err(RegistryError::AccessDenied);
        }
        Ok(())
    }

    /// Resolve the events to deliver for `(obj, inst, kind)`.
    fn pending(&self, obj: ObjectId, inst: u16, kind: EventKind) -> PendingEvents {
        let subscribers = self
            .objects
            .get(&obj)
            .map(|e| e.subscribers.matching(kind))
            .unwrap_or_default();
        PendingEvents {
            event: ObjectEvent {
                object: obj,
                instance: inst,
                kind,
            },
            subscribers,
        }
    }
}

/// Events captured under the lock, delivered after it is released.
struct PendingEvents {
    event: ObjectEvent,
    subscribers: Vec<Subscriber>,
}

// ── Registry ──────────────────────────────────────────────────

/// Thread-safe object registry.
pub struct ObjectRegistry {
    inner: Mutex<RegistryInner>,
    max_instances: u16,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new(&LinkConfig::default())
    }
}

impl ObjectRegistry {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_instances: config.max_instances.clamp(1, ALL_INSTANCES - 1),
        }
    }

    // ── Registration and lookup ───────────────────────────────

    /// Register an object.
    ///
    /// Data objects get a companion metaobject at `id + 1`, named
    /// `<name>Meta`, holding [`Metadata::DEFAULT`]. Fails without touching
    /// the registry if either id is taken.
    pub fn register(
        &self,
        id: u32,
        name: &str,
        flags: ObjectFlags,
        num_bytes: usize,
    ) -> Result<ObjectId> {
        let mut inner = self.inner.lock();
        let obj = ObjectId(id);

        if inner.objects.contains_key(&obj) {
            warn!("registry: duplicate registration of {} ({})", obj, name);
            return Err(RegistryError::DuplicateId.into());
        }

        if flags.is_metaobject {
            // Metaobjects always hold exactly one instance.
            let flags = ObjectFlags {
                single_instance: true,
                ..flags
            };
            inner
                .objects
                .insert(obj, ObjectEntry::new(obj, name.into(), flags, num_bytes));
            debug!("registry: metaobject {} '{}' registered", obj, name);
            return Ok(obj);
        }

        let meta = ObjectId(id.checked_add(1).ok_or(RegistryError::InvalidId)?);
        if inner.objects.contains_key(&meta) {
            warn!("registry: metaobject id {} of '{}' already taken", meta, name);
            return Err(RegistryError::DuplicateId.into());
        }

        let mut data = ObjectEntry::new(obj, name.into(), flags, num_bytes);
        data.linked = Some(meta);

        let mut meta_entry =
            ObjectEntry::new(meta, format!("{name}Meta"), ObjectFlags::META, METADATA_SIZE);
        meta_entry.linked = Some(obj);
        meta_entry.instances[0].copy_from_slice(&Metadata::DEFAULT.pack());

        inner.objects.insert(obj, data);
        inner.objects.insert(meta, meta_entry);

        info!(
            "registry: {} '{}' registered ({} bytes, {})",
            obj,
            name,
            num_bytes,
            if flags.single_instance { "single" } else { "multi" }
        );
        Ok(obj)
    }

    pub fn get_by_id(&self, id: u32) -> Option<ObjectId> {
        let obj = ObjectId(id);
        self.inner.lock().objects.contains_key(&obj).then_some(obj)
    }

    pub fn get_by_name(&self, name: &str) -> Option<ObjectId> {
        self.inner
            .lock()
            .objects
            .values()
            .find(|e| e.name == name)
            .map(|e| e.id)
    }

    pub fn info(&self, obj: ObjectId) -> Result<ObjectInfo> {
        Ok(self.inner.lock().entry(obj)?.info())
    }

    pub fn name(&self, obj: ObjectId) -> Result<String> {
        Ok(self.inner.lock().entry(obj)?.name.clone())
    }

    pub fn num_bytes(&self, obj: ObjectId) -> Result<usize> {
        Ok(self.inner.lock().entry(obj)?.num_bytes)
    }

    pub fn num_instances(&self, obj: ObjectId) -> Result<u16> {
        Ok(self.inner.lock().entry(obj)?.instances.len() as u16)
    }

    /// Metaobject of a data object, or parent of a metaobject.
    pub fn linked_object(&self, obj: ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.inner.lock().entry(obj)?.linked)
    }

    pub fn is_single_instance(&self, obj: ObjectId) -> Result<bool> {
        Ok(self.inner.lock().entry(obj)?.flags.single_instance)
    }

    pub fn is_metaobject(&self, obj: ObjectId) -> Result<bool> {
        Ok(self.inner.lock().entry(obj)?.flags.is_metaobject)
    }

    pub fn is_settings(&self, obj: ObjectId) -> Result<bool> {
        Ok(self.inner.lock().entry(obj)?.flags.settings)
    }

    /// Whether local writes are refused. Metaobjects are never read-only.
    pub fn is_read_only(&self, obj: ObjectId) -> Result<bool> {
        let inner = self.inner.lock();
        let entry = inner.entry(obj)?;
        match inner.check_writable(entry) {
            Ok(()) => Ok(false),
            Err(RegistryError::AccessDenied) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Visit every object in ascending id order.
    pub fn iterate(&self, mut visit: impl FnMut(ObjectId)) {
        let ids: Vec<ObjectId> = self.inner.lock().objects.keys().copied().collect();
        for id in ids {
            visit(id);
        }
    }

    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Total instances across every object.
    pub fn instance_count(&self) -> usize {
        self.inner
            .lock()
            .objects
            .values()
            .map(|e| e.instances.len())
            .sum()
    }

    pub fn stats(&self) -> RegistryStats {
        self.inner.lock().stats
    }

    pub fn clear_stats(&self) {
        self.inner.lock().stats = RegistryStats::default();
    }

    // ── Instances ─────────────────────────────────────────────

    /// Append the next instance, zero-initialised. Returns its id.
    pub fn create_instance(&self, obj: ObjectId) -> Result<u16> {
        let (inst, events) = {
            let mut inner = self.inner.lock();
            let max = self.max_instances;
            let entry = inner.entry_mut(obj)?;
            if entry.flags.single_instance {
                return Err(RegistryError::SingleInstance.into());
            }
            let inst = entry.instances.len() as u16;
            entry.grow_to(inst, max)?;
            (inst, inner.pending(obj, inst, EventKind::Updated))
        };
        self.deliver([events]);
        Ok(inst)
    }

    /// Copy an instance's raw bytes into `out`. Returns the byte count.
    pub fn pack_into(&self, obj: ObjectId, inst: u16, out: &mut [u8]) -> Result<usize> {
        let inner = self.inner.lock();
        let entry = inner.entry(obj)?;
        let data = entry.instance(inst)?;
        let dst = out
            .get_mut(..data.len())
            .ok_or(RegistryError::SizeMismatch)?;
        dst.copy_from_slice(data);
        Ok(data.len())
    }

    pub fn pack(&self, obj: ObjectId, inst: u16) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        Ok(inner.entry(obj)?.instance(inst)?.to_vec())
    }

    /// Overwrite an instance with data received from the link.
    ///
    /// Missing instances (and every missing lower id) are created first;
    /// each back-filled instance fires `Updated`, then the target fires
    /// `Updated` once its data is written. Access rights are not checked.
    pub fn unpack(&self, obj: ObjectId, inst: u16, data: &[u8]) -> Result<()> {
        let events = {
            let mut inner = self.inner.lock();
            let max = self.max_instances;
            let entry = inner.entry_mut(obj)?;
            if data.len() != entry.num_bytes {
                return Err(RegistryError::SizeMismatch.into());
            }
            let mut created = if usize::from(inst) < entry.instances.len() {
                Vec::new()
            } else {
                entry.grow_to(inst, max)?
            };
            entry.instance_mut(inst)?.copy_from_slice(data);

            created.retain(|&n| n != inst);
            let mut events: Vec<PendingEvents> = created
                .into_iter()
                .map(|n| inner.pending(obj, n, EventKind::Updated))
                .collect();
            events.push(inner.pending(obj, inst, EventKind::Updated));
            events
        };
        self.deliver(events);
        Ok(())
    }

    pub fn get_instance_data(&self, obj: ObjectId, inst: u16, out: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock();
        let data = inner.entry(obj)?.instance(inst)?;
        if out.len() != data.len() {
            return Err(RegistryError::SizeMismatch.into());
        }
        out.copy_from_slice(data);
        Ok(())
    }

    /// Read `out.len()` bytes starting at `offset`.
    pub fn get_instance_data_field(
        &self,
        obj: ObjectId,
        inst: u16,
        offset: usize,
        out: &mut [u8],
    ) -> Result<()> {
        let inner = self.inner.lock();
        let data = inner.entry(obj)?.instance(inst)?;
        let end = offset
            .checked_add(out.len())
            .filter(|&end| end <= data.len())
            .ok_or(RegistryError::OutOfBounds)?;
        out.copy_from_slice(&data[offset..end]);
        Ok(())
    }

    pub fn set_instance_data(&self, obj: ObjectId, inst: u16, data: &[u8]) -> Result<()> {
        let events = {
            let mut inner = self.inner.lock();
            let entry = inner.entry(obj)?;
            inner.check_writable(entry)?;
            let dst = inner.entry_mut(obj)?.instance_mut(inst)?;
            if dst.len() != data.len() {
                return Err(RegistryError::SizeMismatch.into());
            }
            dst.copy_from_slice(data);
            inner.pending(obj, inst, EventKind::Updated)
        };
        self.deliver([events]);
        Ok(())
    }

    /// Write `data` starting at `offset`.
    pub fn set_instance_data_field(
        &self,
        obj: ObjectId,
        inst: u16,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        let events = {
            let mut inner = self.inner.lock();
            let entry = inner.entry(obj)?;
            inner.check_writable(entry)?;
            let dst = inner.entry_mut(obj)?.instance_mut(inst)?;
            let end = offset
                .checked_add(data.len())
                .filter(|&end| end <= dst.len())
                .ok_or(RegistryError::OutOfBounds)?;
            dst[offset..end].copy_from_slice(data);
            inner.pending(obj, inst, EventKind::Updated)
        };
        self.deliver([events]);
        Ok(())
    }

    pub fn get_data(&self, obj: ObjectId, out: &mut [u8]) -> Result<()> {
        self.get_instance_data(obj, 0, out)
    }

    pub fn set_data(&self, obj: ObjectId, data: &[u8]) -> Result<()> {
        self.set_instance_data(obj, 0, data)
    }

    // ── Metadata ──────────────────────────────────────────────

    pub fn get_metadata(&self, obj: ObjectId) -> Result<Metadata> {
        let inner = self.inner.lock();
        let entry = inner.entry(obj)?;
        if entry.flags.is_metaobject {
            return Ok(Metadata::DEFAULT);
        }
        let meta_id = entry.linked.ok_or(RegistryError::NotFound)?;
        let bytes = inner.entry(meta_id)?.instance(0)?;
        Ok(Metadata::unpack(bytes).ok_or(RegistryError::CorruptMetadata)?)
    }

    pub fn set_metadata(&self, obj: ObjectId, metadata: &Metadata) -> Result<()> {
        let meta_id = {
            let inner = self.inner.lock();
            let entry = inner.entry(obj)?;
            if entry.flags.is_metaobject {
                return Err(RegistryError::MetaobjectImmutable.into());
            }
            entry.linked.ok_or(RegistryError::NotFound)?
        };
        self.set_instance_data(meta_id, 0, &metadata.pack())
    }

    // ── Subscribers ───────────────────────────────────────────

    /// Connect a queue, or update its mask if already connected.
    pub fn connect_queue(
        &self,
        obj: ObjectId,
        queue: &'static EventQueue,
        mask: EventMask,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .entry_mut(obj)?
            .subscribers
            .connect(Subscriber::Queue(queue), mask);
        Ok(())
    }

    pub fn disconnect_queue(&self, obj: ObjectId, queue: &'static EventQueue) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner
            .entry_mut(obj)?
            .subscribers
            .disconnect(&Subscriber::Queue(queue))
        {
            Ok(())
        } else {
            Err(RegistryError::NotSubscribed.into())
        }
    }

    /// Connect a callback, or update its mask if already connected.
    pub fn connect_callback(
        &self,
        obj: ObjectId,
        callback: EventCallback,
        mask: EventMask,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .entry_mut(obj)?
            .subscribers
            .connect(Subscriber::Callback(callback), mask);
        Ok(())
    }

    pub fn disconnect_callback(&self, obj: ObjectId, callback: &EventCallback) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner
            .entry_mut(obj)?
            .subscribers
            .disconnect(&Subscriber::Callback(callback.clone()))
        {
            Ok(())
        } else {
            Err(RegistryError::NotSubscribed.into())
        }
    }

    // ── Explicit events ───────────────────────────────────────

    /// Ask subscribers to fetch `inst` from the peer (`UpdateRequested`).
    pub fn request_instance_update(&self, obj: ObjectId, inst: u16) -> Result<()> {
        self.fire(obj, inst, EventKind::UpdateRequested)
    }

    pub fn request_update(&self, obj: ObjectId) -> Result<()> {
        self.request_instance_update(obj, ALL_INSTANCES)
    }

    /// Force retransmission of `inst` without touching it (`UpdatedManual`).
    pub fn instance_updated(&self, obj: ObjectId, inst: u16) -> Result<()> {
        self.fire(obj, inst, EventKind::UpdatedManual)
    }

    pub fn updated(&self, obj: ObjectId) -> Result<()> {
        self.instance_updated(obj, ALL_INSTANCES)
    }

    fn fire(&self, obj: ObjectId, inst: u16, kind: EventKind) -> Result<()> {
        let events = {
            let inner = self.inner.lock();
            inner.entry(obj)?;
            inner.pending(obj, inst, kind)
        };
        self.deliver([events]);
        Ok(())
    }

    fn deliver(&self, batches: impl IntoIterator<Item = PendingEvents>) {
        let mut dropped = 0u32;
        for batch in batches {
            for subscriber in &batch.subscribers {
                if !subscriber.deliver(&batch.event) {
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            warn!("registry: {} event(s) dropped, subscriber queue full", dropped);
            let mut inner = self.inner.lock();
            inner.stats.event_errors = inner.stats.event_errors.saturating_add(dropped);
        }
    }
}

impl ObjectLookup for ObjectRegistry {
    fn shape(&self, object_id: u32) -> Option<ObjectShape> {
        self.inner
            .lock()
            .objects
            .get(&ObjectId(object_id))
            .map(|e| ObjectShape {
                num_bytes: e.num_bytes,
                single_instance: e.flags.single_instance,
            })
    }
}
