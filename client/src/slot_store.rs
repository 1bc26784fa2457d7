//! Canonical client-side view of the server's slot storage
//!
//! The store is sparse: a key that is absent is an empty slot, never an error.
//! Capacity metadata is tracked per container and comes from server reports,
//! since the server knows the bounds long before every slot has been loaded.

use crate::events::{NotificationBus, SlotEvent, Subscription};
use shared::{ContainerKind, ItemRecord, Slot, SlotKey};
use std::collections::HashMap;

/// Server-reported bounds of one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerBounds {
    /// Capacity of the container, if reported yet.
    pub max_size: Option<u32>,
    /// Highest populated index, if any.
    pub max_occupied_slot: Option<u32>,
    pub fully_loaded: bool,
}

#[derive(Debug, Default)]
pub struct SlotStore {
    slots: HashMap<SlotKey, ItemRecord>,
    bounds: HashMap<ContainerKind, ContainerBounds>,
    bus: NotificationBus,
}

impl SlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SlotKey) -> Option<&ItemRecord> {
        self.slots.get(key)
    }

    /// Owned copy of a slot's contents.
    pub fn slot(&self, key: &SlotKey) -> Slot {
        self.slots.get(key).cloned().into()
    }

    /// Writes `slot` at `key`; `Slot::Empty` removes the entry.
    ///
    /// Always notifies, even when the value did not change, so every write is
    /// a redraw for the presentation layer.
    pub fn set(&mut self, key: SlotKey, slot: Slot) {
        match slot {
            Slot::Empty => {
                self.slots.remove(&key);
            }
            Slot::Occupied(record) => {
                self.slots.insert(key, record);
            }
        }
        self.bus.publish(SlotEvent::SlotChanged(key));
    }

    /// Swaps the contents of two slots. The destination's occupant ends up at the origin.
    pub fn exchange(&mut self, a: SlotKey, b: SlotKey) {
        if a == b {
            return;
        }

        let from_a = self.slots.remove(&a);
        let from_b = self.slots.remove(&b);
        self.set(a, from_b.into());
        self.set(b, from_a.into());
    }

    /// Writes every entry, then publishes one batch event listing all of them.
    pub fn upsert_range(&mut self, entries: impl IntoIterator<Item = (SlotKey, Slot)>) {
        let mut touched = Vec::new();
        for (key, slot) in entries {
            self.set(key, slot);
            touched.push(key);
        }
        self.bus.publish(SlotEvent::BatchChanged(touched));
    }

    pub fn subscribe(&mut self) -> Subscription {
        self.bus.subscribe()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of occupied slots in `container`.
    pub fn occupied_count(&self, container: ContainerKind) -> usize {
        self.slots
            .keys()
            .filter(|key| key.container == container)
            .count()
    }

    pub fn bounds(&self, container: ContainerKind) -> ContainerBounds {
        self.bounds.get(&container).copied().unwrap_or_default()
    }

    pub fn max_size(&self, container: ContainerKind) -> Option<u32> {
        self.bounds(container).max_size
    }

    pub fn max_occupied_slot(&self, container: ContainerKind) -> Option<u32> {
        self.bounds(container).max_occupied_slot
    }

    pub fn is_fully_loaded(&self, container: ContainerKind) -> bool {
        self.bounds(container).fully_loaded
    }

    /// Records bounds reported by the server. Unreported values keep their previous state.
    pub fn set_bounds(
        &mut self,
        container: ContainerKind,
        max_size: Option<u32>,
        max_occupied_slot: Option<u32>,
    ) {
        let bounds = self.bounds.entry(container).or_default();
        if max_size.is_some() {
            bounds.max_size = max_size;
        }
        if max_occupied_slot.is_some() {
            bounds.max_occupied_slot = max_occupied_slot;
        }
    }

    /// Flags `container` as completely backfilled. Returns false if it already was.
    pub fn mark_fully_loaded(&mut self, container: ContainerKind) -> bool {
        let bounds = self.bounds.entry(container).or_default();
        if bounds.fully_loaded {
            return false;
        }
        bounds.fully_loaded = true;
        true
    }
}
