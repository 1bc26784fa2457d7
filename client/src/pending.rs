//! In-flight mutation tracking for rollback and response correlation

use crate::slot_store::SlotStore;
use shared::{MutationIntent, RequestId, Slot, SlotKey};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// A mutation that was sent but not yet answered.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub request_id: RequestId,
    pub intent: MutationIntent,
    /// Keys touched by the intent, in issue order.
    pub touched_keys: Vec<SlotKey>,
    /// Contents of every touched key at the moment the operation began.
    pub pre_image: HashMap<SlotKey, Slot>,
    pub issued_at: Instant,
}

/// Maps request ids to the pre-images needed to undo their mutations.
///
/// Request ids, not slot keys, are the unit of correlation: a multi-slot
/// operation commits or rolls back as a whole.
#[derive(Debug)]
pub struct PendingOperationTracker {
    pending: BTreeMap<RequestId, PendingOperation>,
    next_request_id: RequestId,
}

impl PendingOperationTracker {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_request_id: 1,
        }
    }

    /// Registers `intent` and snapshots the current contents of its keys.
    ///
    /// Must run before the intent is applied locally so the pre-image is the
    /// true prior state.
    pub fn begin(&mut self, intent: MutationIntent, store: &SlotStore) -> RequestId {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let touched_keys = intent.touched_keys();
        let pre_image = touched_keys
            .iter()
            .map(|key| (*key, store.slot(key)))
            .collect();

        self.pending.insert(
            request_id,
            PendingOperation {
                request_id,
                intent,
                touched_keys,
                pre_image,
                issued_at: Instant::now(),
            },
        );

        request_id
    }

    /// Removes and returns the operation. A repeated or unknown id yields `None`.
    pub fn resolve(&mut self, request_id: RequestId) -> Option<PendingOperation> {
        self.pending.remove(&request_id)
    }

    /// Writes the pre-image of `request_id` back into `store`.
    ///
    /// The operation stays registered; returns false if it is not pending.
    pub fn rollback_to(&self, request_id: RequestId, store: &mut SlotStore) -> bool {
        let Some(operation) = self.pending.get(&request_id) else {
            return false;
        };

        for key in &operation.touched_keys {
            let slot = operation.pre_image.get(key).cloned().unwrap_or_default();
            store.set(*key, slot);
        }
        true
    }

    pub fn get(&self, request_id: RequestId) -> Option<&PendingOperation> {
        self.pending.get(&request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Ids of pending operations that touch any of `keys`, ascending.
    pub fn overlapping(&self, keys: &[SlotKey]) -> Vec<RequestId> {
        self.pending
            .values()
            .filter(|op| op.touched_keys.iter().any(|key| keys.contains(key)))
            .map(|op| op.request_id)
            .collect()
    }

    /// Ids of operations issued more than `timeout` before `now`, ascending.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<RequestId> {
        self.pending
            .values()
            .filter(|op| now.saturating_duration_since(op.issued_at) > timeout)
            .map(|op| op.request_id)
            .collect()
    }
}

impl Default for PendingOperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Category, ContainerKind, ItemRecord, Quality};

    fn key(index: u32) -> SlotKey {
        SlotKey::new(ContainerKind::Inventory, index)
    }

    fn item(id: u64) -> ItemRecord {
        ItemRecord::new(id, format!("Item {id}"), Quality::Rare, Category::Material)
    }

    fn exchange(from: u32, to: u32) -> MutationIntent {
        MutationIntent::Exchange {
            from: key(from),
            to: key(to),
        }
    }

    #[test]
    fn test_request_ids_start_at_one_and_increase() {
        let store = SlotStore::new();
        let mut tracker = PendingOperationTracker::new();

        let first = tracker.begin(exchange(0, 1), &store);
        let second = tracker.begin(exchange(2, 3), &store);
        tracker.resolve(first);
        let third = tracker.begin(exchange(0, 1), &store);

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 3);
    }

    #[test]
    fn test_begin_snapshots_pre_image_including_empty() {
        let mut store = SlotStore::new();
        store.set(key(0), item(1).into());
        let mut tracker = PendingOperationTracker::new();

        let id = tracker.begin(exchange(0, 1), &store);
        let op = tracker.get(id).unwrap();

        assert_eq!(op.touched_keys, vec![key(0), key(1)]);
        assert_eq!(op.pre_image.get(&key(0)), Some(&Slot::Occupied(item(1))));
        assert_eq!(op.pre_image.get(&key(1)), Some(&Slot::Empty));
    }

    #[test]
    fn test_resolve_is_single_use() {
        let store = SlotStore::new();
        let mut tracker = PendingOperationTracker::new();
        let id = tracker.begin(exchange(0, 1), &store);

        assert!(tracker.resolve(id).is_some());
        assert!(tracker.resolve(id).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_rollback_restores_exact_pre_image() {
        let mut store = SlotStore::new();
        store.set(key(0), item(1).into());
        store.set(key(1), item(2).into());
        let mut tracker = PendingOperationTracker::new();

        let id = tracker.begin(exchange(0, 1), &store);
        store.set(key(0), item(9).into());
        store.set(key(1), Slot::Empty);

        assert!(tracker.rollback_to(id, &mut store));
        assert_eq!(store.get(&key(0)), Some(&item(1)));
        assert_eq!(store.get(&key(1)), Some(&item(2)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_rollback_unknown_id() {
        let mut store = SlotStore::new();
        let tracker = PendingOperationTracker::new();
        assert!(!tracker.rollback_to(77, &mut store));
    }

    #[test]
    fn test_overlapping_pending_operations() {
        let store = SlotStore::new();
        let mut tracker = PendingOperationTracker::new();
        let first = tracker.begin(exchange(0, 1), &store);
        let _second = tracker.begin(exchange(4, 5), &store);

        assert_eq!(tracker.overlapping(&[key(1), key(9)]), vec![first]);
        assert!(tracker.overlapping(&[key(7)]).is_empty());
    }

    #[test]
    fn test_expired_operations() {
        let store = SlotStore::new();
        let mut tracker = PendingOperationTracker::new();
        let id = tracker.begin(exchange(0, 1), &store);
        let issued_at = tracker.get(id).unwrap().issued_at;

        let timeout = Duration::from_secs(2);
        assert!(tracker.expired(issued_at + Duration::from_secs(1), timeout).is_empty());
        assert_eq!(
            tracker.expired(issued_at + Duration::from_secs(3), timeout),
            vec![id]
        );
    }
}
