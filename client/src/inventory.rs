//! Optimistic slot inventory: the client's single entry point to slot storage
//!
//! Intents from game logic are validated, tracked with a pre-image, applied
//! locally according to the [`SyncPolicy`], and handed to the [`Transport`].
//! Server responses are fed back through [`SlotInventory::handle_response`],
//! which commits, corrects or rolls back the matching operation.

use crate::batch_loader::{BatchLoader, LoadProgress, Window};
use crate::events::Subscription;
use crate::pending::PendingOperationTracker;
use crate::policy::{OverlapPolicy, SyncConfig, SyncPolicy};
use crate::query::{self, SlotFilter};
use crate::slot_store::SlotStore;
use crate::transport::Transport;
use log::{debug, info, warn};
use shared::{
    ContainerKind, ItemRecord, MutationIntent, Request, RequestId, Response, Slot, SlotKey,
};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;

/// Why an intent was not issued. Refusals are logged, never returned to callers.
#[derive(Debug, Error, PartialEq, Eq)]
enum Refusal {
    #[error("slot {0} has no container")]
    NoContainer(SlotKey),
    #[error("slot {0} is beyond the container capacity")]
    OutOfBounds(SlotKey),
    #[error("source and destination are the same slot")]
    SameSlot,
    #[error("nothing to move or remove")]
    NothingToChange,
    #[error("overlaps pending requests {0:?}")]
    Overlap(Vec<RequestId>),
}

pub struct SlotInventory<T: Transport> {
    store: SlotStore,
    tracker: PendingOperationTracker,
    loaders: HashMap<ContainerKind, BatchLoader>,
    config: SyncConfig,
    transport: T,
}

impl<T: Transport> SlotInventory<T> {
    pub fn new(config: SyncConfig, transport: T) -> Self {
        let loaders = ContainerKind::ALL
            .iter()
            .map(|container| (*container, BatchLoader::new(config.batch_width)))
            .collect();

        Self {
            store: SlotStore::new(),
            tracker: PendingOperationTracker::new(),
            loaders,
            config,
            transport,
        }
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    pub fn get(&self, key: &SlotKey) -> Option<&ItemRecord> {
        self.store.get(key)
    }

    pub fn subscribe(&mut self) -> Subscription {
        self.store.subscribe()
    }

    pub fn filter(&self, filter: &SlotFilter) -> Vec<SlotKey> {
        query::filter(&self.store, filter)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn policy(&self) -> SyncPolicy {
        self.config.policy
    }

    pub fn pending(&self) -> &PendingOperationTracker {
        &self.tracker
    }

    pub fn pending_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_fully_loaded(&self, container: ContainerKind) -> bool {
        self.store.is_fully_loaded(container)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Moves the item at `from` to `to`, swapping with whatever is there.
    pub fn exchange(&mut self, from: SlotKey, to: SlotKey) -> Option<RequestId> {
        self.issue(MutationIntent::Exchange { from, to })
    }

    /// Discards the item at `key`.
    pub fn remove(&mut self, key: SlotKey) -> Option<RequestId> {
        self.issue(MutationIntent::Remove { key })
    }

    /// Issues a mutation. Returns the request id, or `None` if the intent was refused.
    pub fn issue(&mut self, intent: MutationIntent) -> Option<RequestId> {
        if let Err(refusal) = self.validate(&intent) {
            debug!("Refusing {:?}: {}", intent, refusal);
            return None;
        }

        let request_id = self.tracker.begin(intent.clone(), &self.store);
        if self.config.policy.applies_locally() {
            apply_intent(&mut self.store, &intent);
        }

        debug!("Issued request {} ({:?})", request_id, intent);
        self.transport.send(Request::Mutate { request_id, intent });
        Some(request_id)
    }

    fn validate(&self, intent: &MutationIntent) -> Result<(), Refusal> {
        let keys = intent.touched_keys();

        for key in &keys {
            if key.container == ContainerKind::Unknown {
                return Err(Refusal::NoContainer(*key));
            }
            if let Some(max_size) = self.store.max_size(key.container) {
                if key.index >= max_size {
                    return Err(Refusal::OutOfBounds(*key));
                }
            }
        }

        match intent {
            MutationIntent::Exchange { from, to } if from == to => return Err(Refusal::SameSlot),
            MutationIntent::Exchange { from, to } => {
                if self.store.get(from).is_none() && self.store.get(to).is_none() {
                    return Err(Refusal::NothingToChange);
                }
            }
            MutationIntent::Remove { key } => {
                if self.store.get(key).is_none() {
                    return Err(Refusal::NothingToChange);
                }
            }
        }

        if self.config.enforced_overlap() == OverlapPolicy::Refuse {
            let overlapping = self.tracker.overlapping(&keys);
            if !overlapping.is_empty() {
                return Err(Refusal::Overlap(overlapping));
            }
        }

        Ok(())
    }

    /// Applies a server response. Unknown request ids and stale windows are ignored.
    pub fn handle_response(&mut self, response: Response) {
        match response {
            Response::MutationResult {
                request_id,
                success,
                records,
            } => self.on_mutation_result(request_id, success, records),
            Response::Batch {
                container,
                start,
                end,
                max_size,
                max_occupied_slot,
                records,
            } => self.on_batch(container, start, end, max_size, max_occupied_slot, records),
        }
    }

    fn on_mutation_result(
        &mut self,
        request_id: RequestId,
        success: bool,
        records: Vec<(SlotKey, Slot)>,
    ) {
        if success {
            let Some(operation) = self.tracker.resolve(request_id) else {
                debug!("Ignoring result for unknown request {}", request_id);
                return;
            };
            if !self.config.policy.applies_locally() {
                apply_intent(&mut self.store, &operation.intent);
            }
        } else {
            if !self.tracker.rollback_to(request_id, &mut self.store) {
                debug!("Ignoring rejection of unknown request {}", request_id);
                return;
            }
            self.tracker.resolve(request_id);
            info!("Request {} rejected by server, rolled back", request_id);
        }

        // server values win over the local guess, even when equal
        for (key, slot) in records {
            self.store.set(key, slot);
        }
    }

    /// Starts backfilling `container` from index 0. No-op while loading or once loaded.
    pub fn preload_all(&mut self, container: ContainerKind) {
        let max_size = self.store.max_size(container);
        let Some(loader) = self.loaders.get_mut(&container) else {
            return;
        };

        if let Some(window) = loader.preload_all(max_size) {
            send_window(&mut self.transport, container, window);
        }
    }

    fn on_batch(
        &mut self,
        container: ContainerKind,
        start: u32,
        end: u32,
        max_size: Option<u32>,
        max_occupied_slot: Option<u32>,
        records: Vec<(SlotKey, ItemRecord)>,
    ) {
        let Some(loader) = self.loaders.get_mut(&container) else {
            warn!("Batch for unloadable container {}", container);
            return;
        };
        if !loader.is_expecting(start) {
            debug!("Ignoring stale {} window [{}, {})", container, start, end);
            return;
        }

        self.store.upsert_range(
            records
                .into_iter()
                .map(|(key, record)| (key, Slot::Occupied(record))),
        );
        self.store.set_bounds(container, max_size, max_occupied_slot);

        let bounds = self.store.bounds(container);
        match loader.complete_window(bounds.max_size, bounds.max_occupied_slot) {
            LoadProgress::Continue(window) => send_window(&mut self.transport, container, window),
            LoadProgress::Finished => {
                if self.store.mark_fully_loaded(container) {
                    info!(
                        "{} fully loaded ({} occupied slots)",
                        container,
                        self.store.occupied_count(container)
                    );
                }
            }
        }
    }

    /// Settles operations older than the configured timeout.
    ///
    /// Silence counts as success under `ServerOnlySendsOnFailure`; any other
    /// policy rolls the operation back. Does nothing without a timeout.
    pub fn expire_pending(&mut self, now: Instant) -> Vec<RequestId> {
        let Some(timeout) = self.config.pending_timeout else {
            return Vec::new();
        };

        let expired = self.tracker.expired(now, timeout);
        // newest first so overlapping rollbacks end on the oldest pre-image
        for request_id in expired.iter().rev() {
            if self.config.policy.silence_means_success() {
                debug!("Request {} confirmed by silence", request_id);
            } else {
                self.tracker.rollback_to(*request_id, &mut self.store);
                warn!("Request {} timed out, rolled back", request_id);
            }
            self.tracker.resolve(*request_id);
        }
        expired
    }
}

fn apply_intent(store: &mut SlotStore, intent: &MutationIntent) {
    match intent {
        MutationIntent::Exchange { from, to } => store.exchange(*from, *to),
        MutationIntent::Remove { key } => store.set(*key, Slot::Empty),
    }
}

fn send_window<T: Transport>(transport: &mut T, container: ContainerKind, window: Window) {
    debug!("Loading {} [{}, {})", container, window.start, window.end);
    transport.send(Request::LoadRange {
        container,
        start: window.start,
        end: window.end,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SlotEvent;
    use shared::{Category, Quality};
    use std::time::Duration;

    fn inv(index: u32) -> SlotKey {
        SlotKey::new(ContainerKind::Inventory, index)
    }

    fn item(id: u64, name: &str) -> ItemRecord {
        ItemRecord::new(id, name, Quality::Common, Category::Weapon)
    }

    fn inventory(config: SyncConfig) -> SlotInventory<Vec<Request>> {
        SlotInventory::new(config, Vec::new())
    }

    fn seeded(config: SyncConfig) -> SlotInventory<Vec<Request>> {
        let mut inv_model = inventory(config);
        inv_model.preload_all(ContainerKind::Inventory);
        inv_model.handle_response(Response::Batch {
            container: ContainerKind::Inventory,
            start: 0,
            end: 100,
            max_size: Some(10),
            max_occupied_slot: Some(1),
            records: vec![(inv(0), item(1, "Iron Sword")), (inv(1), item(2, "Oak Bow"))],
        });
        inv_model.transport_mut().clear();
        inv_model
    }

    fn rejection(request_id: RequestId) -> Response {
        Response::MutationResult {
            request_id,
            success: false,
            records: Vec::new(),
        }
    }

    fn confirmation(request_id: RequestId) -> Response {
        Response::MutationResult {
            request_id,
            success: true,
            records: Vec::new(),
        }
    }

    #[test]
    fn test_optimistic_exchange_applies_immediately() {
        let mut model = seeded(SyncConfig::default());

        let id = model.exchange(inv(0), inv(1)).unwrap();

        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(2));
        assert_eq!(model.get(&inv(1)).map(|r| r.instance_id), Some(1));
        assert_eq!(model.pending_count(), 1);
        assert_eq!(
            model.transport(),
            &vec![Request::Mutate {
                request_id: id,
                intent: MutationIntent::Exchange {
                    from: inv(0),
                    to: inv(1)
                },
            }]
        );

        model.handle_response(confirmation(id));
        assert_eq!(model.pending_count(), 0);
        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(2));
    }

    #[test]
    fn test_optimistic_rejection_rolls_back() {
        let mut model = seeded(SyncConfig::default());
        let mut sub = model.subscribe();

        let id = model.exchange(inv(0), inv(5)).unwrap();
        assert!(model.get(&inv(0)).is_none());

        model.handle_response(rejection(id));

        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(1));
        assert!(model.get(&inv(5)).is_none());
        assert_eq!(model.pending_count(), 0);
        // two writes for the exchange, two for the rollback
        assert_eq!(sub.drain().len(), 4);
    }

    #[test]
    fn test_wait_for_ack_applies_on_confirmation() {
        let mut model = seeded(SyncConfig::with_policy(SyncPolicy::WaitServerAck));

        let id = model.exchange(inv(0), inv(1)).unwrap();
        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(1));

        model.handle_response(confirmation(id));
        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(2));
        assert_eq!(model.get(&inv(1)).map(|r| r.instance_id), Some(1));
    }

    #[test]
    fn test_wait_for_ack_rejection_leaves_state() {
        let mut model = seeded(SyncConfig::with_policy(SyncPolicy::WaitServerAck));

        let id = model.remove(inv(0)).unwrap();
        model.handle_response(rejection(id));

        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(1));
        assert_eq!(model.pending_count(), 0);
    }

    #[test]
    fn test_failure_only_policy_rolls_back_on_correction() {
        let mut model = seeded(SyncConfig::with_policy(SyncPolicy::ServerOnlySendsOnFailure));

        let id = model.remove(inv(1)).unwrap();
        assert!(model.get(&inv(1)).is_none());

        model.handle_response(rejection(id));
        assert_eq!(model.get(&inv(1)).map(|r| r.instance_id), Some(2));
    }

    #[test]
    fn test_authoritative_values_win() {
        let mut model = seeded(SyncConfig::default());
        let mut sub = model.subscribe();

        let id = model.exchange(inv(0), inv(1)).unwrap();
        let mut server_copy = item(2, "Oak Bow");
        server_copy.count = 3;

        model.handle_response(Response::MutationResult {
            request_id: id,
            success: true,
            records: vec![(inv(0), Slot::Occupied(server_copy.clone()))],
        });

        assert_eq!(model.get(&inv(0)), Some(&server_copy));
        assert_eq!(model.get(&inv(1)).map(|r| r.instance_id), Some(1));
        assert_eq!(
            sub.drain(),
            vec![
                SlotEvent::SlotChanged(inv(0)),
                SlotEvent::SlotChanged(inv(1)),
                SlotEvent::SlotChanged(inv(0)),
            ]
        );
    }

    #[test]
    fn test_duplicate_and_unknown_responses_ignored() {
        let mut model = seeded(SyncConfig::default());
        let id = model.exchange(inv(0), inv(1)).unwrap();

        model.handle_response(confirmation(id));
        model.handle_response(rejection(id));
        model.handle_response(rejection(999));

        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(2));
        assert_eq!(model.get(&inv(1)).map(|r| r.instance_id), Some(1));
    }

    #[test]
    fn test_invalid_intents_are_refused() {
        let mut model = seeded(SyncConfig::default());

        assert!(model.exchange(inv(0), inv(0)).is_none());
        assert!(model.exchange(inv(0), inv(10)).is_none());
        assert!(model.exchange(inv(3), inv(4)).is_none());
        assert!(model.remove(inv(7)).is_none());
        assert!(model
            .remove(SlotKey::new(ContainerKind::Unknown, 0))
            .is_none());

        assert!(model.transport().is_empty());
        assert_eq!(model.pending_count(), 0);
    }

    #[test]
    fn test_overlapping_operations_last_resolve_wins() {
        let mut model = seeded(SyncConfig::default());

        let first = model.exchange(inv(0), inv(2)).unwrap();
        let second = model.exchange(inv(2), inv(3)).unwrap();
        assert_eq!(model.get(&inv(3)).map(|r| r.instance_id), Some(1));

        model.handle_response(confirmation(first));
        model.handle_response(rejection(second));

        // second's pre-image is the state after first's optimistic move
        assert_eq!(model.get(&inv(2)).map(|r| r.instance_id), Some(1));
        assert!(model.get(&inv(3)).is_none());
    }

    #[test]
    fn test_refuse_overlap_policy() {
        let mut model = seeded(SyncConfig {
            overlap: OverlapPolicy::Refuse,
            ..SyncConfig::default()
        });

        let first = model.exchange(inv(0), inv(2)).unwrap();
        assert!(model.exchange(inv(2), inv(3)).is_none());

        model.handle_response(confirmation(first));
        assert!(model.exchange(inv(2), inv(3)).is_some());
    }

    #[test]
    fn test_silent_success_without_timeout_never_locks_slots() {
        let mut model = seeded(SyncConfig {
            policy: SyncPolicy::ServerOnlySendsOnFailure,
            overlap: OverlapPolicy::Refuse,
            ..SyncConfig::default()
        });

        assert_eq!(model.exchange(inv(0), inv(2)), Some(1));
        assert_eq!(model.exchange(inv(2), inv(0)), Some(2));
        assert_eq!(model.pending_count(), 2);
        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(1));
    }

    #[test]
    fn test_silent_success_with_timeout_unlocks_after_expiry() {
        let mut model = seeded(SyncConfig {
            policy: SyncPolicy::ServerOnlySendsOnFailure,
            overlap: OverlapPolicy::Refuse,
            pending_timeout: Some(Duration::from_secs(5)),
            ..SyncConfig::default()
        });

        let first = model.exchange(inv(0), inv(2)).unwrap();
        assert!(model.exchange(inv(2), inv(0)).is_none());

        let later = Instant::now() + Duration::from_secs(10);
        assert_eq!(model.expire_pending(later), vec![first]);
        assert!(model.exchange(inv(2), inv(0)).is_some());
    }

    #[test]
    fn test_expiry_disabled_by_default() {
        let mut model = seeded(SyncConfig::default());
        model.exchange(inv(0), inv(1)).unwrap();

        let later = Instant::now() + Duration::from_secs(3600);
        assert!(model.expire_pending(later).is_empty());
        assert_eq!(model.pending_count(), 1);
    }

    #[test]
    fn test_expiry_rolls_back_optimistic() {
        let mut model = seeded(SyncConfig {
            pending_timeout: Some(Duration::from_secs(5)),
            ..SyncConfig::default()
        });
        let id = model.exchange(inv(0), inv(1)).unwrap();

        let later = Instant::now() + Duration::from_secs(10);
        assert_eq!(model.expire_pending(later), vec![id]);
        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(1));
        assert_eq!(model.pending_count(), 0);
    }

    #[test]
    fn test_expiry_confirms_under_failure_only_policy() {
        let mut model = seeded(SyncConfig {
            policy: SyncPolicy::ServerOnlySendsOnFailure,
            pending_timeout: Some(Duration::from_secs(5)),
            ..SyncConfig::default()
        });
        let id = model.exchange(inv(0), inv(1)).unwrap();

        let later = Instant::now() + Duration::from_secs(10);
        assert_eq!(model.expire_pending(later), vec![id]);
        assert_eq!(model.get(&inv(0)).map(|r| r.instance_id), Some(2));
        assert_eq!(model.pending_count(), 0);
    }

    #[test]
    fn test_preload_flow() {
        let mut model = inventory(SyncConfig::default());

        model.preload_all(ContainerKind::Inventory);
        model.preload_all(ContainerKind::Inventory);
        assert_eq!(
            model.transport(),
            &vec![Request::LoadRange {
                container: ContainerKind::Inventory,
                start: 0,
                end: 100
            }]
        );

        model.handle_response(Response::Batch {
            container: ContainerKind::Inventory,
            start: 0,
            end: 100,
            max_size: Some(30),
            max_occupied_slot: Some(4),
            records: vec![(inv(4), item(1, "Iron Sword"))],
        });

        assert!(model.is_fully_loaded(ContainerKind::Inventory));
        assert_eq!(model.filter(&SlotFilter::all(ContainerKind::Inventory)).len(), 30);
        assert_eq!(model.transport().len(), 1);
    }

    #[test]
    fn test_continuation_request_keeps_full_width() {
        let mut model = inventory(SyncConfig::default());
        model.preload_all(ContainerKind::Inventory);
        model.handle_response(Response::Batch {
            container: ContainerKind::Inventory,
            start: 0,
            end: 100,
            max_size: Some(150),
            max_occupied_slot: Some(140),
            records: Vec::new(),
        });

        assert_eq!(
            model.transport().last(),
            Some(&Request::LoadRange {
                container: ContainerKind::Inventory,
                start: 100,
                end: 200
            })
        );
        assert!(!model.is_fully_loaded(ContainerKind::Inventory));
    }

    #[test]
    fn test_stale_batch_is_ignored() {
        let mut model = inventory(SyncConfig::default());

        model.handle_response(Response::Batch {
            container: ContainerKind::Equipment,
            start: 0,
            end: 100,
            max_size: Some(8),
            max_occupied_slot: Some(0),
            records: vec![(SlotKey::new(ContainerKind::Equipment, 0), item(1, "Cap"))],
        });

        assert!(model.store().is_empty());
        assert_eq!(model.store().max_size(ContainerKind::Equipment), None);
    }

    #[test]
    fn test_unknown_container_never_loads() {
        let mut model = inventory(SyncConfig::default());
        model.preload_all(ContainerKind::Unknown);
        assert!(model.transport().is_empty());
    }
}
