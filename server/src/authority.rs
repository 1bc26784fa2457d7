//! Authoritative slot storage for every connected client
//!
//! The server owns the real contents of each client's containers. Load
//! requests are answered with the requested window plus the container bounds;
//! mutation requests are validated, applied, and answered with the
//! authoritative contents of the touched slots.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use shared::{
    Category, ContainerKind, ItemRecord, MutationIntent, Quality, Request, RequestId, Response,
    Slot, SlotKey,
};
use std::collections::HashMap;
use thiserror::Error;

const ITEM_TEMPLATES: [(u32, &str, Category); 10] = [
    (100, "Iron Sword", Category::Weapon),
    (101, "Oak Bow", Category::Weapon),
    (200, "Leather Cap", Category::Armor),
    (201, "Chain Mail", Category::Armor),
    (300, "Health Potion", Category::Consumable),
    (301, "Mana Potion", Category::Consumable),
    (400, "Copper Ore", Category::Material),
    (401, "Wolf Pelt", Category::Material),
    (500, "Sealed Letter", Category::Quest),
    (600, "Old Coin", Category::Misc),
];

const QUALITIES: [Quality; 5] = [
    Quality::Common,
    Quality::Uncommon,
    Quality::Rare,
    Quality::Epic,
    Quality::Legendary,
];

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub inventory_capacity: u32,
    pub equipment_capacity: u32,
    pub quickbar_capacity: u32,
    /// Items placed at random inventory slots when a client connects.
    pub starting_items: u32,
    /// Probability of rejecting an otherwise valid mutation.
    pub reject_rate: f64,
    /// Answer only failed mutations, for clients that treat silence as success.
    pub silent_success: bool,
    pub seed: Option<u64>,
}

impl AuthorityConfig {
    pub fn capacity(&self, container: ContainerKind) -> u32 {
        match container {
            ContainerKind::Unknown => 0,
            ContainerKind::Inventory => self.inventory_capacity,
            ContainerKind::Equipment => self.equipment_capacity,
            ContainerKind::QuickBar => self.quickbar_capacity,
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            inventory_capacity: 250,
            equipment_capacity: 8,
            quickbar_capacity: 10,
            starting_items: 40,
            reject_rate: 0.0,
            silent_success: false,
            seed: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("slot {0} has no container")]
    NoContainer(SlotKey),
    #[error("slot {0} is out of bounds")]
    OutOfBounds(SlotKey),
    #[error("slot {0} is empty")]
    EmptySlot(SlotKey),
    #[error("nothing to move")]
    NothingToMove,
    #[error("{0} cannot hold that item")]
    NotEquippable(SlotKey),
    #[error("rejected at random")]
    Random,
}

type Storage = HashMap<SlotKey, ItemRecord>;

pub struct SlotAuthority {
    config: AuthorityConfig,
    storages: HashMap<u32, Storage>,
    next_instance_id: u64,
    rng: StdRng,
}

impl SlotAuthority {
    pub fn new(config: AuthorityConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            storages: HashMap::new(),
            next_instance_id: 1,
            rng,
        }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Creates storage for a new client with its starting items. Returns the number placed.
    pub fn add_client(&mut self, client_id: u32) -> usize {
        let capacity = self.config.inventory_capacity as usize;
        let count = (self.config.starting_items as usize).min(capacity);

        let mut storage = Storage::new();
        for index in sample(&mut self.rng, capacity, count) {
            let record = self.generate_item();
            storage.insert(SlotKey::new(ContainerKind::Inventory, index as u32), record);
        }

        info!("Seeded client {} with {} items", client_id, storage.len());
        self.storages.insert(client_id, storage);
        count
    }

    pub fn remove_client(&mut self, client_id: u32) -> bool {
        self.storages.remove(&client_id).is_some()
    }

    pub fn slot(&self, client_id: u32, key: &SlotKey) -> Option<&ItemRecord> {
        self.storages.get(&client_id)?.get(key)
    }

    pub fn occupied_count(&self, client_id: u32) -> usize {
        self.storages.get(&client_id).map_or(0, |storage| storage.len())
    }

    /// Places `record` at `key`, replacing any occupant. Returns false for unknown clients.
    pub fn place(&mut self, client_id: u32, key: SlotKey, record: ItemRecord) -> bool {
        match self.storages.get_mut(&client_id) {
            Some(storage) => {
                storage.insert(key, record);
                true
            }
            None => false,
        }
    }

    /// Answers a client request. `None` means nothing should be sent back.
    pub fn handle_request(&mut self, client_id: u32, request: Request) -> Option<Response> {
        match request {
            Request::LoadRange {
                container,
                start,
                end,
            } => {
                let storage = self.storages.get(&client_id)?;
                Some(load_range(&self.config, storage, container, start, end))
            }
            Request::Mutate { request_id, intent } => self.mutate(client_id, request_id, intent),
        }
    }

    fn mutate(
        &mut self,
        client_id: u32,
        request_id: RequestId,
        intent: MutationIntent,
    ) -> Option<Response> {
        let storage = self.storages.get_mut(&client_id)?;

        let reject_rate = self.config.reject_rate.clamp(0.0, 1.0);
        let outcome = if reject_rate > 0.0 && self.rng.gen_bool(reject_rate) {
            Err(Rejection::Random)
        } else {
            check_intent(&self.config, storage, &intent)
        };

        let success = match outcome {
            Ok(()) => {
                apply_intent(storage, &intent);
                if self.config.silent_success {
                    return None;
                }
                true
            }
            Err(rejection) => {
                debug!(
                    "Rejecting request {} from client {}: {}",
                    request_id, client_id, rejection
                );
                false
            }
        };

        let records = intent
            .touched_keys()
            .into_iter()
            .map(|key| (key, Slot::from(storage.get(&key).cloned())))
            .collect();

        Some(Response::MutationResult {
            request_id,
            success,
            records,
        })
    }

    fn generate_item(&mut self) -> ItemRecord {
        let (template_id, name, category) =
            ITEM_TEMPLATES[self.rng.gen_range(0..ITEM_TEMPLATES.len())];
        let quality = QUALITIES[self.rng.gen_range(0..QUALITIES.len())];
        let count = match category {
            Category::Consumable | Category::Material => self.rng.gen_range(1..=20),
            _ => 1,
        };

        let instance_id = self.next_instance_id;
        self.next_instance_id += 1;

        ItemRecord {
            instance_id,
            template_id,
            name: name.to_string(),
            quality,
            category,
            count,
        }
    }
}

fn load_range(
    config: &AuthorityConfig,
    storage: &Storage,
    container: ContainerKind,
    start: u32,
    end: u32,
) -> Response {
    let capacity = config.capacity(container);
    let end = end.min(capacity);

    let records = (start..end)
        .filter_map(|index| {
            let key = SlotKey::new(container, index);
            storage.get(&key).map(|record| (key, record.clone()))
        })
        .collect();

    let max_occupied_slot = storage
        .keys()
        .filter(|key| key.container == container)
        .map(|key| key.index)
        .max();

    Response::Batch {
        container,
        start,
        end,
        max_size: Some(capacity),
        max_occupied_slot,
        records,
    }
}

fn check_intent(
    config: &AuthorityConfig,
    storage: &Storage,
    intent: &MutationIntent,
) -> Result<(), Rejection> {
    for key in intent.touched_keys() {
        if key.container == ContainerKind::Unknown {
            return Err(Rejection::NoContainer(key));
        }
        if key.index >= config.capacity(key.container) {
            return Err(Rejection::OutOfBounds(key));
        }
    }

    match intent {
        MutationIntent::Exchange { from, to } => {
            let moving = storage.get(from);
            let displaced = storage.get(to);
            if moving.is_none() && displaced.is_none() {
                return Err(Rejection::NothingToMove);
            }
            if !fits(to, moving) {
                return Err(Rejection::NotEquippable(*to));
            }
            if !fits(from, displaced) {
                return Err(Rejection::NotEquippable(*from));
            }
            Ok(())
        }
        MutationIntent::Remove { key } => match storage.get(key) {
            Some(_) => Ok(()),
            None => Err(Rejection::EmptySlot(*key)),
        },
    }
}

/// Whether `record` may be placed at `key`.
fn fits(key: &SlotKey, record: Option<&ItemRecord>) -> bool {
    match (key.container, record) {
        (ContainerKind::Equipment, Some(record)) => record.category.is_equippable(),
        _ => true,
    }
}

fn apply_intent(storage: &mut Storage, intent: &MutationIntent) {
    match intent {
        MutationIntent::Exchange { from, to } => {
            let moving = storage.remove(from);
            let displaced = storage.remove(to);
            if let Some(record) = moving {
                storage.insert(*to, record);
            }
            if let Some(record) = displaced {
                storage.insert(*from, record);
            }
        }
        MutationIntent::Remove { key } => {
            storage.remove(key);
        }
    }
}
