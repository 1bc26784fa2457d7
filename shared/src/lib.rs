use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_BATCH_WIDTH: u32 = 100;
pub const MAX_PACKET_SIZE: usize = 65_507;

/// Correlates a mutation request with its server response.
pub type RequestId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Request(Request),
    Disconnect,

    Connected {
        client_id: u32,
    },
    Response(Response),
    Disconnected {
        reason: String,
    },
}

/// Storage area a slot belongs to. `Unknown` is a sentinel and never addresses real storage.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub enum ContainerKind {
    #[default]
    Unknown,
    Inventory,
    Equipment,
    QuickBar,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 3] = [
        ContainerKind::Inventory,
        ContainerKind::Equipment,
        ContainerKind::QuickBar,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "inventory" | "inv" => Some(ContainerKind::Inventory),
            "equipment" | "eq" => Some(ContainerKind::Equipment),
            "quickbar" | "bar" => Some(ContainerKind::QuickBar),
            _ => None,
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerKind::Unknown => "unknown",
            ContainerKind::Inventory => "inventory",
            ContainerKind::Equipment => "equipment",
            ContainerKind::QuickBar => "quickbar",
        };
        f.write_str(name)
    }
}

/// Addressable storage location. Ordered by container, then index.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct SlotKey {
    pub container: ContainerKind,
    pub index: u32,
}

impl SlotKey {
    pub const fn new(container: ContainerKind, index: u32) -> Self {
        Self { container, index }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.container, self.index)
    }
}

/// Quality tier. `Any` doubles as the "no filter" value in queries.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    #[default]
    Any,
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Quality {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "any" => Some(Quality::Any),
            "common" => Some(Quality::Common),
            "uncommon" => Some(Quality::Uncommon),
            "rare" => Some(Quality::Rare),
            "epic" => Some(Quality::Epic),
            "legendary" => Some(Quality::Legendary),
            _ => None,
        }
    }
}

/// Item category. `Any` doubles as the "no filter" value in queries.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
    #[default]
    Any,
    Weapon,
    Armor,
    Consumable,
    Material,
    Quest,
    Misc,
}

impl Category {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "any" => Some(Category::Any),
            "weapon" => Some(Category::Weapon),
            "armor" => Some(Category::Armor),
            "consumable" => Some(Category::Consumable),
            "material" => Some(Category::Material),
            "quest" => Some(Category::Quest),
            "misc" => Some(Category::Misc),
            _ => None,
        }
    }

    /// Whether an item of this category may sit in an equipment slot.
    pub fn is_equippable(&self) -> bool {
        matches!(self, Category::Weapon | Category::Armor)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub instance_id: u64,
    pub template_id: u32,
    pub name: String,
    pub quality: Quality,
    pub category: Category,
    pub count: u32,
}

impl ItemRecord {
    pub fn new(
        instance_id: u64,
        name: impl Into<String>,
        quality: Quality,
        category: Category,
    ) -> Self {
        Self {
            instance_id,
            template_id: 0,
            name: name.into(),
            quality,
            category,
            count: 1,
        }
    }
}

/// Contents of a single slot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Empty,
    Occupied(ItemRecord),
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn as_record(&self) -> Option<&ItemRecord> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(record) => Some(record),
        }
    }

    pub fn into_record(self) -> Option<ItemRecord> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(record) => Some(record),
        }
    }
}

impl From<Option<ItemRecord>> for Slot {
    fn from(record: Option<ItemRecord>) -> Self {
        match record {
            Some(record) => Slot::Occupied(record),
            None => Slot::Empty,
        }
    }
}

impl From<ItemRecord> for Slot {
    fn from(record: ItemRecord) -> Self {
        Slot::Occupied(record)
    }
}

/// A change the client asks the server to make.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum MutationIntent {
    /// Move the item at `from` into `to`, displacing any occupant back to `from`.
    Exchange { from: SlotKey, to: SlotKey },
    /// Discard the item at `key`.
    Remove { key: SlotKey },
}

impl MutationIntent {
    pub fn touched_keys(&self) -> Vec<SlotKey> {
        match self {
            MutationIntent::Exchange { from, to } if from == to => vec![*from],
            MutationIntent::Exchange { from, to } => vec![*from, *to],
            MutationIntent::Remove { key } => vec![*key],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Request {
    Mutate {
        request_id: RequestId,
        intent: MutationIntent,
    },
    LoadRange {
        container: ContainerKind,
        start: u32,
        end: u32,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Response {
    /// Outcome of a mutation. `records` holds authoritative values; a key that is
    /// not listed is unchanged.
    MutationResult {
        request_id: RequestId,
        success: bool,
        records: Vec<(SlotKey, Slot)>,
    },
    /// One backfill window `[start, end)` of a container.
    Batch {
        container: ContainerKind,
        start: u32,
        end: u32,
        max_size: Option<u32>,
        max_occupied_slot: Option<u32>,
        records: Vec<(SlotKey, ItemRecord)>,
    },
}
