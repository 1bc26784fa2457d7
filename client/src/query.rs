//! Filtered and paginated views over a container

use crate::slot_store::SlotStore;
use shared::{Category, ContainerKind, ItemRecord, Quality, SlotKey};

/// Query over one container. Empty name, `Quality::Any` and `Category::Any` disable their filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFilter {
    pub container: ContainerKind,
    pub name: String,
    pub quality: Quality,
    pub category: Category,
}

impl SlotFilter {
    /// Every slot of `container`.
    pub fn all(container: ContainerKind) -> Self {
        Self {
            container,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn is_unfiltered(&self) -> bool {
        self.name.is_empty() && self.quality == Quality::Any && self.category == Category::Any
    }

    /// Case-sensitive name containment plus exact quality and category, each only when set.
    pub fn matches(&self, record: &ItemRecord) -> bool {
        (self.name.is_empty() || record.name.contains(self.name.as_str()))
            && (self.quality == Quality::Any || record.quality == self.quality)
            && (self.category == Category::Any || record.category == self.category)
    }
}

/// Keys of the filtered container in display order.
///
/// Unfiltered queries list every index `0..max_size`. Filtered queries list the
/// matching slots first and then every empty slot, both ascending, so hits are
/// never interleaved with gaps. Unknown capacity yields nothing.
pub fn filter(store: &SlotStore, filter: &SlotFilter) -> Vec<SlotKey> {
    let Some(max_size) = store.max_size(filter.container) else {
        return Vec::new();
    };
    let keys = (0..max_size).map(|index| SlotKey::new(filter.container, index));

    if filter.is_unfiltered() {
        return keys.collect();
    }

    let mut matches = Vec::new();
    let mut empty = Vec::new();
    for key in keys {
        match store.get(&key) {
            Some(record) if filter.matches(record) => matches.push(key),
            Some(_) => {}
            None => empty.push(key),
        }
    }

    matches.extend(empty);
    matches
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<SlotKey>,
    /// Zero-based page number.
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
}

pub fn paginate(keys: &[SlotKey], page: usize, page_size: usize) -> Page {
    let total = keys.len();
    if page_size == 0 {
        return Page {
            items: Vec::new(),
            page,
            page_count: 0,
            total,
        };
    }

    let page_count = total.div_ceil(page_size);
    let items = keys
        .iter()
        .skip(page.saturating_mul(page_size))
        .take(page_size)
        .copied()
        .collect();

    Page {
        items,
        page,
        page_count,
        total,
    }
}
