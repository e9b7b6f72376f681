//! Page state of one entity collection and its pure transitions.
//!
//! The loader publishes a `PageState` as an immutable snapshot; every change
//! is made on a private copy and swapped in whole, so readers never observe a
//! half-applied page.

use serde::Serialize;

use crate::api::models::{EntityType, Page, Record, RecordId};

/// How a fetched page is combined with what is already loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadMode {
    /// Discard loaded items and start from the requested page
    Replace,
    /// Concatenate the next unfetched page onto loaded items
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageState {
    pub entity: EntityType,
    /// Last fetched page (1-based)
    pub page_number: usize,
    pub page_size: usize,
    /// Total reported by the backend on the last load; `None` until observed
    pub total_count: Option<usize>,
    pub loaded_items: Vec<Record>,
    /// A load currently holds the collection
    pub in_flight: bool,
    /// The last count refresh dropped items deleted elsewhere
    pub truncated: bool,
    /// Bumped on every committed change
    pub generation: u64,
    #[serde(skip)]
    first_page: usize,
    /// Ids created locally and appended before any fetch returned them
    #[serde(skip)]
    local_only: Vec<RecordId>,
}

impl PageState {
    pub fn new(entity: EntityType, page_size: usize) -> Self {
        Self {
            entity,
            page_number: 1,
            page_size: page_size.max(1),
            total_count: None,
            loaded_items: Vec::new(),
            in_flight: false,
            truncated: false,
            generation: 0,
            first_page: 1,
            local_only: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.loaded_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded_items.is_empty()
    }

    /// Nothing has been loaded yet (or the collection was reset)
    pub fn is_unloaded(&self) -> bool {
        self.total_count.is_none()
    }

    /// Next page an Append must request, derived from how many fetched rows are held
    pub fn next_page(&self) -> usize {
        let fetched = self.loaded_items.len().saturating_sub(self.local_only.len());
        self.first_page + fetched / self.page_size
    }

    /// Every record the backend reported is loaded
    pub fn is_complete(&self) -> bool {
        self.total_count.is_some_and(|total| self.loaded_items.len() >= total)
    }

    /// Whether the presentation layer showing row `last_visible` (0-based)
    /// is within `threshold` rows of the end and more rows exist
    pub fn needs_more(&self, last_visible: usize, threshold: usize) -> bool {
        !self.is_complete() && last_visible.saturating_add(threshold) >= self.loaded_items.len()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.loaded_items.iter().position(|r| r.id == id)
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.loaded_items.iter().find(|r| r.id == id)
    }

    /// Combine a fetched page with the loaded items and reconcile the count.
    /// Returns how many items the count reconciliation dropped.
    pub fn apply_page(&mut self, mode: LoadMode, page: usize, page_size: usize, fetched: Page) -> usize {
        match mode {
            LoadMode::Replace => {
                self.loaded_items = fetched.items;
                self.local_only.clear();
                self.first_page = page;
            }
            LoadMode::Append => {
                for record in fetched.items {
                    if let Some(slot) = self.local_only.iter().position(|id| *id == record.id) {
                        self.local_only.swap_remove(slot);
                    }
                    match self.position(record.id) {
                        Some(index) => self.loaded_items[index] = record,
                        None => self.loaded_items.push(record),
                    }
                }
            }
        }
        self.page_number = page;
        self.page_size = page_size;
        self.generation += 1;
        self.reconcile_count(fetched.total_count)
    }

    /// Record a fresh total; if it is below what is loaded, keep the first
    /// `total` items and flag the truncation. Returns how many were dropped.
    pub fn reconcile_count(&mut self, total: usize) -> usize {
        self.total_count = Some(total);
        let loaded = self.loaded_items.len();
        if loaded > total {
            self.loaded_items.truncate(total);
            let kept: Vec<RecordId> = self.loaded_items.iter().map(|r| r.id).collect();
            self.local_only.retain(|id| kept.contains(id));
            self.truncated = true;
            self.generation += 1;
            loaded - total
        } else {
            self.truncated = false;
            0
        }
    }

    /// Append a record the backend just created
    pub fn apply_created(&mut self, record: Record) {
        if self.contains(record.id) {
            return;
        }
        self.local_only.push(record.id);
        self.loaded_items.push(record);
        self.total_count = self.total_count.map(|total| total + 1);
        self.generation += 1;
    }

    /// Replace a record in place; false if it is not loaded
    pub fn apply_updated(&mut self, record: Record) -> bool {
        match self.position(record.id) {
            Some(index) => {
                self.loaded_items[index] = record;
                self.generation += 1;
                true
            }
            None => false,
        }
    }

    /// Remove a record; false if it is not loaded
    pub fn apply_deleted(&mut self, id: RecordId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.loaded_items.remove(index);
                self.local_only.retain(|local| *local != id);
                self.total_count = self.total_count.map(|total| total.saturating_sub(1));
                self.generation += 1;
                true
            }
            None => false,
        }
    }
}
