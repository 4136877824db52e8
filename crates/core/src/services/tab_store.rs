use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::tab::{label_for, normalize_symbol, TabId, TabRecord, TabSummary};
use crate::storage::manager::StorageManager;
use crate::storage::traits::KeyValueStore;

/// Ordered collection of tabs plus the active-tab pointer.
///
/// Invariants held between calls:
/// - ids are unique;
/// - `active_tab_id` names a member;
/// - the collection never exceeds `max_tabs` and is never empty.
///
/// Every mutation writes the full collection and pointer to storage before
/// returning.
#[derive(Debug, Clone)]
pub struct TabStore {
    tabs: Vec<TabRecord>,
    active_tab_id: Option<TabId>,
    max_tabs: usize,
}

/// What [`TabStore::remove`] took out.
#[derive(Debug, Clone)]
pub struct RemovedTab {
    pub record: TabRecord,
    pub was_active: bool,
}

impl TabStore {
    /// Restore the collection from storage, repairing anything that breaks
    /// an invariant: duplicate ids, overflow, a dangling active pointer, or
    /// an empty collection.
    pub fn initialize(storage: &mut dyn KeyValueStore, max_tabs: usize) -> Result<Self, CoreError> {
        let persisted = StorageManager::load_tabs(storage);
        let loaded = persisted.tabs.len();

        let mut seen = HashSet::new();
        let mut tabs: Vec<TabRecord> = persisted
            .tabs
            .into_iter()
            .filter(|t| !t.id.as_str().is_empty() && seen.insert(t.id.clone()))
            .collect();
        if tabs.len() < loaded {
            warn!(dropped = loaded - tabs.len(), "dropped tabs with duplicate or empty ids");
        }
        if tabs.len() > max_tabs {
            warn!(dropped = tabs.len() - max_tabs, max_tabs, "dropped tabs beyond the limit");
            tabs.truncate(max_tabs);
        }
        let mut repaired = tabs.len() != loaded;

        if tabs.is_empty() {
            debug!("no saved tabs, creating a default tab");
            tabs.push(TabRecord::new());
            repaired = true;
        }

        let active_tab_id = match persisted.active_tab_id {
            Some(id) if tabs.iter().any(|t| t.id == id) => id,
            other => {
                if other.is_some() {
                    warn!("saved active tab no longer exists, selecting the first tab");
                }
                repaired = true;
                tabs[0].id.clone()
            }
        };

        let store = Self {
            tabs,
            active_tab_id: Some(active_tab_id),
            max_tabs,
        };
        if repaired {
            store.persist(storage)?;
        }
        info!(tabs = store.tabs.len(), "tab store initialized");
        Ok(store)
    }

    pub fn tabs(&self) -> &[TabRecord] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn max_tabs(&self) -> usize {
        self.max_tabs
    }

    pub fn is_full(&self) -> bool {
        self.tabs.len() >= self.max_tabs
    }

    pub fn active_id(&self) -> Option<&TabId> {
        self.active_tab_id.as_ref()
    }

    pub fn active(&self) -> Option<&TabRecord> {
        let id = self.active_tab_id.as_ref()?;
        self.get(id)
    }

    pub fn active_mut(&mut self) -> Option<&mut TabRecord> {
        let id = self.active_tab_id.clone()?;
        self.tabs.iter_mut().find(|t| t.id == id)
    }

    pub fn get(&self, id: &TabId) -> Option<&TabRecord> {
        self.tabs.iter().find(|t| &t.id == id)
    }

    pub fn position(&self, id: &TabId) -> Option<usize> {
        self.tabs.iter().position(|t| &t.id == id)
    }

    pub fn contains(&self, id: &TabId) -> bool {
        self.position(id).is_some()
    }

    /// Append a blank record and make it active.
    pub fn push_new(&mut self, storage: &mut dyn KeyValueStore) -> Result<TabId, CoreError> {
        if self.is_full() {
            return Err(CoreError::TabLimitReached(self.max_tabs));
        }
        let record = TabRecord::new();
        let id = record.id.clone();
        self.tabs.push(record);
        self.active_tab_id = Some(id.clone());
        self.persist(storage)?;
        info!(tab = %id, count = self.tabs.len(), "tab created");
        Ok(id)
    }

    /// Point the active pointer at `id`. `Ok(false)` if unknown or already active.
    pub fn set_active(&mut self, id: &TabId, storage: &mut dyn KeyValueStore) -> Result<bool, CoreError> {
        if self.active_tab_id.as_ref() == Some(id) || !self.contains(id) {
            return Ok(false);
        }
        self.active_tab_id = Some(id.clone());
        self.persist(storage)?;
        debug!(tab = %id, "tab activated");
        Ok(true)
    }

    /// Remove `id`. The last remaining record cannot be removed.
    ///
    /// When the removed record was active, its left neighbour (or the new
    /// first record) becomes active.
    pub fn remove(&mut self, id: &TabId, storage: &mut dyn KeyValueStore) -> Result<RemovedTab, CoreError> {
        let idx = self
            .position(id)
            .ok_or_else(|| CoreError::TabNotFound(id.to_string()))?;
        if self.tabs.len() <= 1 {
            return Err(CoreError::LastTab);
        }

        let record = self.tabs.remove(idx);
        let was_active = self.active_tab_id.as_ref() == Some(id);
        if was_active {
            let next = idx.saturating_sub(1);
            self.active_tab_id = Some(self.tabs[next].id.clone());
        }
        self.persist(storage)?;
        info!(tab = %id, count = self.tabs.len(), "tab closed");
        Ok(RemovedTab { record, was_active })
    }

    /// Move `moved` to sit immediately before `before`.
    /// `Ok(false)` when either id is unknown or both are the same.
    pub fn reorder(
        &mut self,
        moved: &TabId,
        before: &TabId,
        storage: &mut dyn KeyValueStore,
    ) -> Result<bool, CoreError> {
        if moved == before {
            return Ok(false);
        }
        let Some(from) = self.position(moved) else {
            return Ok(false);
        };
        if !self.contains(before) {
            return Ok(false);
        }

        let record = self.tabs.remove(from);
        let to = self.position(before).unwrap_or(self.tabs.len());
        self.tabs.insert(to, record);
        self.persist(storage)?;
        debug!(tab = %moved, before = %before, "tabs reordered");
        Ok(true)
    }

    /// Replace every record with one blank, active record. Returns the
    /// records that were removed.
    ///
    /// If the write fails the previous collection and pointer are restored.
    pub fn reset(&mut self, storage: &mut dyn KeyValueStore) -> Result<Vec<TabRecord>, CoreError> {
        let fresh = TabRecord::new();
        let fresh_id = fresh.id.clone();
        let previous_tabs = std::mem::replace(&mut self.tabs, vec![fresh]);
        let previous_active = self.active_tab_id.replace(fresh_id);

        if let Err(e) = self.persist(storage) {
            self.tabs = previous_tabs;
            self.active_tab_id = previous_active;
            return Err(e);
        }
        info!(removed = previous_tabs.len(), "all tabs replaced by a blank tab");
        Ok(previous_tabs)
    }

    /// Whether any record holds `symbol` (case-insensitive, trimmed).
    pub fn is_symbol_referenced(&self, symbol: &str) -> bool {
        match normalize_symbol(symbol) {
            Some(sym) => self
                .tabs
                .iter()
                .any(|t| t.normalized_symbol().as_deref() == Some(sym.as_str())),
            None => false,
        }
    }

    /// Uppercased symbols of all records.
    pub fn referenced_symbols(&self) -> HashSet<String> {
        self.tabs.iter().filter_map(|t| t.normalized_symbol()).collect()
    }

    /// Tab strip entries. `live_symbol` overrides the active record's symbol
    /// so the label follows typing before the debounced write lands.
    pub fn summaries(&self, live_symbol: Option<&str>) -> Vec<TabSummary> {
        self.tabs
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let active = self.active_tab_id.as_ref() == Some(&t.id);
                let symbol = match live_symbol {
                    Some(s) if active => s,
                    _ => t.symbol.as_str(),
                };
                TabSummary {
                    id: t.id.clone(),
                    label: label_for(symbol, i),
                    active,
                    auto_price_enabled: t.auto_price_enabled,
                }
            })
            .collect()
    }

    pub fn persist(&self, storage: &mut dyn KeyValueStore) -> Result<(), CoreError> {
        StorageManager::save_tabs(storage, &self.tabs, self.active_tab_id.as_ref())
    }
}
