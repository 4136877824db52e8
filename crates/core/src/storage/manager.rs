use tracing::warn;

use crate::errors::CoreError;
use crate::models::tab::{TabId, TabRecord};

use super::keys::{ACTIVE_TAB_KEY, TABS_KEY};
use super::traits::KeyValueStore;

/// Tab collection as read back from storage, before any repair.
#[derive(Debug, Clone, Default)]
pub struct PersistedTabs {
    pub tabs: Vec<TabRecord>,
    pub active_tab_id: Option<TabId>,
}

/// High-level storage operations: save/load the tab collection and the
/// active pointer.
pub struct StorageManager;

impl StorageManager {
    /// Write the full collection and the active pointer.
    ///
    /// Flow: Vec<TabRecord> → JSON → `stockTabs`, then active id → `activeTabId`
    /// (removed when unset).
    pub fn save_tabs(
        storage: &mut dyn KeyValueStore,
        tabs: &[TabRecord],
        active_tab_id: Option<&TabId>,
    ) -> Result<(), CoreError> {
        let json = serde_json::to_string(tabs)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize tabs: {e}")))?;
        storage.set(TABS_KEY, json)?;

        match active_tab_id {
            Some(id) => storage.set(ACTIVE_TAB_KEY, id.as_str().to_string())?,
            None => {
                storage.remove(ACTIVE_TAB_KEY)?;
            }
        }
        Ok(())
    }

    /// Read the collection and pointer.
    ///
    /// A corrupt `stockTabs` value is logged and treated as an empty
    /// collection so a damaged store never prevents start-up.
    pub fn load_tabs(storage: &dyn KeyValueStore) -> PersistedTabs {
        let tabs = match storage.get(TABS_KEY) {
            Some(json) => match serde_json::from_str::<Vec<TabRecord>>(&json) {
                Ok(tabs) => tabs,
                Err(e) => {
                    warn!(error = %e, "discarding unreadable tab collection");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let active_tab_id = storage
            .get(ACTIVE_TAB_KEY)
            .filter(|s| !s.is_empty())
            .map(TabId::from);

        PersistedTabs {
            tabs,
            active_tab_id,
        }
    }
}
