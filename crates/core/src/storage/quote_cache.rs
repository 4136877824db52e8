use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::CoreError;
use crate::models::quote::{Quote, QuoteCacheEntry};
use crate::models::tab::normalize_symbol;

use super::keys::{quote_key, symbol_from_quote_key};
use super::traits::KeyValueStore;

/// Time-bounded per-symbol quote memo, kept in durable storage under
/// `stockPrice_<SYMBOL>`.
///
/// Entries are never trusted past `ttl`; they are removed explicitly when no
/// tab references their symbol any more.
#[derive(Debug, Clone)]
pub struct QuoteCache {
    ttl: chrono::Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self { ttl }
    }

    /// The entry for `symbol` regardless of age. Unreadable entries count as missing.
    pub fn get(&self, storage: &dyn KeyValueStore, symbol: &str) -> Option<QuoteCacheEntry> {
        let raw = storage.get(&quote_key(symbol))?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(symbol, error = %e, "ignoring unreadable cached quote");
                None
            }
        }
    }

    /// The cached quote for `symbol` if it is still fresh at `now`.
    pub fn get_fresh_at(
        &self,
        storage: &dyn KeyValueStore,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Option<QuoteCacheEntry> {
        self.get(storage, symbol)
            .filter(|entry| entry.is_fresh_at(now, self.ttl))
    }

    /// Create or overwrite the entry for `symbol`.
    pub fn store(
        &self,
        storage: &mut dyn KeyValueStore,
        symbol: &str,
        quote: Quote,
        fetched_at: DateTime<Utc>,
    ) -> Result<QuoteCacheEntry, CoreError> {
        let entry = QuoteCacheEntry::new(quote, fetched_at);
        let json = serde_json::to_string(&entry)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize quote: {e}")))?;
        storage.set(&quote_key(symbol), json)?;
        Ok(entry)
    }

    /// Delete the entry for `symbol`. Returns whether one existed.
    pub fn evict(&self, storage: &mut dyn KeyValueStore, symbol: &str) -> Result<bool, CoreError> {
        let removed = storage.remove(&quote_key(symbol))?;
        if removed {
            debug!(symbol, "evicted cached quote");
        }
        Ok(removed)
    }

    /// Uppercased symbols that currently have an entry.
    pub fn cached_symbols(&self, storage: &dyn KeyValueStore) -> Vec<String> {
        let mut symbols: Vec<String> = storage
            .keys()
            .iter()
            .filter_map(|k| symbol_from_quote_key(k).map(str::to_string))
            .collect();
        symbols.sort();
        symbols
    }

    /// Remove every entry no tab can reach: symbols not in `referenced`
    /// (uppercased), and keys whose suffix is not the canonical uppercase
    /// form, since lookups never address those. Returns the number removed.
    pub fn sweep_orphans(
        &self,
        storage: &mut dyn KeyValueStore,
        referenced: &HashSet<String>,
    ) -> Result<usize, CoreError> {
        let orphans: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|key| match symbol_from_quote_key(key) {
                Some(raw) => match normalize_symbol(raw) {
                    Some(symbol) => symbol != raw || !referenced.contains(&symbol),
                    None => true,
                },
                None => false,
            })
            .collect();

        let mut removed = 0;
        for key in orphans {
            if storage.remove(&key)? {
                debug!(key = %key, "evicted orphaned cached quote");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
