//! Key layout of the durable store.

/// Serialized array of tab records.
pub const TABS_KEY: &str = "stockTabs";

/// Id of the active tab.
pub const ACTIVE_TAB_KEY: &str = "activeTabId";

/// `"light"` or `"dark"`. Owned by the host; never written by this crate.
pub const THEME_KEY: &str = "theme";

/// Prefix of per-symbol quote cache entries.
pub const QUOTE_KEY_PREFIX: &str = "stockPrice_";

/// Cache key for a symbol. Symbols are uppercased so `aapl` and `AAPL` share an entry.
pub fn quote_key(symbol: &str) -> String {
    format!("{QUOTE_KEY_PREFIX}{}", symbol.trim().to_uppercase())
}

/// Inverse of [`quote_key`]; `None` for keys outside the quote namespace.
pub fn symbol_from_quote_key(key: &str) -> Option<&str> {
    key.strip_prefix(QUOTE_KEY_PREFIX).filter(|s| !s.is_empty())
}
