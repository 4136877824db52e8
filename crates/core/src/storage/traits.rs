use crate::errors::CoreError;

/// Durable string key/value storage (the browser's `localStorage` shape).
///
/// Writes are synchronous: once `set` or `remove` returns `Ok`, the value
/// survives a restart.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String) -> Result<(), CoreError>;

    /// Remove a key. Returns whether it was present.
    fn remove(&mut self, key: &str) -> Result<bool, CoreError>;

    /// All keys currently stored, in no particular order.
    fn keys(&self) -> Vec<String>;
}
