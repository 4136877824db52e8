pub mod file;
pub mod keys;
pub mod manager;
pub mod memory;
pub mod quote_cache;
pub mod traits;
