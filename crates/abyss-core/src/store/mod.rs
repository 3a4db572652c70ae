//! Local persisted key-value store.
//!
//! Holds the session bearer token and one cache envelope per feed. Values are
//! opaque strings; callers own their encoding.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// String key-value storage that survives for the life of the session.
///
/// Entries are replaced whole on every `set`; there is no partial update.
pub trait LocalStore: Send + Sync {
    /// Read a value. `None` if the key was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Returns whether an entry existed.
    fn remove(&self, key: &str) -> Result<bool>;
}
