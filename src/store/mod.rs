//! Durable storage for dialog records
//!
//! - **prefs**: key-value preference backends (file-backed and in-memory)
//! - **codec**: compact JSON encoding of the record map
//! - **records**: `RecordStore`, the load/save/prune policy over a backend

pub mod codec;
pub mod prefs;
pub mod records;

use anyhow::Result;

pub use prefs::{FilePreferenceStore, MemoryPreferenceStore};
pub use records::{RecordMap, RecordStore};

/// A single-value-per-key string store that survives process restarts
///
/// No transactions and no partial updates: `set` replaces the whole value.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Fails if `value` is longer than `max_value_len()` characters
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn max_value_len(&self) -> usize;
}
