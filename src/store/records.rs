//! Record store: read-modify-write persistence of dialog records under a size budget

use hashlink::LinkedHashMap;
use tracing::{debug, error, info, warn};

use super::PreferenceStore;
use super::codec;
use crate::constants::storage;
use crate::types::{DialogRecord, is_fallback_id};

/// Records keyed by id, ordered from least to most recently written
pub type RecordMap = LinkedHashMap<String, DialogRecord>;

/// Owns the durable form of all dialog records
///
/// Every mutation reloads the full map, edits it and writes it back. There is
/// no locking: the caller is the single event thread, and a lost update between
/// two processes is tolerated.
pub struct RecordStore {
    prefs: Box<dyn PreferenceStore>,
    key: String,
    max_chars: usize,
}

impl RecordStore {
    /// `max_chars` is capped by the backend's own value limit
    pub fn new(prefs: Box<dyn PreferenceStore>, max_chars: usize) -> Self {
        let max_chars = max_chars.min(prefs.max_value_len());
        Self {
            prefs,
            key: storage::POSITIONS_KEY.to_string(),
            max_chars,
        }
    }

    pub fn budget(&self) -> usize {
        self.max_chars
    }

    pub fn load_all(&self) -> RecordMap {
        match self.prefs.get(&self.key) {
            Ok(Some(blob)) => {
                let records = codec::decode(&blob);
                debug!(count = records.len(), "Loaded dialog positions");
                records
            }
            Ok(None) => RecordMap::new(),
            Err(e) => {
                warn!(error = ?e, "Failed to load dialog positions, starting empty");
                RecordMap::new()
            }
        }
    }

    /// Upsert one record; it becomes the most recently written entry
    pub fn save(&mut self, record: &DialogRecord) {
        if record.is_fallback() {
            debug!(id = %record.id, "Not persisting fallback id");
            return;
        }
        let mut all = self.load_all();
        all.remove(&record.id);
        all.insert(record.id.clone(), record.clone().with_open_status(false));
        self.save_all(&all);
    }

    /// Write the whole map, evicting oldest entries until it fits the budget
    ///
    /// Returns the number of records written. Write failures are logged and
    /// absorbed; tracking then only lasts for this session.
    pub fn save_all(&mut self, records: &RecordMap) -> usize {
        let (blob, kept) = match encode_within_budget(records, self.max_chars) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = ?e, "Failed to encode dialog positions");
                return 0;
            }
        };

        match self.prefs.set(&self.key, &blob) {
            Ok(()) => {
                debug!(count = kept, chars = blob.chars().count(), "Saved dialog positions");
                kept
            }
            Err(e) => {
                error!(error = ?e, "Failed to save dialog positions");
                0
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let mut all = self.load_all();
        if all.remove(id).is_some() {
            self.save_all(&all);
            debug!(id = %id, "Removed dialog position");
            true
        } else {
            false
        }
    }

    pub fn clear_all(&mut self) {
        match self.prefs.set(&self.key, storage::EMPTY_BLOB) {
            Ok(()) => info!("Cleared all saved dialog positions"),
            Err(e) => error!(error = ?e, "Failed to clear dialog positions"),
        }
    }

    /// Drop entries stored under fallback ids (left behind by older versions)
    pub fn cleanup_fallback_entries(&mut self) -> usize {
        let all = self.load_all();
        let before = all.len();
        let kept: RecordMap = all
            .into_iter()
            .filter(|(id, _)| !is_fallback_id(id))
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.save_all(&kept);
            info!(removed = removed, "Cleaned up fallback dialog position entries");
        }
        removed
    }
}

/// Encode `records` minus fallback ids, evicting from the front until the text fits
///
/// Returns the encoded text and the number of entries it holds.
pub fn encode_within_budget(records: &RecordMap, max_chars: usize) -> anyhow::Result<(String, usize)> {
    let mut kept: RecordMap = records
        .iter()
        .filter(|(id, _)| !is_fallback_id(id))
        .map(|(id, record)| (id.clone(), record.clone()))
        .collect();

    let mut blob = codec::encode(&kept)?;
    if blob.chars().count() > max_chars {
        warn!(chars = blob.chars().count(), max = max_chars, "Dialog positions too large, pruning entries");
        while blob.chars().count() > max_chars {
            let Some((evicted, _)) = kept.pop_front() else {
                break;
            };
            info!(id = %evicted, "Evicted dialog position to stay under the size limit");
            blob = codec::encode(&kept)?;
        }
    }
    Ok((blob, kept.len()))
}
