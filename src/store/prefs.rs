//! Preference backends

use anyhow::{Context, Result, bail};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

use super::PreferenceStore;
use crate::constants::{config, storage};

/// Preferences kept as a flat JSON object (`key -> string`) in one file
pub struct FilePreferenceStore {
    path: PathBuf,
    max_value_len: usize,
}

impl FilePreferenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_value_len: storage::FILE_STORE_MAX_VALUE_LEN,
        }
    }

    /// Store under `<config_dir>/dialog-keeper/preferences.json`
    pub fn open_default() -> Self {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::PREFERENCES_FILENAME);
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_contents(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(None),
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to read preferences from {}", self.path.display())),
        }
    }

    fn read_all(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match self.read_contents()? {
            Some(contents) => serde_json::from_str(&contents)
                .context(format!("Failed to parse preferences file {}", self.path.display())),
            None => Ok(serde_json::Map::new()),
        }
    }

    fn write_all(&self, values: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create preferences directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(values)
            .context("Failed to serialize preferences to JSON")?;

        // Write next to the target and rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .context(format!("Failed to write preferences to {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .context(format!("Failed to replace preferences file {}", self.path.display()))?;
        Ok(())
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.read_all()?;
        Ok(values.get(key).and_then(|v| v.as_str()).map(str::to_owned))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let len = value.chars().count();
        if len > self.max_value_len {
            bail!("Value too long for key '{}': {} > {}", key, len, self.max_value_len);
        }
        let mut values = match self.read_all() {
            Ok(values) => values,
            Err(e) if self.read_contents().is_ok() => {
                // Unparseable: start over rather than refusing every later write
                warn!(path = %self.path.display(), error = ?e, "Preferences file is corrupt, overwriting it");
                serde_json::Map::new()
            }
            Err(e) => return Err(e),
        };
        values.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self.write_all(&values)?;
        debug!(path = %self.path.display(), key = %key, len = len, "Wrote preference");
        Ok(())
    }

    fn max_value_len(&self) -> usize {
        self.max_value_len
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, String>,
    fail_writes: bool,
}

/// Session-only preferences; clones share the same storage
#[derive(Debug, Clone)]
pub struct MemoryPreferenceStore {
    state: Rc<RefCell<MemoryState>>,
    max_value_len: usize,
}

impl Default for MemoryPreferenceStore {
    fn default() -> Self {
        Self::new(storage::FILE_STORE_MAX_VALUE_LEN)
    }
}

impl MemoryPreferenceStore {
    pub fn new(max_value_len: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(MemoryState::default())),
            max_value_len,
        }
    }

    /// Make every subsequent `set` fail, simulating a storage I/O error
    #[cfg(test)]
    pub fn fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }

    #[cfg(test)]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.state.borrow().values.get(key).cloned()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.borrow().values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes {
            bail!("Preference store is not writable");
        }
        let len = value.chars().count();
        if len > self.max_value_len {
            bail!("Value too long for key '{}': {} > {}", key, len, self.max_value_len);
        }
        state.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn max_value_len(&self) -> usize {
        self.max_value_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FilePreferenceStore::new(dir.path().join("nested/preferences.json"));

        assert_eq!(store.get("positions").unwrap(), None);
        store.set("positions", "{\"Log\":{}}").unwrap();
        store.set("other", "value").unwrap();

        // A fresh handle on the same path sees both keys
        let reopened = FilePreferenceStore::new(store.path().to_path_buf());
        assert_eq!(reopened.get("positions").unwrap().as_deref(), Some("{\"Log\":{}}"));
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("value"));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_rejects_oversized_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FilePreferenceStore::new(dir.path().join("preferences.json"));
        let huge = "x".repeat(storage::FILE_STORE_MAX_VALUE_LEN + 1);

        assert!(store.set("positions", &huge).is_err());
        assert_eq!(store.get("positions").unwrap(), None);
    }

    #[test]
    fn test_file_store_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, "not json").unwrap();
        let store = FilePreferenceStore::new(path);
        assert!(store.get("positions").is_err());
    }

    #[test]
    fn test_file_store_write_replaces_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, "{\"positions\": ").unwrap();
        let mut store = FilePreferenceStore::new(path);

        store.set("positions", "{}").unwrap();
        assert_eq!(store.get("positions").unwrap().as_deref(), Some("{}"));
        store.set("other", "value").unwrap();
        assert_eq!(store.get("positions").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryPreferenceStore::new(16);
        let mut writer = store.clone();
        writer.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(writer.set("k", &"x".repeat(17)).is_err());

        store.fail_writes(true);
        assert!(writer.set("k", "w").is_err());
        assert_eq!(store.raw("k").as_deref(), Some("v"));
    }
}
