//! Daemon configuration
//!
//! Stored as JSON at `<config_dir>/dialog-keeper/config.json`. Missing keys
//! take their defaults, so a partial file is fine. CLI flags override the file
//! for the lifetime of one daemon run and are never written back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::{config, storage};
use crate::manager::{DEFAULT_TARGETED_TITLES, TrackingPolicy};

/// Which application's windows the daemon manages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Case-insensitive substring of WM_CLASS (instance or class)
    pub wm_class: Option<String>,
    /// Exact `_NET_WM_PID` of the host process
    pub pid: Option<u32>,
    /// Title prefix identifying the host's main window (never tracked)
    pub main_window_title: Option<String>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            wm_class: Some("qupath".to_string()),
            pid: None,
            main_window_title: Some("QuPath".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    pub track_all_windows: bool,
    pub targeted_titles: Vec<String>,
    pub excluded_ids: Vec<String>,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            track_all_windows: true,
            targeted_titles: DEFAULT_TARGETED_TITLES.iter().map(|t| t.to_string()).collect(),
            excluded_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Serialized-size budget for the saved positions
    pub max_chars: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_chars: storage::DEFAULT_MAX_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: HostSettings,
    pub tracking: TrackingSettings,
    pub storage: StorageSettings,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: HostSettings::default(),
            tracking: TrackingSettings::default(),
            storage: StorageSettings::default(),
            log_level: config::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Command-line overrides for one `run`
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub wm_class: Option<String>,
    pub pid: Option<u32>,
    pub targeted: Vec<String>,
}

fn clean_list(items: &mut Vec<String>, what: &str) {
    let mut seen = BTreeSet::new();
    let before = items.len();
    let cleaned: Vec<String> = items
        .drain(..)
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .collect();
    if cleaned.len() != before {
        warn!(list = what, dropped = before - cleaned.len(), "Dropped blank or duplicate entries");
    }
    *items = cleaned;
}

impl Config {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::FILENAME);
        path
    }

    /// Load the config; a missing file is created with defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<Config>(&contents)
                .context(format!("Failed to parse config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Config::default();
                match cfg.save_to(path) {
                    Ok(()) => info!(path = %path.display(), "Generated default config file"),
                    Err(e) => warn!(path = %path.display(), error = ?e, "Failed to write default config"),
                }
                cfg
            }
            Err(e) => {
                return Err(e).context(format!("Failed to read config file {}", path.display()));
            }
        };
        cfg.validate_and_clamp();
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        fs::write(path, contents)
            .context(format!("Failed to write config file to {}", path.display()))?;
        Ok(())
    }

    /// Clamp numeric ranges and tidy the title/id lists
    pub fn validate_and_clamp(&mut self) {
        if self.storage.max_chars < storage::MIN_MAX_CHARS {
            warn!(max_chars = self.storage.max_chars, min = storage::MIN_MAX_CHARS, "max_chars below minimum, clamping");
            self.storage.max_chars = storage::MIN_MAX_CHARS;
        }
        if self.storage.max_chars > storage::FILE_STORE_MAX_VALUE_LEN {
            warn!(max_chars = self.storage.max_chars, max = storage::FILE_STORE_MAX_VALUE_LEN, "max_chars exceeds maximum, clamping");
            self.storage.max_chars = storage::FILE_STORE_MAX_VALUE_LEN;
        }

        clean_list(&mut self.tracking.targeted_titles, "targeted_titles");
        clean_list(&mut self.tracking.excluded_ids, "excluded_ids");

        for value in [&mut self.host.wm_class, &mut self.host.main_window_title] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }

        if self.host.wm_class.is_none() && self.host.pid.is_none() {
            warn!("No host wm_class or pid configured; windows of every client are candidates");
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(wm_class) = &overrides.wm_class {
            info!(wm_class = %wm_class, "Overriding host WM_CLASS");
            self.host.wm_class = Some(wm_class.clone());
        }
        if let Some(pid) = overrides.pid {
            info!(pid = pid, "Overriding host pid");
            self.host.pid = Some(pid);
        }
        if !overrides.targeted.is_empty() {
            self.tracking.track_all_windows = false;
            self.tracking.targeted_titles = overrides.targeted.clone();
        }
        self.validate_and_clamp();
    }

    pub fn tracking_policy(&self) -> TrackingPolicy {
        TrackingPolicy::new(
            self.tracking.track_all_windows,
            self.tracking.targeted_titles.iter().cloned(),
            self.tracking.excluded_ids.iter().cloned(),
        )
    }
}
