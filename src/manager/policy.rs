//! Which windows get tracked

use std::collections::BTreeSet;

use crate::window_system::WindowKind;

/// Titles tracked even when "track all" is off
pub const DEFAULT_TARGETED_TITLES: &[&str] = &[
    "Brightness & Contrast",
    "Script editor",
    "Log",
    "Command list",
    "Measurement table",
    "Preferences",
    "Objects",
    "Annotations",
    "Detections",
    "Measurement maps",
    "Dialog Position Manager",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingPolicy {
    track_all: bool,
    targeted_titles: BTreeSet<String>,
    excluded_ids: BTreeSet<String>,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self::new(
            true,
            DEFAULT_TARGETED_TITLES.iter().map(|t| t.to_string()),
            std::iter::empty(),
        )
    }
}

impl TrackingPolicy {
    pub fn new(
        track_all: bool,
        targeted_titles: impl IntoIterator<Item = String>,
        excluded_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            track_all,
            targeted_titles: targeted_titles.into_iter().collect(),
            excluded_ids: excluded_ids.into_iter().collect(),
        }
    }

    /// `id` is the trimmed title, or a fallback id for untitled windows
    pub fn is_eligible(&self, kind: WindowKind, id: &str) -> bool {
        if kind != WindowKind::Dialog || self.excluded_ids.contains(id) {
            return false;
        }
        self.track_all || self.targeted_titles.contains(id)
    }

    pub fn track_all(&self) -> bool {
        self.track_all
    }

    pub fn targeted_titles(&self) -> impl Iterator<Item = &str> {
        self.targeted_titles.iter().map(String::as_str)
    }

    pub fn excluded_ids(&self) -> impl Iterator<Item = &str> {
        self.excluded_ids.iter().map(String::as_str)
    }

    /// Returns true when tracking widened (off -> on)
    pub fn set_track_all(&mut self, track_all: bool) -> bool {
        let widened = track_all && !self.track_all;
        self.track_all = track_all;
        widened
    }

    /// Returns true when the title was not targeted before
    pub fn add_targeted_title(&mut self, title: &str) -> bool {
        let title = title.trim();
        !title.is_empty() && self.targeted_titles.insert(title.to_string())
    }

    pub fn remove_targeted_title(&mut self, title: &str) -> bool {
        self.targeted_titles.remove(title.trim())
    }

    pub fn exclude(&mut self, id: &str) -> bool {
        self.excluded_ids.insert(id.to_string())
    }

    /// Returns true when the id was excluded before
    pub fn include(&mut self, id: &str) -> bool {
        self.excluded_ids.remove(id)
    }
}
