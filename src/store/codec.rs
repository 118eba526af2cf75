//! Compact JSON encoding of the record map
//!
//! Stored layout is one JSON object keyed by window id:
//!
//! ```json
//! {"Log":{"x":100,"y":50,"w":600,"h":400},"Script editor":{"x":-1200,"y":80,"w":900,"h":700,"si":1,"sx":1.5,"sy":1.5}}
//! ```
//!
//! Coordinates are rounded to integers, the title is implied by the key, and
//! `m`/`si`/`sx`/`sy` are only written when they differ from NONE/0/1.0. The
//! decoder also accepts the verbose names (`width`, `height`, `modality`,
//! `screenIndex`, `scaleX`, `scaleY`) and an explicit `title`.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::records::RecordMap;
use crate::types::{DialogRecord, Modality};

#[derive(Serialize)]
struct CompactEntry {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    m: Option<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    si: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sy: Option<f64>,
}

impl From<&DialogRecord> for CompactEntry {
    fn from(record: &DialogRecord) -> Self {
        Self {
            x: round(record.x),
            y: round(record.y),
            w: round(record.width),
            h: round(record.height),
            m: (record.modality != Modality::None).then_some(record.modality),
            si: (record.screen_index != 0).then_some(record.screen_index),
            sx: (record.scale_x != 1.0).then_some(record.scale_x),
            sy: (record.scale_y != 1.0).then_some(record.scale_y),
        }
    }
}

/// Accepts integers or floats; serde_json yields `f64` for both
///
/// Verbose names are separate fields so an entry carrying both spellings
/// still decodes; the compact key wins.
#[derive(Deserialize)]
struct StoredEntry {
    x: Option<f64>,
    y: Option<f64>,
    w: Option<f64>,
    h: Option<f64>,
    m: Option<String>,
    si: Option<f64>,
    sx: Option<f64>,
    sy: Option<f64>,
    title: Option<String>,
    width: Option<f64>,
    height: Option<f64>,
    modality: Option<String>,
    #[serde(rename = "screenIndex")]
    screen_index: Option<f64>,
    #[serde(rename = "scaleX")]
    scale_x: Option<f64>,
    #[serde(rename = "scaleY")]
    scale_y: Option<f64>,
}

fn round(value: f64) -> i64 {
    // `as` saturates and maps NaN to 0
    value.round() as i64
}

fn positive_or_default(scale: Option<f64>) -> f64 {
    scale.filter(|s| s.is_finite() && *s > 0.0).unwrap_or(1.0)
}

/// Encode every entry of `records` in map order
pub fn encode(records: &RecordMap) -> Result<String> {
    let mut root = serde_json::Map::new();
    for (id, record) in records.iter() {
        let entry = serde_json::to_value(CompactEntry::from(record))
            .context(format!("Failed to encode dialog record '{}'", id))?;
        root.insert(id.clone(), entry);
    }
    serde_json::to_string(&root).context("Failed to serialize dialog records")
}

/// Decode one stored entry; `id` is the map key it was stored under
pub fn decode_entry(id: &str, value: serde_json::Value) -> Result<DialogRecord> {
    if !value.is_object() {
        bail!("entry is not a JSON object");
    }
    let entry: StoredEntry = serde_json::from_value(value).context("malformed entry")?;

    let mut record = DialogRecord::new(
        id,
        entry.title.unwrap_or_else(|| id.to_string()),
        entry.x.map(f64::round).unwrap_or(0.0),
        entry.y.map(f64::round).unwrap_or(0.0),
        entry.w.or(entry.width).map(f64::round).unwrap_or(0.0),
        entry.h.or(entry.height).map(f64::round).unwrap_or(0.0),
    );
    record.modality = entry
        .m
        .or(entry.modality)
        .as_deref()
        .map(Modality::from_name)
        .unwrap_or_default();
    record.screen_index = entry.si.or(entry.screen_index).map(|si| si as i32).unwrap_or(0);
    record.scale_x = positive_or_default(entry.sx.or(entry.scale_x));
    record.scale_y = positive_or_default(entry.sy.or(entry.scale_y));
    Ok(record)
}

/// Decode a whole blob, skipping entries that fail to parse
///
/// A missing, blank or non-object blob yields an empty map.
pub fn decode(blob: &str) -> RecordMap {
    let mut records = RecordMap::new();
    let blob = blob.trim();
    if blob.is_empty() {
        return records;
    }

    let root: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(blob) {
        Ok(root) => root,
        Err(e) => {
            warn!(error = %e, "Stored dialog positions are unreadable, starting empty");
            return records;
        }
    };

    for (id, value) in root {
        match decode_entry(&id, value) {
            Ok(record) => {
                records.insert(id, record);
            }
            Err(e) => debug!(id = %id, error = ?e, "Skipping invalid dialog position entry"),
        }
    }
    records
}
