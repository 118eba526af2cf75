//! Core data types shared by the geometry model, the record store and the manager

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{identity, placement};

/// Axis-aligned rectangle in the window system's virtual coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Inclusive on all four edges
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px.is_finite()
            && py.is_finite()
            && px >= self.x
            && py >= self.y
            && px <= self.max_x()
            && py <= self.max_y()
    }

    /// Overlapping region, if the two rectangles share a positive area
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.max_x().min(other.max_x());
        let bottom = self.max_y().min(other.max_y());
        if right > left && bottom > top {
            Some(Rect::new(left, top, right - left, bottom - top))
        } else {
            None
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn overlap_area(&self, other: &Rect) -> f64 {
        self.intersection(other)
            .map(|r| r.width * r.height)
            .unwrap_or(0.0)
    }
}

/// A connected monitor as reported by the window system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub name: String,
    /// Full monitor rectangle
    pub bounds: Rect,
    /// Bounds minus panels/docks; all placement math uses these
    pub usable: Rect,
    pub scale_x: f64,
    pub scale_y: f64,
    pub primary: bool,
}

impl Screen {
    pub fn new(name: impl Into<String>, bounds: Rect, scale: f64, primary: bool) -> Self {
        Self {
            name: name.into(),
            bounds,
            usable: bounds,
            scale_x: scale,
            scale_y: scale,
            primary,
        }
    }

    pub fn with_usable(mut self, usable: Rect) -> Self {
        self.usable = usable;
        self
    }
}

/// Window modality, copied from the window at capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    #[default]
    None,
    WindowModal,
    ApplicationModal,
}

impl Modality {
    /// Parse the persisted name; unknown names map to `None`
    pub fn from_name(name: &str) -> Self {
        match name {
            "WINDOW_MODAL" => Modality::WindowModal,
            "APPLICATION_MODAL" => Modality::ApplicationModal,
            _ => Modality::None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Modality::None => "NONE",
            Modality::WindowModal => "WINDOW_MODAL",
            Modality::ApplicationModal => "APPLICATION_MODAL",
        }
    }
}

/// Saved (or live) state of one dialog window
///
/// Coordinates are in virtual units. The scale factors recorded at capture time
/// only serve to detect display changes between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogRecord {
    pub id: String,
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub modality: Modality,
    pub is_open: bool,
    pub screen_index: i32,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl DialogRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            x,
            y,
            width,
            height,
            modality: Modality::None,
            is_open: false,
            screen_index: 0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn has_valid_position(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.x >= placement::MIN_COORDINATE
            && self.y >= placement::MIN_COORDINATE
    }

    pub fn has_valid_size(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn has_valid_scale(&self) -> bool {
        self.scale_x.is_finite() && self.scale_y.is_finite() && self.scale_x > 0.0 && self.scale_y > 0.0
    }

    pub fn has_scale_changed(&self, current_x: f64, current_y: f64) -> bool {
        (self.scale_x - current_x).abs() > placement::SCALE_CHANGE_TOLERANCE
            || (self.scale_y - current_y).abs() > placement::SCALE_CHANGE_TOLERANCE
    }

    pub fn is_modal(&self) -> bool {
        self.modality != Modality::None
    }

    pub fn is_fallback(&self) -> bool {
        is_fallback_id(&self.id)
    }

    pub fn with_open_status(mut self, open: bool) -> Self {
        self.is_open = open;
        self
    }
}

impl fmt::Display for DialogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at ({:.0}, {:.0}) size {:.0}x{:.0} scale={:.2}x{:.2}",
            self.id, self.x, self.y, self.width, self.height, self.scale_x, self.scale_y,
        )?;
        if self.is_modal() {
            write!(f, " {}", self.modality.name())?;
        }
        if self.is_open {
            write!(f, " OPEN")?;
        }
        Ok(())
    }
}

/// Fallback ids are process-local and must never reach the durable store
pub fn is_fallback_id(id: &str) -> bool {
    id.starts_with(identity::FALLBACK_ID_PREFIX)
}
