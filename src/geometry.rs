//! Screen topology math: visibility checks, restore-screen selection, centering
//!
//! Everything here is pure. A `ScreenLayout` is a snapshot of the monitors the
//! window system reported at one instant; callers rebuild it whenever they need
//! fresh topology.

use std::fmt::Write as _;

use crate::constants::{placement, synthetic_screen};
use crate::types::{DialogRecord, Rect, Screen};

/// Snapshot of connected screens. Never empty, always has a primary.
#[derive(Debug, Clone)]
pub struct ScreenLayout {
    screens: Vec<Screen>,
    primary: usize,
}

impl ScreenLayout {
    pub fn new(screens: Vec<Screen>) -> Self {
        let screens = if screens.is_empty() {
            vec![Self::synthetic_primary()]
        } else {
            screens
        };
        let primary = screens.iter().position(|s| s.primary).unwrap_or(0);
        Self { screens, primary }
    }

    fn synthetic_primary() -> Screen {
        Screen::new(
            synthetic_screen::NAME,
            Rect::new(0.0, 0.0, synthetic_screen::WIDTH, synthetic_screen::HEIGHT),
            1.0,
            true,
        )
    }

    pub fn primary(&self) -> &Screen {
        &self.screens[self.primary]
    }

    /// True if at least MIN_VISIBLE_PIXELS of the window overlap one screen on both axes
    pub fn is_sufficiently_visible(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        self.screens.iter().any(|screen| {
            let bounds = &screen.usable;
            let overlap_width = (x + width).min(bounds.max_x()) - x.max(bounds.x);
            let overlap_height = (y + height).min(bounds.max_y()) - y.max(bounds.y);
            overlap_width >= placement::MIN_VISIBLE_PIXELS
                && overlap_height >= placement::MIN_VISIBLE_PIXELS
        })
    }

    /// A record is on screen when it has a real position that is sufficiently visible
    pub fn is_on_screen(&self, record: &DialogRecord) -> bool {
        record.has_valid_position()
            && self.is_sufficiently_visible(record.x, record.y, record.width, record.height)
    }

    /// Pick the screen a saved record should be restored to. Total: falls back to primary.
    pub fn select_restore_screen(&self, record: &DialogRecord) -> (usize, &Screen) {
        let saved = record.bounds();

        if let Ok(index) = usize::try_from(record.screen_index)
            && let Some(screen) = self.screens.get(index)
            && (screen.usable.contains(record.x, record.y) || screen.usable.intersects(&saved))
        {
            return (index, screen);
        }

        if let Some(found) = self
            .screens
            .iter()
            .enumerate()
            .find(|(_, s)| s.usable.contains(record.x, record.y))
        {
            return found;
        }

        if let Some(found) = self
            .screens
            .iter()
            .enumerate()
            .find(|(_, s)| s.usable.intersects(&saved))
        {
            return found;
        }

        (self.primary, self.primary())
    }

    /// Top-left corner that centers a `width`x`height` rectangle on the screen's usable area
    pub fn center_on(screen: &Screen, width: f64, height: f64) -> (f64, f64) {
        let width = if width > 0.0 { width } else { placement::FALLBACK_WIDTH };
        let height = if height > 0.0 { height } else { placement::FALLBACK_HEIGHT };
        let bounds = &screen.usable;
        (
            bounds.x + (bounds.width - width) / 2.0,
            bounds.y + (bounds.height - height) / 2.0,
        )
    }

    /// Screen the rectangle overlaps most; index 0 with primary scale when it overlaps none
    pub fn screen_for_rect(&self, rect: &Rect) -> (usize, &Screen) {
        let best = self
            .screens
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s, s.usable.overlap_area(rect)))
            .filter(|(_, _, area)| *area > 0.0)
            .max_by(|a, b| a.2.total_cmp(&b.2));

        match best {
            Some((index, screen, _)) => (index, screen),
            None => (0, self.primary()),
        }
    }

    /// Human-readable screen configuration, one line per screen
    pub fn describe(&self) -> String {
        let mut out = format!("Detected {} screen(s):\n", self.screens.len());
        for (i, screen) in self.screens.iter().enumerate() {
            let b = &screen.usable;
            let _ = writeln!(
                out,
                "  Screen {}: {:.0}x{:.0} at ({:.0},{:.0}) scale={:.2}x{:.2} name={}{}",
                i,
                b.width,
                b.height,
                b.x,
                b.y,
                screen.scale_x,
                screen.scale_y,
                screen.name,
                if i == self.primary { " [PRIMARY]" } else { "" }
            );
        }
        out
    }
}
