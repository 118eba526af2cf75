//! Restore-then-validate-then-correct decision for a newly tracked window

use crate::geometry::ScreenLayout;
use crate::types::DialogRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Apply the saved position; `size` only when the window is resizable and the saved size is valid
    Restore {
        x: f64,
        y: f64,
        size: Option<(f64, f64)>,
    },
    /// Saved position is unusable; center on the restore screen
    Center { x: f64, y: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreDecision {
    pub screen_index: usize,
    pub screen_name: String,
    pub position_valid: bool,
    pub scale_changed: bool,
    pub placement: Placement,
}

/// Decide where a window with a saved record goes, given the current screens
///
/// `window_size` is the window's current size and is only used to center a
/// window whose saved size is unusable.
pub fn decide(
    layout: &ScreenLayout,
    saved: &DialogRecord,
    window_size: (f64, f64),
    resizable: bool,
) -> RestoreDecision {
    let (screen_index, screen) = layout.select_restore_screen(saved);
    let position_valid = layout.is_on_screen(saved);
    let scale_changed =
        saved.has_valid_scale() && saved.has_scale_changed(screen.scale_x, screen.scale_y);

    let placement = if position_valid {
        let size = (resizable && saved.has_valid_size()).then_some((saved.width, saved.height));
        Placement::Restore {
            x: saved.x,
            y: saved.y,
            size,
        }
    } else {
        let (width, height) = if saved.has_valid_size() {
            (saved.width, saved.height)
        } else {
            window_size
        };
        let (x, y) = ScreenLayout::center_on(screen, width, height);
        Placement::Center { x, y }
    };

    RestoreDecision {
        screen_index,
        screen_name: screen.name.clone(),
        position_valid,
        scale_changed,
        placement,
    }
}
