//! Decoding of raw X11 window properties

use x11rb::protocol::xproto::Atom;

use crate::constants::x11::{BASE_DPI, MM_PER_INCH, SIZE_HINT_P_MAX_SIZE, SIZE_HINT_P_MIN_SIZE};
use crate::types::{Modality, Rect};
use crate::window_system::WindowKind;

/// Which client windows belong to the managed application
#[derive(Debug, Clone)]
pub struct HostFilter {
    pub wm_class: Option<String>,
    pub pid: Option<u32>,
    pub main_window_title: Option<String>,
    /// Our own windows are never managed
    pub own_pid: u32,
}

impl HostFilter {
    /// `wm_class` is the raw WM_CLASS value (`instance\0class\0`)
    ///
    /// Windows with neither a pid nor a class (window manager frames) never match.
    pub fn matches(&self, pid: Option<u32>, wm_class: &[u8]) -> bool {
        if pid.is_none() && wm_class.is_empty() {
            return false;
        }
        if pid.is_some() && pid == Some(self.own_pid) {
            return false;
        }
        if self.wm_class.is_none() && self.pid.is_none() {
            return true;
        }
        if let Some(wanted) = self.pid
            && pid == Some(wanted)
        {
            return true;
        }
        match &self.wm_class {
            Some(needle) => wm_class_contains(wm_class, needle),
            None => false,
        }
    }

    pub fn classify(&self, override_redirect: bool, popup_type: bool, title: Option<&str>) -> WindowKind {
        if override_redirect || popup_type {
            return WindowKind::Popup;
        }
        if let (Some(prefix), Some(title)) = (&self.main_window_title, title)
            && title.trim_start().starts_with(prefix.as_str())
        {
            return WindowKind::Main;
        }
        WindowKind::Dialog
    }
}

/// Split WM_CLASS into its instance and class strings
pub fn parse_wm_class(value: &[u8]) -> (String, String) {
    let mut parts = value
        .split(|b| *b == 0)
        .map(|part| String::from_utf8_lossy(part).into_owned());
    let instance = parts.next().unwrap_or_default();
    let class = parts.next().unwrap_or_default();
    (instance, class)
}

/// Case-insensitive substring match against either WM_CLASS string
pub fn wm_class_contains(value: &[u8], needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let (instance, class) = parse_wm_class(value);
    instance.to_lowercase().contains(&needle) || class.to_lowercase().contains(&needle)
}

/// WM_NORMAL_HINTS: fixed size when both min and max are set and equal
pub fn is_resizable(hints: &[u32]) -> bool {
    let Some(&flags) = hints.first() else {
        return true;
    };
    let has_min = flags & SIZE_HINT_P_MIN_SIZE != 0;
    let has_max = flags & SIZE_HINT_P_MAX_SIZE != 0;
    if !(has_min && has_max) || hints.len() < 9 {
        return true;
    }
    let (min_w, min_h, max_w, max_h) = (hints[5], hints[6], hints[7], hints[8]);
    !(min_w == max_w && min_h == max_h)
}

pub fn modality(state_modal: bool, transient_for: Option<u32>) -> Modality {
    match (state_modal, transient_for) {
        (false, _) => Modality::None,
        (true, Some(parent)) if parent != 0 => Modality::WindowModal,
        (true, _) => Modality::ApplicationModal,
    }
}

pub fn has_any(atoms: &[Atom], wanted: &[Atom]) -> bool {
    atoms.iter().any(|atom| wanted.contains(atom))
}

/// Output scale from physical width, rounded to a quarter step
pub fn scale_from_physical(width_px: u16, width_mm: u32) -> f64 {
    if width_mm == 0 || width_px == 0 {
        return 1.0;
    }
    let dpi = f64::from(width_px) / (f64::from(width_mm) / MM_PER_INCH);
    let scale = (dpi / BASE_DPI * 4.0).round() / 4.0;
    scale.max(1.0)
}

/// Monitor bounds minus panels, as far as `_NET_WORKAREA` tells
pub fn usable_bounds(bounds: Rect, workarea: Option<Rect>) -> Rect {
    workarea
        .and_then(|area| bounds.intersection(&area))
        .unwrap_or(bounds)
}

/// First `x, y, width, height` quadruple of `_NET_WORKAREA`
pub fn parse_workarea(values: &[u32]) -> Option<Rect> {
    match values {
        [x, y, w, h, ..] if *w > 0 && *h > 0 => Some(Rect::new(
            f64::from(*x as i32),
            f64::from(*y as i32),
            f64::from(*w),
            f64::from(*h),
        )),
        _ => None,
    }
}

/// Decoration sizes the window manager adds around a client
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameExtents {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// `_NET_FRAME_EXTENTS` is `left, right, top, bottom`
pub fn parse_frame_extents(values: &[u32]) -> Option<FrameExtents> {
    match values {
        [left, right, top, bottom, ..] => Some(FrameExtents {
            left: *left,
            right: *right,
            top: *top,
            bottom: *bottom,
        }),
        _ => None,
    }
}

/// Top-left of the frame around a client whose area starts at `(client_x, client_y)`
///
/// This is the point a NorthWest-gravity ConfigureWindow positions, so reading
/// and writing positions stay in one coordinate space.
pub fn frame_origin(client_x: i16, client_y: i16, extents: FrameExtents) -> (f64, f64) {
    (
        f64::from(client_x) - f64::from(extents.left),
        f64::from(client_y) - f64::from(extents.top),
    )
}
