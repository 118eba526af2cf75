//! The seam between the position manager and a concrete windowing backend
//!
//! The manager only ever talks to a `WindowSystem`. The X11 backend lives in
//! `crate::x11`; tests drive the manager through `fake::FakeWindowSystem`.

#[cfg(test)]
pub mod fake;

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;

use crate::types::{Modality, Rect, Screen};

/// Opaque backend window identifier (an X11 window id for the X11 backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Token returned by `subscribe`, handed back to `unsubscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryProperty {
    X,
    Y,
    Width,
    Height,
}

impl GeometryProperty {
    pub const ALL: [GeometryProperty; 4] = [
        GeometryProperty::X,
        GeometryProperty::Y,
        GeometryProperty::Width,
        GeometryProperty::Height,
    ];
}

/// Notification stream a caller can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Top-level windows appearing and disappearing
    WindowList,
    Geometry(WindowHandle, GeometryProperty),
    Showing(WindowHandle),
    Title(WindowHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// The host application's main window; never tracked
    Main,
    Dialog,
    /// Menus, tooltips and other transient popups; never tracked
    Popup,
}

impl WindowKind {
    pub fn name(&self) -> &'static str {
        match self {
            WindowKind::Main => "main",
            WindowKind::Dialog => "dialog",
            WindowKind::Popup => "popup",
        }
    }
}

/// Snapshot of a window's current state
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub title: Option<String>,
    pub kind: WindowKind,
    pub modality: Modality,
    pub resizable: bool,
    pub showing: bool,
    pub bounds: Rect,
}

impl WindowInfo {
    /// Trimmed title, if it has any non-whitespace content
    pub fn usable_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Added(WindowHandle),
    Removed(WindowHandle),
    TitleChanged {
        window: WindowHandle,
        title: Option<String>,
    },
    GeometryChanged {
        window: WindowHandle,
        property: GeometryProperty,
        value: f64,
    },
    VisibilityChanged {
        window: WindowHandle,
        showing: bool,
    },
}

impl WindowEvent {
    /// Subscription topic this event is delivered under
    pub fn topic(&self) -> Topic {
        match self {
            WindowEvent::Added(_) | WindowEvent::Removed(_) => Topic::WindowList,
            WindowEvent::TitleChanged { window, .. } => Topic::Title(*window),
            WindowEvent::GeometryChanged {
                window, property, ..
            } => Topic::Geometry(*window, *property),
            WindowEvent::VisibilityChanged { window, .. } => Topic::Showing(*window),
        }
    }
}

/// Live subscriptions of a backend
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    next: u64,
    topics: HashMap<SubscriptionId, Topic>,
}

impl SubscriptionTable {
    pub fn add(&mut self, topic: Topic) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.topics.insert(id, topic);
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        self.topics.remove(&id).is_some()
    }

    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.topics.values().any(|t| *t == topic)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    #[cfg(test)]
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.values()
    }

    /// Keep only events someone is subscribed to
    pub fn retain_subscribed(&self, events: Vec<WindowEvent>) -> Vec<WindowEvent> {
        events
            .into_iter()
            .filter(|event| self.is_subscribed(event.topic()))
            .collect()
    }
}

/// Everything the position manager needs from a windowing backend
///
/// Implementations deliver events only through `poll_events`, on the caller's
/// thread, and only for topics with a live subscription.
pub trait WindowSystem {
    fn screens(&self) -> Vec<Screen>;

    fn top_level_windows(&self) -> Vec<WindowHandle>;

    /// `None` once the window has been destroyed
    fn window_info(&self, window: WindowHandle) -> Option<WindowInfo>;

    fn subscribe(&mut self, topic: Topic) -> Result<SubscriptionId>;

    /// Unknown or already-released ids are ignored
    fn unsubscribe(&mut self, id: SubscriptionId);

    fn set_position(&mut self, window: WindowHandle, x: f64, y: f64) -> Result<()>;

    fn set_size(&mut self, window: WindowHandle, width: f64, height: f64) -> Result<()>;

    fn close(&mut self, window: WindowHandle) -> Result<()>;

    fn raise(&mut self, window: WindowHandle) -> Result<()>;

    fn focus(&mut self, window: WindowHandle) -> Result<()>;

    /// Non-blocking; returns whatever arrived since the last call
    fn poll_events(&mut self) -> Result<Vec<WindowEvent>>;
}
