//! Per-window observation: geometry/visibility subscriptions and record capture

use anyhow::Result;
use tracing::{debug, trace};

use crate::geometry::ScreenLayout;
use crate::types::DialogRecord;
use crate::window_system::{
    GeometryProperty, SubscriptionId, Topic, WindowHandle, WindowInfo, WindowSystem,
};

/// Build a record from live window state
///
/// Screen index and scale come from the screen the window overlaps most.
pub fn record_from_window(id: &str, info: &WindowInfo, layout: &ScreenLayout) -> DialogRecord {
    let (screen_index, screen) = layout.screen_for_rect(&info.bounds);
    let title = info.usable_title().unwrap_or(id);

    let mut record = DialogRecord::new(
        id,
        title,
        info.bounds.x,
        info.bounds.y,
        info.bounds.width,
        info.bounds.height,
    );
    record.modality = info.modality;
    record.is_open = info.showing;
    record.screen_index = i32::try_from(screen_index).unwrap_or(0);
    record.scale_x = screen.scale_x;
    record.scale_y = screen.scale_y;
    record
}

/// Subscriptions and last known state of one tracked window
#[derive(Debug)]
pub struct WindowTracker {
    window: WindowHandle,
    id: String,
    subscriptions: Vec<SubscriptionId>,
    last: DialogRecord,
}

impl WindowTracker {
    /// Subscribe to x, y, width, height and showing for `window`
    pub fn attach(
        ws: &mut dyn WindowSystem,
        window: WindowHandle,
        initial: DialogRecord,
    ) -> Result<Self> {
        let topics = GeometryProperty::ALL
            .iter()
            .map(|property| Topic::Geometry(window, *property))
            .chain(std::iter::once(Topic::Showing(window)));

        let mut subscriptions = Vec::with_capacity(5);
        for topic in topics {
            match ws.subscribe(topic) {
                Ok(id) => subscriptions.push(id),
                Err(e) => {
                    for id in subscriptions {
                        ws.unsubscribe(id);
                    }
                    return Err(e);
                }
            }
        }

        debug!(window = %window, id = %initial.id, "Attached window tracker");
        Ok(Self {
            window,
            id: initial.id.clone(),
            subscriptions,
            last: initial,
        })
    }

    pub fn window(&self) -> WindowHandle {
        self.window
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Last captured record (the window may already be gone)
    #[cfg(test)]
    pub fn last(&self) -> &DialogRecord {
        &self.last
    }

    /// Re-read the window; falls back to the cached record if it no longer exists
    pub fn capture(&mut self, ws: &dyn WindowSystem, layout: &ScreenLayout) -> DialogRecord {
        if let Some(info) = ws.window_info(self.window) {
            self.last = record_from_window(&self.id, &info, layout);
        } else {
            trace!(window = %self.window, "Window gone, using cached record");
        }
        self.last.clone()
    }

    /// Record to publish after a move or resize. Not persisted.
    pub fn on_geometry_changed(
        &mut self,
        ws: &dyn WindowSystem,
        layout: &ScreenLayout,
    ) -> DialogRecord {
        self.capture(ws, layout)
    }

    /// Record to persist when the window hides
    pub fn on_hidden(&mut self, ws: &dyn WindowSystem, layout: &ScreenLayout) -> DialogRecord {
        let record = self.capture(ws, layout).with_open_status(false);
        self.last.is_open = false;
        record
    }

    pub fn on_shown(&mut self, ws: &dyn WindowSystem, layout: &ScreenLayout) -> DialogRecord {
        let record = self.capture(ws, layout).with_open_status(true);
        self.last.is_open = true;
        record
    }

    /// Release all subscriptions; calling it again does nothing
    pub fn detach(&mut self, ws: &mut dyn WindowSystem) {
        if self.subscriptions.is_empty() {
            return;
        }
        for id in self.subscriptions.drain(..) {
            ws.unsubscribe(id);
        }
        debug!(window = %self.window, id = %self.id, "Detached window tracker");
    }
}
