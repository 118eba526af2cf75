//! Position manager: decides which windows to track, restores their saved
//! placement and keeps the record list the management surface displays
//!
//! All state here is owned by one event thread. Window events arrive through
//! `pump`; work that must wait until the current cycle settles is queued and
//! run by `run_deferred`.

pub mod pending;
pub mod policy;
pub mod restore;

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, trace, warn};

use crate::geometry::ScreenLayout;
use crate::store::RecordStore;
use crate::tracker::{WindowTracker, record_from_window};
use crate::types::{DialogRecord, is_fallback_id};
use crate::window_system::{
    SubscriptionId, Topic, WindowEvent, WindowHandle, WindowInfo, WindowKind, WindowSystem,
};

use pending::{PendingState, PendingWindow, fallback_id};
use restore::Placement;

pub use policy::{DEFAULT_TARGETED_TITLES, TrackingPolicy};

/// Work posted back onto the event thread
#[derive(Debug, Clone, PartialEq)]
enum Deferred {
    /// Apply a restore placement again once the window has finished showing
    Reapply {
        window: WindowHandle,
        id: String,
        placement: Placement,
    },
}

pub struct PositionManager {
    ws: Box<dyn WindowSystem>,
    store: RecordStore,
    policy: TrackingPolicy,
    window_list: Option<SubscriptionId>,
    trackers: BTreeMap<WindowHandle, WindowTracker>,
    pending: HashMap<WindowHandle, PendingWindow>,
    records: Vec<DialogRecord>,
    generation: u64,
    deferred: VecDeque<Deferred>,
}

impl PositionManager {
    /// Load remembered records (all closed) and drop stale fallback entries
    pub fn new(ws: Box<dyn WindowSystem>, mut store: RecordStore, policy: TrackingPolicy) -> Self {
        store.cleanup_fallback_entries();
        let records: Vec<DialogRecord> = store
            .load_all()
            .into_iter()
            .map(|(_, record)| record.with_open_status(false))
            .collect();
        debug!(count = records.len(), "Loaded saved dialog records");

        Self {
            ws,
            store,
            policy,
            window_list: None,
            trackers: BTreeMap::new(),
            pending: HashMap::new(),
            records,
            generation: 0,
            deferred: VecDeque::new(),
        }
    }

    /// Start listening for windows and adopt the ones already open
    pub fn initialize(&mut self) -> Result<()> {
        if self.window_list.is_none() {
            let id = self
                .ws
                .subscribe(Topic::WindowList)
                .context("Failed to subscribe to window list changes")?;
            self.window_list = Some(id);
        }

        info!("Screen configuration at startup:\n{}", self.screen_diagnostics());

        for window in self.ws.top_level_windows() {
            self.on_window_added(window);
        }

        info!(tracked = self.trackers.len(), pending = self.pending.len(), "Position manager initialized");
        Ok(())
    }

    /// Detach every tracker and persist each tracked window as closed
    pub fn shutdown(&mut self) {
        if let Some(id) = self.window_list.take() {
            self.ws.unsubscribe(id);
        }
        for (_, pending) in self.pending.drain() {
            pending.release(self.ws.as_mut());
        }
        self.deferred.clear();

        let windows: Vec<WindowHandle> = self.trackers.keys().copied().collect();
        let count = windows.len();
        for window in windows {
            self.stop_tracking(window);
        }
        info!(persisted = count, "Position manager shut down");
    }

    fn layout(&self) -> ScreenLayout {
        ScreenLayout::new(self.ws.screens())
    }

    /// Poll the window system and handle everything it reported
    pub fn pump(&mut self) -> usize {
        match self.ws.poll_events() {
            Ok(events) => {
                let count = events.len();
                for event in events {
                    self.handle_event(event);
                }
                count
            }
            Err(e) => {
                warn!(error = ?e, "Failed to poll window events");
                0
            }
        }
    }

    /// Run everything queued so far, in order
    pub fn run_deferred(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.deferred.pop_front() {
            ran += 1;
            match task {
                Deferred::Reapply {
                    window,
                    id,
                    placement,
                } => {
                    if self.trackers.contains_key(&window) {
                        debug!(id = %id, "Re-applying position after show");
                        self.apply(window, &id, placement);
                    }
                }
            }
        }
        ran
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn handle_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Added(window) => self.on_window_added(window),
            WindowEvent::Removed(window) => self.on_window_removed(window),
            WindowEvent::TitleChanged { window, title } => {
                self.on_title_changed(window, title.as_deref())
            }
            WindowEvent::GeometryChanged { window, .. } => {
                let layout = self.layout();
                if let Some(tracker) = self.trackers.get_mut(&window) {
                    let record = tracker.on_geometry_changed(self.ws.as_ref(), &layout);
                    self.publish(record);
                }
            }
            WindowEvent::VisibilityChanged { window, showing } => {
                if self.pending.contains_key(&window) {
                    self.on_pending_visibility(window, showing);
                } else {
                    self.on_tracked_visibility(window, showing);
                }
            }
        }
    }

    fn on_window_added(&mut self, window: WindowHandle) {
        if self.trackers.contains_key(&window) || self.pending.contains_key(&window) {
            trace!(window = %window, "Window already known");
            return;
        }
        let Some(info) = self.ws.window_info(window) else {
            return;
        };
        if info.kind != WindowKind::Dialog {
            trace!(window = %window, kind = info.kind.name(), "Ignoring non-dialog window");
            return;
        }

        debug!(window = %window, title = ?info.title, showing = info.showing, "Window added");
        match info.usable_title() {
            Some(title) => {
                let id = title.to_string();
                if self.policy.is_eligible(info.kind, &id) {
                    info!(id = %id, "Tracking window");
                    self.begin_tracking(window, id, &info);
                } else {
                    debug!(id = %id, "Window not tracked (excluded or not targeted)");
                }
            }
            None if info.showing => self.track_untitled(window, &info),
            None => self.await_title(window),
        }
    }

    /// A window shown without a usable title gets a process-local id
    fn track_untitled(&mut self, window: WindowHandle, info: &WindowInfo) {
        let id = fallback_id(info.kind, window);
        if self.policy.is_eligible(info.kind, &id) {
            info!(id = %id, "Tracking window shown without a title");
            self.begin_tracking(window, id, info);
        } else {
            debug!(id = %id, "Untitled window not tracked");
        }
    }

    fn await_title(&mut self, window: WindowHandle) {
        let mut subscriptions = Vec::with_capacity(2);
        for topic in [Topic::Title(window), Topic::Showing(window)] {
            match self.ws.subscribe(topic) {
                Ok(id) => subscriptions.push(id),
                Err(e) => {
                    warn!(window = %window, error = ?e, "Failed to watch untitled window");
                    for id in subscriptions {
                        self.ws.unsubscribe(id);
                    }
                    return;
                }
            }
        }
        debug!(window = %window, "Window has no title yet, waiting for one");
        self.pending.insert(
            window,
            PendingWindow::new(window, PendingState::AwaitingTitle, subscriptions),
        );
    }

    fn on_title_changed(&mut self, window: WindowHandle, title: Option<&str>) {
        let awaiting = self
            .pending
            .get(&window)
            .is_some_and(|pending| pending.state == PendingState::AwaitingTitle);
        let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
            return;
        };
        if !awaiting {
            return;
        }

        if let Some(pending) = self.pending.remove(&window) {
            pending.release(self.ws.as_mut());
        }
        let Some(info) = self.ws.window_info(window) else {
            return;
        };

        let id = title.to_string();
        debug!(window = %window, id = %id, "Window title set");
        if self.policy.is_eligible(info.kind, &id) {
            info!(id = %id, "Now tracking window");
            self.begin_tracking(window, id, &info);
        } else {
            debug!(id = %id, "Window not tracked (excluded or not targeted)");
        }
    }

    fn on_pending_visibility(&mut self, window: WindowHandle, showing: bool) {
        if !showing {
            return;
        }
        let Some(pending) = self.pending.remove(&window) else {
            return;
        };
        let state = pending.state.clone();
        pending.release(self.ws.as_mut());

        match state {
            PendingState::AwaitingTitle => {
                let Some(info) = self.ws.window_info(window) else {
                    return;
                };
                match info.usable_title() {
                    Some(title) if self.policy.is_eligible(info.kind, title) => {
                        let id = title.to_string();
                        info!(id = %id, "Tracking window");
                        self.begin_tracking(window, id, &info);
                    }
                    Some(title) => debug!(id = %title, "Window not tracked (excluded or not targeted)"),
                    None => self.track_untitled(window, &info),
                }
            }
            PendingState::AwaitingShow { id, placement } => {
                if let Some(placement) = placement {
                    self.deferred.push_back(Deferred::Reapply {
                        window,
                        id: id.clone(),
                        placement,
                    });
                }
                self.start_tracker(window, id);
            }
        }
    }

    fn on_tracked_visibility(&mut self, window: WindowHandle, showing: bool) {
        let layout = self.layout();
        let Some(tracker) = self.trackers.get_mut(&window) else {
            return;
        };
        if showing {
            let record = tracker.on_shown(self.ws.as_ref(), &layout);
            self.publish(record);
        } else {
            let record = tracker.on_hidden(self.ws.as_ref(), &layout);
            debug!(id = %record.id, "Window hidden, saving state");
            self.store.save(&record);
            self.publish(record);
        }
    }

    fn on_window_removed(&mut self, window: WindowHandle) {
        if let Some(pending) = self.pending.remove(&window) {
            pending.release(self.ws.as_mut());
            return;
        }
        if let Some(id) = self.stop_tracking(window) {
            debug!(id = %id, "Window removed and state saved");
        }
    }

    /// Detach the tracker for `window`, persist its last state as closed and
    /// forget any queued work for it
    fn stop_tracking(&mut self, window: WindowHandle) -> Option<String> {
        let mut tracker = self.trackers.remove(&window)?;
        tracker.detach(self.ws.as_mut());
        self.drop_deferred(window);

        let layout = self.layout();
        let record = tracker.capture(self.ws.as_ref(), &layout).with_open_status(false);
        self.store.save(&record);
        let id = record.id.clone();
        if is_fallback_id(&id) {
            // Nothing can ever reopen under this id
            self.records.retain(|r| r.id != id);
            self.generation += 1;
        } else {
            self.publish(record);
        }
        Some(id)
    }

    fn drop_deferred(&mut self, window: WindowHandle) {
        self.deferred.retain(|task| match task {
            Deferred::Reapply { window: w, .. } => *w != window,
        });
    }

    /// Look up the saved record, place the window and start tracking it
    fn begin_tracking(&mut self, window: WindowHandle, id: String, info: &WindowInfo) {
        let saved = if is_fallback_id(&id) {
            None
        } else {
            self.store.load_all().remove(&id)
        };

        let placement = match &saved {
            Some(saved) => {
                info!(id = %id, x = saved.x, y = saved.y, "Found saved position");
                let layout = self.layout();
                let decision = restore::decide(
                    &layout,
                    saved,
                    (info.bounds.width, info.bounds.height),
                    info.resizable,
                );
                if decision.scale_changed {
                    debug!(
                        id = %id,
                        saved_x = saved.scale_x,
                        saved_y = saved.scale_y,
                        screen = %decision.screen_name,
                        "Scale factor changed since the position was saved"
                    );
                }
                match decision.placement {
                    Placement::Restore { .. } if decision.scale_changed => {
                        info!(id = %id, "Restoring with scale change (position still valid)")
                    }
                    Placement::Restore { .. } => debug!(id = %id, "Restoring saved position"),
                    Placement::Center { .. } => info!(
                        id = %id,
                        screen = %decision.screen_name,
                        "Saved position is invalid or off-screen, centering"
                    ),
                }
                Some(decision.placement)
            }
            None => {
                debug!(id = %id, "No saved position");
                None
            }
        };

        if let Some(placement) = placement {
            self.apply(window, &id, placement);
        }

        if info.showing {
            self.start_tracker(window, id);
            return;
        }

        match self.ws.subscribe(Topic::Showing(window)) {
            Ok(subscription) => {
                debug!(id = %id, "Waiting for window to show");
                self.pending.insert(
                    window,
                    PendingWindow::new(
                        window,
                        PendingState::AwaitingShow { id, placement },
                        vec![subscription],
                    ),
                );
            }
            Err(e) => {
                warn!(id = %id, error = ?e, "Failed to watch window visibility, tracking now");
                self.start_tracker(window, id);
            }
        }
    }

    fn start_tracker(&mut self, window: WindowHandle, id: String) {
        if self.trackers.contains_key(&window) {
            return;
        }
        let Some(info) = self.ws.window_info(window) else {
            debug!(id = %id, "Window vanished before tracking started");
            return;
        };
        let layout = self.layout();
        let record = record_from_window(&id, &info, &layout).with_open_status(true);

        match WindowTracker::attach(self.ws.as_mut(), window, record.clone()) {
            Ok(tracker) => {
                self.trackers.insert(window, tracker);
                self.publish(record);
            }
            Err(e) => warn!(id = %id, error = ?e, "Failed to attach window tracker"),
        }
    }

    fn apply(&mut self, window: WindowHandle, id: &str, placement: Placement) {
        let result = match placement {
            Placement::Restore { x, y, size } => {
                self.ws.set_position(window, x, y).and_then(|()| match size {
                    Some((width, height)) => self.ws.set_size(window, width, height),
                    None => Ok(()),
                })
            }
            Placement::Center { x, y } => self.ws.set_position(window, x, y),
        };
        if let Err(e) = result {
            warn!(id = %id, error = ?e, "Failed to apply window placement");
        }
    }

    fn publish(&mut self, record: DialogRecord) {
        self.records.retain(|r| r.id != record.id);
        self.records.push(record);
        self.generation += 1;
    }

    fn find_tracked(&self, id: &str) -> Option<WindowHandle> {
        self.trackers
            .values()
            .find(|tracker| tracker.id() == id)
            .map(WindowTracker::window)
    }

    fn find_showing(&self, id: &str) -> Option<WindowHandle> {
        self.find_tracked(id)
            .filter(|window| self.ws.window_info(*window).is_some_and(|info| info.showing))
    }

    fn center_window(&mut self, window: WindowHandle, layout: &ScreenLayout) -> bool {
        let Some(info) = self.ws.window_info(window) else {
            return false;
        };
        let (x, y) = ScreenLayout::center_on(layout.primary(), info.bounds.width, info.bounds.height);
        if let Err(e) = self.ws.set_position(window, x, y) {
            warn!(window = %window, error = ?e, "Failed to center window");
            return false;
        }
        if let Some(tracker) = self.trackers.get_mut(&window) {
            let record = tracker.capture(self.ws.as_ref(), layout);
            self.publish(record);
        }
        true
    }

    /// Center a tracked window on the primary screen
    pub fn center(&mut self, id: &str) -> bool {
        let Some(window) = self.find_tracked(id) else {
            warn!(id = %id, "Cannot center dialog, not currently open");
            return false;
        };
        let layout = self.layout();
        let centered = self.center_window(window, &layout);
        if centered {
            info!(id = %id, "Centered dialog");
        }
        centered
    }

    pub fn bring_to_front(&mut self, id: &str) -> bool {
        let Some(window) = self.find_showing(id) else {
            return false;
        };
        if let Err(e) = self.ws.raise(window).and_then(|()| self.ws.focus(window)) {
            warn!(id = %id, error = ?e, "Failed to bring dialog to front");
        }
        true
    }

    /// Ask the window to close; state is saved when the hide/remove events arrive
    pub fn close(&mut self, id: &str) -> bool {
        let Some(window) = self.find_showing(id) else {
            return false;
        };
        match self.ws.close(window) {
            Ok(()) => info!(id = %id, "Closed dialog"),
            Err(e) => warn!(id = %id, error = ?e, "Failed to close dialog"),
        }
        true
    }

    /// Forget the saved position; an open window keeps its current place
    ///
    /// Returns whether a durable record existed.
    pub fn reset(&mut self, id: &str) -> bool {
        let existed = self.store.remove(id);
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() != before {
            self.generation += 1;
        }
        info!(id = %id, "Reset dialog position to default");
        existed
    }

    /// Center every open tracked window that is not sufficiently visible
    pub fn recover_off_screen(&mut self) -> usize {
        let layout = self.layout();
        let off_screen: Vec<WindowHandle> = self
            .trackers
            .keys()
            .copied()
            .filter(|window| {
                self.ws.window_info(*window).is_some_and(|info| {
                    info.showing
                        && !layout.is_sufficiently_visible(
                            info.bounds.x,
                            info.bounds.y,
                            info.bounds.width,
                            info.bounds.height,
                        )
                })
            })
            .collect();

        let mut recovered = 0;
        for window in off_screen {
            if self.center_window(window, &layout) {
                recovered += 1;
            }
        }
        info!(recovered = recovered, "Recovered off-screen dialogs");
        recovered
    }

    /// Wipe the durable store; open windows stay listed
    pub fn clear_all(&mut self) {
        self.store.clear_all();
        self.records.retain(|r| r.is_open);
        self.generation += 1;
    }

    pub fn is_on_screen(&self, record: &DialogRecord) -> bool {
        self.layout().is_on_screen(record)
    }

    /// Open records plus remembered-closed ones, in publish order
    pub fn records(&self) -> &[DialogRecord] {
        &self.records
    }

    /// Bumped on every change to `records()`
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn screen_diagnostics(&self) -> String {
        self.layout().describe()
    }

    pub fn policy(&self) -> &TrackingPolicy {
        &self.policy
    }

    pub fn tracked_count(&self) -> usize {
        self.trackers.len()
    }

    pub fn storage_budget(&self) -> usize {
        self.store.budget()
    }

    pub fn set_track_all_windows(&mut self, track_all: bool) {
        info!(track_all = track_all, "Track all windows changed");
        if self.policy.set_track_all(track_all) {
            self.reevaluate();
        }
    }

    pub fn add_targeted_title(&mut self, title: &str) {
        if self.policy.add_targeted_title(title) {
            debug!(title = %title.trim(), "Added targeted title");
            self.reevaluate();
        }
    }

    pub fn remove_targeted_title(&mut self, title: &str) {
        if self.policy.remove_targeted_title(title) {
            debug!(title = %title.trim(), "Removed targeted title");
        }
    }

    /// Stop tracking `id` now and in the future
    ///
    /// An open window is saved and listed as closed, exactly as if it had
    /// been removed; the saved record is kept.
    pub fn exclude(&mut self, id: &str) {
        self.policy.exclude(id);
        let tracked: Vec<WindowHandle> = self
            .trackers
            .iter()
            .filter(|(_, tracker)| tracker.id() == id)
            .map(|(window, _)| *window)
            .collect();
        for window in tracked {
            self.stop_tracking(window);
        }

        let waiting: Vec<WindowHandle> = self
            .pending
            .iter()
            .filter(|(_, pending)| {
                matches!(&pending.state, PendingState::AwaitingShow { id: pending_id, .. } if pending_id == id)
            })
            .map(|(window, _)| *window)
            .collect();
        for window in waiting {
            if let Some(pending) = self.pending.remove(&window) {
                pending.release(self.ws.as_mut());
            }
            self.drop_deferred(window);
        }
        info!(id = %id, "Excluded window from tracking");
    }

    pub fn include(&mut self, id: &str) {
        if self.policy.include(id) {
            info!(id = %id, "Window no longer excluded");
            self.reevaluate();
        }
    }

    /// Adopt already-open windows that became eligible
    fn reevaluate(&mut self) {
        for window in self.ws.top_level_windows() {
            if !self.trackers.contains_key(&window) && !self.pending.contains_key(&window) {
                self.on_window_added(window);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::storage;
    use crate::store::{MemoryPreferenceStore, PreferenceStore};
    use crate::types::{Rect, Screen};
    use crate::window_system::fake::{Command, FakeWindowSystem};

    const LOG: WindowHandle = WindowHandle(1);
    const OBJECTS: WindowHandle = WindowHandle(2);

    fn hd() -> Vec<Screen> {
        vec![Screen::new("HD", Rect::new(0.0, 0.0, 1920.0, 1080.0), 1.0, true)]
    }

    struct Harness {
        fake: FakeWindowSystem,
        prefs: MemoryPreferenceStore,
        manager: PositionManager,
    }

    impl Harness {
        fn new(screens: Vec<Screen>, stored: Option<&str>, policy: TrackingPolicy) -> Self {
            let fake = FakeWindowSystem::new(screens);
            let prefs = MemoryPreferenceStore::default();
            if let Some(blob) = stored {
                prefs.clone().set(storage::POSITIONS_KEY, blob).unwrap();
            }
            let store = RecordStore::new(Box::new(prefs.clone()), storage::DEFAULT_MAX_CHARS);
            let mut manager = PositionManager::new(Box::new(fake.clone()), store, policy);
            manager.initialize().unwrap();
            Self {
                fake,
                prefs,
                manager,
            }
        }

        fn stored(&self) -> crate::store::RecordMap {
            crate::store::codec::decode(&self.prefs.raw(storage::POSITIONS_KEY).unwrap_or_default())
        }

        fn settle(&mut self) {
            while self.manager.pump() > 0 || self.manager.run_deferred() > 0 {}
        }

        fn record(&self, id: &str) -> Option<&DialogRecord> {
            self.manager.records().iter().find(|r| r.id == id)
        }
    }

    fn shown(title: Option<&str>, bounds: Rect) -> WindowInfo {
        let mut info = FakeWindowSystem::dialog(title, bounds);
        info.showing = true;
        info
    }

    const HOST_DEFAULT: Rect = Rect::new(660.0, 340.0, 600.0, 400.0);

    #[test]
    fn test_placement_applied_before_show_and_again_after() {
        let mut h = Harness::new(
            hd(),
            Some(r#"{"Log":{"x":300,"y":200,"w":640,"h":480}}"#),
            TrackingPolicy::default(),
        );

        h.fake.open(LOG, FakeWindowSystem::dialog(Some("Log"), HOST_DEFAULT));
        h.manager.pump();
        assert_eq!(
            h.fake.commands(),
            vec![
                Command::SetPosition(LOG, 300.0, 200.0),
                Command::SetSize(LOG, 640.0, 480.0)
            ]
        );
        assert_eq!(h.manager.tracked_count(), 0);

        // The host re-centers the dialog as it shows
        h.fake.clear_commands();
        h.fake.set_showing(LOG, true);
        h.fake.move_window(LOG, Rect::new(640.0, 300.0, 640.0, 480.0));
        h.manager.pump();
        assert_eq!(h.manager.tracked_count(), 1);
        assert!(h.fake.commands().is_empty());

        assert_eq!(h.manager.run_deferred(), 1);
        assert_eq!(
            h.fake.commands(),
            vec![
                Command::SetPosition(LOG, 300.0, 200.0),
                Command::SetSize(LOG, 640.0, 480.0)
            ]
        );
        h.settle();
        let record = h.record("Log").unwrap();
        assert!(record.is_open);
        assert_eq!((record.x, record.y), (300.0, 200.0));
    }

    #[test]
    fn test_already_showing_window_is_restored_immediately() {
        let fake_info = shown(Some("Log"), HOST_DEFAULT);
        let fake = FakeWindowSystem::new(hd());
        fake.preexisting(LOG, fake_info);

        let prefs = MemoryPreferenceStore::default();
        prefs
            .clone()
            .set(storage::POSITIONS_KEY, r#"{"Log":{"x":10,"y":20,"w":600,"h":400}}"#)
            .unwrap();
        let store = RecordStore::new(Box::new(prefs.clone()), storage::DEFAULT_MAX_CHARS);
        let mut manager = PositionManager::new(Box::new(fake.clone()), store, TrackingPolicy::default());
        manager.initialize().unwrap();

        assert_eq!(fake.commands()[0], Command::SetPosition(LOG, 10.0, 20.0));
        assert_eq!(fake.subscriptions_for(LOG), 5);
        assert!(manager.records().iter().any(|r| r.id == "Log" && r.is_open));
    }

    #[test]
    fn test_no_saved_record_keeps_host_placement() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, FakeWindowSystem::dialog(Some("Log"), HOST_DEFAULT));
        h.fake.set_showing(LOG, true);
        h.settle();

        assert!(h.fake.commands().is_empty());
        assert_eq!(h.manager.tracked_count(), 1);
    }

    #[test]
    fn test_disconnected_monitor_position_is_centered() {
        let small = vec![Screen::new("laptop", Rect::new(0.0, 0.0, 800.0, 600.0), 1.0, true)];
        let mut h = Harness::new(
            small,
            Some(r#"{"Log":{"x":2100,"y":50,"w":600,"h":400,"si":1}}"#),
            TrackingPolicy::default(),
        );
        h.fake.open(LOG, FakeWindowSystem::dialog(Some("Log"), Rect::new(0.0, 0.0, 600.0, 400.0)));
        h.fake.set_showing(LOG, true);
        h.settle();

        let info = h.fake.info(LOG).unwrap();
        assert_eq!((info.bounds.x, info.bounds.y), (100.0, 100.0));
        assert!(!h.fake.commands().iter().any(|c| *c == Command::SetPosition(LOG, 2100.0, 50.0)));
    }

    #[test]
    fn test_sufficiently_visible_position_is_kept_on_small_screen() {
        let small = vec![Screen::new("laptop", Rect::new(0.0, 0.0, 800.0, 600.0), 1.0, true)];
        let mut h = Harness::new(
            small,
            Some(r#"{"Log":{"x":100,"y":50,"w":600,"h":400}}"#),
            TrackingPolicy::default(),
        );
        h.fake.open(LOG, FakeWindowSystem::dialog(Some("Log"), Rect::new(0.0, 0.0, 600.0, 400.0)));
        h.settle();

        assert_eq!(h.fake.commands()[0], Command::SetPosition(LOG, 100.0, 50.0));
    }

    #[test]
    fn test_title_set_after_creation_starts_tracking() {
        let mut h = Harness::new(
            hd(),
            Some(r#"{"Log":{"x":300,"y":200,"w":600,"h":400}}"#),
            TrackingPolicy::default(),
        );
        h.fake.open(LOG, FakeWindowSystem::dialog(None, HOST_DEFAULT));
        h.settle();
        assert_eq!(h.fake.subscriptions_for(LOG), 2);
        assert!(h.fake.commands().is_empty());

        h.fake.set_title(LOG, Some("   "));
        h.settle();
        assert!(h.fake.commands().is_empty());

        h.fake.set_title(LOG, Some(" Log "));
        h.settle();
        assert_eq!(h.fake.commands()[0], Command::SetPosition(LOG, 300.0, 200.0));
        assert_eq!(h.fake.subscriptions_for(LOG), 1);

        h.fake.set_showing(LOG, true);
        h.settle();
        assert_eq!(h.fake.subscriptions_for(LOG), 5);
        assert!(h.record("Log").unwrap().is_open);
    }

    #[test]
    fn test_untitled_window_tracked_under_fallback_id_but_never_persisted() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, FakeWindowSystem::dialog(None, HOST_DEFAULT));
        h.fake.set_showing(LOG, true);
        h.settle();

        let id = fallback_id(WindowKind::Dialog, LOG);
        assert!(h.record(&id).unwrap().is_open);

        h.fake.set_showing(LOG, false);
        h.settle();
        assert!(!h.record(&id).unwrap().is_open);

        h.fake.destroy(LOG);
        h.settle();
        assert!(h.record(&id).is_none());
        assert!(h.manager.records().iter().all(|r| !is_fallback_id(&r.id)));
        assert!(h.stored().keys().all(|k| !is_fallback_id(k)));
        assert_eq!(h.fake.subscription_count(), 1);
    }

    #[test]
    fn test_ineligible_windows_are_dropped() {
        let mut policy = TrackingPolicy::default();
        policy.set_track_all(false);
        let mut h = Harness::new(hd(), None, policy);

        h.fake.open(LOG, shown(Some("Random"), HOST_DEFAULT));
        h.fake.open(OBJECTS, FakeWindowSystem::dialog(None, HOST_DEFAULT));
        h.settle();
        assert_eq!(h.fake.subscriptions_for(OBJECTS), 2);

        h.fake.set_title(OBJECTS, Some("Also random"));
        h.settle();
        assert_eq!(h.manager.tracked_count(), 0);
        assert_eq!(h.fake.subscription_count(), 1);

        // Untitled windows cannot match a targeted title
        h.fake.open(WindowHandle(3), FakeWindowSystem::dialog(None, HOST_DEFAULT));
        h.fake.set_showing(WindowHandle(3), true);
        h.settle();
        assert_eq!(h.manager.tracked_count(), 0);
    }

    #[test]
    fn test_main_and_popup_windows_are_ignored() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        let mut main = shown(Some("QuPath"), HOST_DEFAULT);
        main.kind = WindowKind::Main;
        let mut popup = shown(None, HOST_DEFAULT);
        popup.kind = WindowKind::Popup;
        h.fake.open(LOG, main);
        h.fake.open(OBJECTS, popup);
        h.settle();

        assert_eq!(h.manager.tracked_count(), 0);
        assert_eq!(h.fake.subscription_count(), 1);
    }

    #[test]
    fn test_moves_publish_and_hide_persists() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();

        let generation = h.manager.generation();
        h.fake.move_window(LOG, Rect::new(50.0, 60.0, 600.0, 400.0));
        h.settle();
        assert!(h.manager.generation() > generation);
        assert_eq!(h.record("Log").unwrap().x, 50.0);
        assert!(h.stored().is_empty());

        h.fake.set_showing(LOG, false);
        h.settle();
        let stored = h.stored();
        let saved = stored.get("Log").unwrap();
        assert_eq!((saved.x, saved.y), (50.0, 60.0));
        assert!(!h.record("Log").unwrap().is_open);

        // Shown again: still tracked, listed as open
        h.fake.set_showing(LOG, true);
        h.settle();
        assert!(h.record("Log").unwrap().is_open);
    }

    #[test]
    fn test_reopen_after_monitor_unplugged_is_centered() {
        let dual = vec![
            Screen::new("left", Rect::new(0.0, 0.0, 1920.0, 1080.0), 1.0, true),
            Screen::new("right", Rect::new(1920.0, 0.0, 1920.0, 1080.0), 1.0, false),
        ];
        let mut h = Harness::new(dual, None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();
        h.fake.move_window(LOG, Rect::new(2100.0, 100.0, 600.0, 400.0));
        h.settle();
        h.fake.destroy(LOG);
        h.settle();
        assert_eq!(h.stored().get("Log").unwrap().screen_index, 1);

        h.fake.set_screens(hd());
        h.fake.clear_commands();
        h.fake.open(OBJECTS, FakeWindowSystem::dialog(Some("Log"), Rect::new(0.0, 0.0, 600.0, 400.0)));
        h.settle();
        assert_eq!(h.fake.commands(), vec![Command::SetPosition(OBJECTS, 660.0, 340.0)]);
    }

    #[test]
    fn test_removal_detaches_and_saves() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();
        h.fake.move_window(LOG, Rect::new(70.0, 80.0, 600.0, 400.0));
        h.settle();

        h.fake.destroy(LOG);
        h.settle();
        assert_eq!(h.fake.subscriptions_for(LOG), 0);
        assert_eq!(h.manager.tracked_count(), 0);
        assert_eq!(h.stored().get("Log").unwrap().x, 70.0);
    }

    #[test]
    fn test_operations_on_unknown_or_closed_windows() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        assert!(!h.manager.center("Log"));
        assert!(!h.manager.bring_to_front("Log"));
        assert!(!h.manager.close("Log"));

        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();
        h.fake.set_showing(LOG, false);
        h.settle();
        assert!(!h.manager.bring_to_front("Log"));
        assert!(!h.manager.close("Log"));
        assert!(h.fake.commands().is_empty());
    }

    #[test]
    fn test_center_bring_to_front_and_close() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), Rect::new(10.0, 10.0, 320.0, 240.0)));
        h.settle();

        assert!(h.manager.center("Log"));
        assert_eq!(h.fake.commands(), vec![Command::SetPosition(LOG, 800.0, 420.0)]);
        assert_eq!(h.record("Log").unwrap().x, 800.0);

        h.fake.clear_commands();
        assert!(h.manager.bring_to_front("Log"));
        assert_eq!(h.fake.commands(), vec![Command::Raise(LOG), Command::Focus(LOG)]);

        assert!(h.manager.close("Log"));
        h.settle();
        assert_eq!(h.manager.tracked_count(), 0);
        assert!(!h.record("Log").unwrap().is_open);
        assert_eq!(h.stored().get("Log").unwrap().x, 800.0);
    }

    #[test]
    fn test_reset_forgets_durable_and_listed_record() {
        let mut h = Harness::new(
            hd(),
            Some(r#"{"Log":{"x":1,"y":2,"w":300,"h":200}}"#),
            TrackingPolicy::default(),
        );
        assert!(h.record("Log").is_some());

        assert!(h.manager.reset("Log"));
        assert!(h.record("Log").is_none());
        assert!(h.stored().is_empty());
        assert!(!h.manager.reset("Log"));
    }

    #[test]
    fn test_recover_off_screen_centers_only_lost_windows() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.fake.open(OBJECTS, shown(Some("Objects"), Rect::new(0.0, 0.0, 400.0, 300.0)));
        h.settle();
        h.fake.move_window(LOG, Rect::new(5000.0, 5000.0, 600.0, 400.0));
        h.settle();
        h.fake.clear_commands();

        assert_eq!(h.manager.recover_off_screen(), 1);
        assert_eq!(h.fake.commands(), vec![Command::SetPosition(LOG, 660.0, 340.0)]);
        assert!(h.manager.is_on_screen(h.record("Log").unwrap()));
        assert_eq!(h.manager.recover_off_screen(), 0);
    }

    #[test]
    fn test_clear_all_keeps_open_records() {
        let mut h = Harness::new(
            hd(),
            Some(r#"{"Objects":{"x":1,"y":2,"w":300,"h":200},"Log":{"x":5,"y":5,"w":300,"h":200}}"#),
            TrackingPolicy::default(),
        );
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();

        h.manager.clear_all();
        let ids: Vec<&str> = h.manager.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Log"]);
        assert_eq!(h.prefs.raw(storage::POSITIONS_KEY).as_deref(), Some("{}"));
    }

    #[test]
    fn test_widening_policy_adopts_open_windows() {
        let mut policy = TrackingPolicy::default();
        policy.set_track_all(false);
        let mut h = Harness::new(hd(), None, policy);
        h.fake.open(LOG, shown(Some("Random"), HOST_DEFAULT));
        h.fake.open(OBJECTS, shown(Some("Other"), HOST_DEFAULT));
        h.settle();
        assert_eq!(h.manager.tracked_count(), 0);

        h.manager.add_targeted_title("Random");
        assert_eq!(h.manager.tracked_count(), 1);

        h.manager.set_track_all_windows(true);
        assert_eq!(h.manager.tracked_count(), 2);
    }

    #[test]
    fn test_exclude_and_include() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();

        h.manager.exclude("Log");
        assert_eq!(h.manager.tracked_count(), 0);
        assert_eq!(h.fake.subscriptions_for(LOG), 0);

        h.manager.include("Log");
        assert_eq!(h.manager.tracked_count(), 1);
    }

    #[test]
    fn test_exclude_saves_open_window_as_closed() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();
        h.fake.move_window(LOG, Rect::new(40.0, 30.0, 600.0, 400.0));
        h.settle();

        h.manager.exclude("Log");
        assert!(!h.record("Log").unwrap().is_open);
        assert_eq!(h.stored().get("Log").unwrap().x, 40.0);

        h.fake.destroy(LOG);
        h.settle();
        assert!(!h.record("Log").unwrap().is_open);
        assert_eq!(h.fake.subscription_count(), 1);
    }

    #[test]
    fn test_exclude_drops_window_waiting_to_show() {
        let mut h = Harness::new(
            hd(),
            Some(r#"{"Log":{"x":300,"y":200,"w":600,"h":400}}"#),
            TrackingPolicy::default(),
        );
        h.fake.open(LOG, FakeWindowSystem::dialog(Some("Log"), HOST_DEFAULT));
        h.manager.pump();
        assert_eq!(h.fake.subscriptions_for(LOG), 1);

        h.manager.exclude("Log");
        assert_eq!(h.fake.subscriptions_for(LOG), 0);

        h.fake.clear_commands();
        h.fake.set_showing(LOG, true);
        h.settle();
        assert_eq!(h.manager.tracked_count(), 0);
        assert!(h.fake.commands().is_empty());
    }

    #[test]
    fn test_startup_loads_closed_records_and_drops_fallback_entries() {
        let h = Harness::new(
            hd(),
            Some(r#"{"@Stage:1234":{"x":1},"Objects":{"x":1,"y":2,"w":300,"h":200}}"#),
            TrackingPolicy::default(),
        );
        let ids: Vec<&str> = h.manager.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Objects"]);
        assert!(h.manager.records().iter().all(|r| !r.is_open));
        assert!(!h.prefs.raw(storage::POSITIONS_KEY).unwrap().contains('@'));
    }

    #[test]
    fn test_write_failure_does_not_stop_tracking() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.settle();

        h.prefs.fail_writes(true);
        h.fake.set_showing(LOG, false);
        h.settle();
        assert!(!h.record("Log").unwrap().is_open);

        h.fake.set_showing(LOG, true);
        h.fake.move_window(LOG, Rect::new(1.0, 2.0, 600.0, 400.0));
        h.settle();
        assert_eq!(h.record("Log").unwrap().x, 1.0);
    }

    #[test]
    fn test_shutdown_releases_everything_and_persists() {
        let mut h = Harness::new(hd(), None, TrackingPolicy::default());
        h.fake.open(LOG, shown(Some("Log"), HOST_DEFAULT));
        h.fake.open(OBJECTS, FakeWindowSystem::dialog(None, HOST_DEFAULT));
        h.settle();

        h.manager.shutdown();
        assert_eq!(h.fake.subscription_count(), 0);
        assert!(h.stored().contains_key("Log"));
        assert!(h.manager.records().iter().all(|r| !r.is_open));
    }

    #[test]
    fn test_screen_diagnostics() {
        let h = Harness::new(hd(), None, TrackingPolicy::default());
        assert!(h.manager.screen_diagnostics().contains("1920x1080 at (0,0) scale=1.00x1.00 name=HD [PRIMARY]"));
    }
}
