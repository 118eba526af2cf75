//! Scripted in-memory window system for tests
//!
//! Clones share state, so a test keeps one handle for scripting and inspection
//! while the manager owns another.

use anyhow::{Result, bail};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use super::{
    GeometryProperty, SubscriptionId, SubscriptionTable, Topic, WindowEvent, WindowHandle,
    WindowInfo, WindowKind, WindowSystem,
};
use crate::types::{Modality, Rect, Screen};

/// A command the code under test issued to the window system
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPosition(WindowHandle, f64, f64),
    SetSize(WindowHandle, f64, f64),
    Close(WindowHandle),
    Raise(WindowHandle),
    Focus(WindowHandle),
}

#[derive(Default)]
struct FakeState {
    screens: Vec<Screen>,
    windows: BTreeMap<WindowHandle, WindowInfo>,
    subscriptions: SubscriptionTable,
    events: VecDeque<WindowEvent>,
    commands: Vec<Command>,
}

impl FakeState {
    fn emit(&mut self, event: WindowEvent) {
        if self.subscriptions.is_subscribed(event.topic()) {
            self.events.push_back(event);
        }
    }

    fn emit_geometry(&mut self, window: WindowHandle, old: Rect, new: Rect) {
        let changes = [
            (GeometryProperty::X, old.x, new.x),
            (GeometryProperty::Y, old.y, new.y),
            (GeometryProperty::Width, old.width, new.width),
            (GeometryProperty::Height, old.height, new.height),
        ];
        for (property, before, after) in changes {
            if before != after {
                self.emit(WindowEvent::GeometryChanged {
                    window,
                    property,
                    value: after,
                });
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeWindowSystem {
    state: Rc<RefCell<FakeState>>,
}

impl FakeWindowSystem {
    pub fn new(screens: Vec<Screen>) -> Self {
        let fake = Self::default();
        fake.state.borrow_mut().screens = screens;
        fake
    }

    /// A hidden, resizable, non-modal dialog
    pub fn dialog(title: Option<&str>, bounds: Rect) -> WindowInfo {
        WindowInfo {
            title: title.map(str::to_owned),
            kind: WindowKind::Dialog,
            modality: Modality::None,
            resizable: true,
            showing: false,
            bounds,
        }
    }

    pub fn set_screens(&self, screens: Vec<Screen>) {
        self.state.borrow_mut().screens = screens;
    }

    /// Register a window without notifying anyone (it existed before startup)
    pub fn preexisting(&self, window: WindowHandle, info: WindowInfo) {
        self.state.borrow_mut().windows.insert(window, info);
    }

    pub fn open(&self, window: WindowHandle, info: WindowInfo) {
        let mut state = self.state.borrow_mut();
        state.windows.insert(window, info);
        state.emit(WindowEvent::Added(window));
    }

    pub fn destroy(&self, window: WindowHandle) {
        let mut state = self.state.borrow_mut();
        if state.windows.remove(&window).is_some() {
            state.emit(WindowEvent::Removed(window));
        }
    }

    pub fn set_title(&self, window: WindowHandle, title: Option<&str>) {
        let mut state = self.state.borrow_mut();
        if let Some(info) = state.windows.get_mut(&window) {
            info.title = title.map(str::to_owned);
            state.emit(WindowEvent::TitleChanged {
                window,
                title: title.map(str::to_owned),
            });
        }
    }

    pub fn set_showing(&self, window: WindowHandle, showing: bool) {
        let mut state = self.state.borrow_mut();
        if let Some(info) = state.windows.get_mut(&window)
            && info.showing != showing
        {
            info.showing = showing;
            state.emit(WindowEvent::VisibilityChanged { window, showing });
        }
    }

    /// Move a window as the user or the host would, outside the manager's control
    pub fn move_window(&self, window: WindowHandle, bounds: Rect) {
        let mut state = self.state.borrow_mut();
        if let Some(info) = state.windows.get_mut(&window) {
            let old = info.bounds;
            info.bounds = bounds;
            state.emit_geometry(window, old, bounds);
        }
    }

    pub fn info(&self, window: WindowHandle) -> Option<WindowInfo> {
        self.state.borrow().windows.get(&window).cloned()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.borrow_mut().commands.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    /// Live subscriptions whose topic concerns `window`
    pub fn subscriptions_for(&self, window: WindowHandle) -> usize {
        self.state
            .borrow()
            .subscriptions
            .topics()
            .filter(|topic| match topic {
                Topic::WindowList => false,
                Topic::Geometry(w, _) | Topic::Showing(w) | Topic::Title(w) => *w == window,
            })
            .count()
    }

    fn with_window(
        &self,
        window: WindowHandle,
        command: Command,
        apply: impl FnOnce(&mut WindowInfo),
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.commands.push(command);
        let Some(info) = state.windows.get_mut(&window) else {
            bail!("No such window {}", window);
        };
        let old = info.bounds;
        apply(info);
        let new = info.bounds;
        state.emit_geometry(window, old, new);
        Ok(())
    }
}

impl WindowSystem for FakeWindowSystem {
    fn screens(&self) -> Vec<Screen> {
        self.state.borrow().screens.clone()
    }

    fn top_level_windows(&self) -> Vec<WindowHandle> {
        self.state.borrow().windows.keys().copied().collect()
    }

    fn window_info(&self, window: WindowHandle) -> Option<WindowInfo> {
        self.info(window)
    }

    fn subscribe(&mut self, topic: Topic) -> Result<SubscriptionId> {
        Ok(self.state.borrow_mut().subscriptions.add(topic))
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.state.borrow_mut().subscriptions.remove(id);
    }

    fn set_position(&mut self, window: WindowHandle, x: f64, y: f64) -> Result<()> {
        self.with_window(window, Command::SetPosition(window, x, y), |info| {
            info.bounds.x = x;
            info.bounds.y = y;
        })
    }

    fn set_size(&mut self, window: WindowHandle, width: f64, height: f64) -> Result<()> {
        self.with_window(window, Command::SetSize(window, width, height), |info| {
            info.bounds.width = width;
            info.bounds.height = height;
        })
    }

    fn close(&mut self, window: WindowHandle) -> Result<()> {
        self.state.borrow_mut().commands.push(Command::Close(window));
        self.set_showing(window, false);
        self.destroy(window);
        Ok(())
    }

    fn raise(&mut self, window: WindowHandle) -> Result<()> {
        self.with_window(window, Command::Raise(window), |_| {})
    }

    fn focus(&mut self, window: WindowHandle) -> Result<()> {
        self.with_window(window, Command::Focus(window), |_| {})
    }

    fn poll_events(&mut self) -> Result<Vec<WindowEvent>> {
        let mut state = self.state.borrow_mut();
        let pending: Vec<WindowEvent> = state.events.drain(..).collect();
        // Drop anything whose subscription went away while it was queued
        Ok(state.subscriptions.retain_subscribed(pending))
    }
}
