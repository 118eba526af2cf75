//! X11 implementation of `WindowSystem`
//!
//! Client windows are picked up from `CreateNotify` on the root window (and
//! `_NET_CLIENT_LIST` at startup). Each gets `STRUCTURE_NOTIFY | PROPERTY_CHANGE`
//! selected on itself, so map, unmap, configure and destroy events arrive with
//! `event == window` even after the window manager reparents it.

mod atoms;
mod props;
mod screens;

pub use props::HostFilter;

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{debug, info, trace};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::constants::x11::{PROPERTY_READ_LENGTH, SOURCE_PAGER};
use crate::types::Rect;
use crate::window_system::{
    GeometryProperty, SubscriptionId, SubscriptionTable, Topic, WindowEvent, WindowHandle,
    WindowInfo, WindowSystem,
};
use atoms::CachedAtoms;
use props::FrameExtents;

/// What we remember about a top-level window between events
#[derive(Debug)]
struct KnownWindow {
    /// `None` until WM_CLASS or the pid shows up (at the latest, at map time)
    host: Option<bool>,
    showing: bool,
    bounds: Rect,
}

pub struct X11WindowSystem {
    conn: RustConnection,
    screen_num: usize,
    atoms: CachedAtoms,
    filter: HostFilter,
    windows: HashMap<Window, KnownWindow>,
    subscriptions: SubscriptionTable,
    pending: Vec<WindowEvent>,
}

fn handle(window: Window) -> WindowHandle {
    WindowHandle(u64::from(window))
}

fn x11_window(handle: WindowHandle) -> Result<Window> {
    Window::try_from(handle.0).context(format!("{} is not an X11 window id", handle))
}

impl X11WindowSystem {
    pub fn connect(filter: HostFilter) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 server")?;
        let atoms = CachedAtoms::new(&conn).context("Failed to cache X11 atoms at startup")?;
        let root = conn.setup().roots[screen_num].root;

        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::SUBSTRUCTURE_NOTIFY),
        )
        .context("Failed to select SubstructureNotify on root window")?;

        let mut system = Self {
            conn,
            screen_num,
            atoms,
            filter,
            windows: HashMap::new(),
            subscriptions: SubscriptionTable::default(),
            pending: Vec::new(),
        };

        for window in system.existing_clients()? {
            system.watch(window);
            let showing = system
                .conn
                .get_window_attributes(window)
                .ok()
                .and_then(|cookie| cookie.reply().ok())
                .is_some_and(|attrs| attrs.map_state == MapState::VIEWABLE);
            let host = Some(system.resolve_host(window, true).unwrap_or(false));
            let bounds = system.query_bounds(window).unwrap_or_default();
            system.windows.insert(
                window,
                KnownWindow {
                    host,
                    showing,
                    bounds,
                },
            );
        }
        system.conn.flush().context("Failed to flush X11 connection")?;

        info!(
            screen = system.screen_num,
            host_windows = system.host_windows().count(),
            "Connected to X11 server"
        );
        Ok(system)
    }

    fn root(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    fn host_windows(&self) -> impl Iterator<Item = Window> + '_ {
        self.windows
            .iter()
            .filter(|(_, known)| known.host == Some(true))
            .map(|(window, _)| *window)
    }

    /// Clients from `_NET_CLIENT_LIST`, or the root's children without an EWMH manager
    fn existing_clients(&self) -> Result<Vec<Window>> {
        let root = self.root().root;
        let reply = self
            .conn
            .get_property(
                false,
                root,
                self.atoms.net_client_list,
                AtomEnum::WINDOW,
                0,
                PROPERTY_READ_LENGTH,
            )
            .context("Failed to query _NET_CLIENT_LIST property")?
            .reply()
            .context("Failed to get reply for _NET_CLIENT_LIST query")?;
        if let Some(clients) = reply.value32() {
            let clients: Vec<Window> = clients.collect();
            if !clients.is_empty() {
                return Ok(clients);
            }
        }

        debug!("No _NET_CLIENT_LIST, falling back to query_tree");
        Ok(self
            .conn
            .query_tree(root)
            .context("Failed to query root window tree")?
            .reply()
            .context("Failed to get reply for root window tree")?
            .children)
    }

    fn watch(&self, window: Window) {
        // The window may already be gone; the error surfaces as an event and is ignored there
        let _ = self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::STRUCTURE_NOTIFY | EventMask::PROPERTY_CHANGE),
        );
    }

    fn property(&self, window: Window, atom: Atom, type_: impl Into<Atom>) -> Option<GetPropertyReply> {
        self.conn
            .get_property(false, window, atom, type_, 0, PROPERTY_READ_LENGTH)
            .ok()?
            .reply()
            .ok()
    }

    fn property32(&self, window: Window, atom: Atom, type_: impl Into<Atom>) -> Vec<u32> {
        self.property(window, atom, type_)
            .and_then(|reply| reply.value32().map(Iterator::collect))
            .unwrap_or_default()
    }

    /// Decide whether a window belongs to the host; with `force`, missing identity means no
    fn resolve_host(&self, window: Window, force: bool) -> Option<bool> {
        let pid = self
            .property32(window, self.atoms.net_wm_pid, AtomEnum::CARDINAL)
            .first()
            .copied();
        let class = self
            .property(window, self.atoms.wm_class, AtomEnum::STRING)
            .map(|reply| reply.value)
            .unwrap_or_default();
        if pid.is_none() && class.is_empty() && !force {
            return None;
        }
        Some(self.filter.matches(pid, &class))
    }

    fn read_title(&self, window: Window) -> Option<String> {
        let utf8 = self
            .property(window, self.atoms.net_wm_name, self.atoms.utf8_string)
            .filter(|reply| !reply.value.is_empty());
        let reply = utf8.or_else(|| self.property(window, self.atoms.wm_name, AtomEnum::ANY))?;
        if reply.value.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn frame_extents(&self, window: Window) -> FrameExtents {
        let values = self.property32(window, self.atoms.net_frame_extents, AtomEnum::CARDINAL);
        props::parse_frame_extents(&values).unwrap_or_default()
    }

    /// Root-relative frame origin and client size
    ///
    /// The origin includes decorations so it round-trips through `set_position`.
    fn query_bounds(&self, window: Window) -> Result<Rect> {
        let geometry = self
            .conn
            .get_geometry(window)
            .context(format!("Failed to query geometry for window {}", window))?
            .reply()
            .context(format!("Failed to get geometry reply for window {}", window))?;
        let translated = self
            .conn
            .translate_coordinates(window, self.root().root, 0, 0)
            .context(format!("Failed to translate coordinates for window {}", window))?
            .reply()
            .context(format!("Failed to get translate reply for window {}", window))?;
        let (x, y) = props::frame_origin(translated.dst_x, translated.dst_y, self.frame_extents(window));
        Ok(Rect::new(
            x,
            y,
            f64::from(geometry.width),
            f64::from(geometry.height),
        ))
    }

    fn send_root_message(&self, window: Window, type_: Atom, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_,
            data: ClientMessageData::from(data),
        };
        self.conn
            .send_event(
                false,
                self.root().root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                event,
            )
            .context(format!("Failed to send client message for window {}", window))?;
        self.conn
            .flush()
            .context("Failed to flush X11 connection after client message")?;
        Ok(())
    }

    fn announce_if_host(&mut self, window: Window, force: bool) {
        let Some(known) = self.windows.get(&window) else {
            return;
        };
        if known.host.is_some() {
            return;
        }
        let host = self.resolve_host(window, force);
        if let Some(known) = self.windows.get_mut(&window) {
            known.host = host;
        }
        if host == Some(true) {
            debug!(window = window, "Host window appeared");
            self.pending.push(WindowEvent::Added(handle(window)));
        }
    }

    fn is_host(&self, window: Window) -> bool {
        self.windows
            .get(&window)
            .is_some_and(|known| known.host == Some(true))
    }

    fn refresh_geometry(&mut self, window: Window) {
        let Ok(bounds) = self.query_bounds(window) else {
            return;
        };
        let Some(known) = self.windows.get_mut(&window) else {
            return;
        };
        let old = known.bounds;
        known.bounds = bounds;
        if known.host != Some(true) {
            return;
        }
        let changes = [
            (GeometryProperty::X, old.x, bounds.x),
            (GeometryProperty::Y, old.y, bounds.y),
            (GeometryProperty::Width, old.width, bounds.width),
            (GeometryProperty::Height, old.height, bounds.height),
        ];
        for (property, before, after) in changes {
            if before != after {
                self.pending.push(WindowEvent::GeometryChanged {
                    window: handle(window),
                    property,
                    value: after,
                });
            }
        }
    }

    fn set_showing(&mut self, window: Window, showing: bool) {
        if showing {
            self.announce_if_host(window, true);
        }
        let Some(known) = self.windows.get_mut(&window) else {
            return;
        };
        if known.showing == showing {
            return;
        }
        known.showing = showing;
        if known.host == Some(true) {
            self.pending.push(WindowEvent::VisibilityChanged {
                window: handle(window),
                showing,
            });
        }
        if showing {
            self.refresh_geometry(window);
        }
    }

    fn handle_event(&mut self, event: Event) {
        let root = self.root().root;
        match event {
            Event::CreateNotify(ev) if ev.parent == root => {
                trace!(window = ev.window, "CreateNotify");
                self.watch(ev.window);
                self.windows.insert(
                    ev.window,
                    KnownWindow {
                        host: None,
                        showing: false,
                        bounds: Rect::new(
                            f64::from(ev.x),
                            f64::from(ev.y),
                            f64::from(ev.width),
                            f64::from(ev.height),
                        ),
                    },
                );
                self.announce_if_host(ev.window, false);
            }
            Event::DestroyNotify(ev) => {
                if let Some(known) = self.windows.remove(&ev.window)
                    && known.host == Some(true)
                {
                    debug!(window = ev.window, "Host window destroyed");
                    self.pending.push(WindowEvent::Removed(handle(ev.window)));
                }
            }
            Event::MapNotify(ev) if ev.event == ev.window => self.set_showing(ev.window, true),
            Event::UnmapNotify(ev) if ev.event == ev.window => self.set_showing(ev.window, false),
            Event::ConfigureNotify(ev) if ev.event == ev.window => self.refresh_geometry(ev.window),
            Event::ReparentNotify(ev) if ev.event == ev.window => self.refresh_geometry(ev.window),
            Event::PropertyNotify(ev) => {
                let is_identity = ev.atom == self.atoms.wm_class || ev.atom == self.atoms.net_wm_pid;
                let is_title = ev.atom == self.atoms.wm_name || ev.atom == self.atoms.net_wm_name;
                if ev.atom == self.atoms.net_frame_extents {
                    self.refresh_geometry(ev.window);
                } else if is_identity {
                    self.announce_if_host(ev.window, false);
                } else if is_title && self.is_host(ev.window) {
                    let title = self.read_title(ev.window);
                    self.pending.push(WindowEvent::TitleChanged {
                        window: handle(ev.window),
                        title,
                    });
                }
            }
            Event::Error(e) => trace!(error = ?e, "X11 error (window likely gone)"),
            _ => {}
        }
    }
}

impl WindowSystem for X11WindowSystem {
    fn screens(&self) -> Vec<crate::types::Screen> {
        screens::query_screens(&self.conn, self.root(), &self.atoms)
    }

    fn top_level_windows(&self) -> Vec<WindowHandle> {
        let mut windows: Vec<WindowHandle> = self.host_windows().map(handle).collect();
        windows.sort();
        windows
    }

    fn window_info(&self, window: WindowHandle) -> Option<WindowInfo> {
        let id = Window::try_from(window.0).ok()?;
        let known = self.windows.get(&id).filter(|known| known.host == Some(true))?;
        let attrs = self.conn.get_window_attributes(id).ok()?.reply().ok()?;
        let bounds = self.query_bounds(id).ok()?;

        let title = self.read_title(id);
        let window_types = self.property32(id, self.atoms.net_wm_window_type, AtomEnum::ATOM);
        let popup_type = props::has_any(&window_types, &self.atoms.popup_types);
        let state = self.property32(id, self.atoms.net_wm_state, AtomEnum::ATOM);
        let modal = state.contains(&self.atoms.net_wm_state_modal);
        let transient_for = self
            .property32(id, self.atoms.wm_transient_for, AtomEnum::WINDOW)
            .first()
            .copied();
        let hints = self.property32(id, self.atoms.wm_normal_hints, AtomEnum::ANY);

        Some(WindowInfo {
            kind: self
                .filter
                .classify(attrs.override_redirect, popup_type, title.as_deref()),
            title,
            modality: props::modality(modal, transient_for),
            resizable: props::is_resizable(&hints),
            showing: known.showing,
            bounds,
        })
    }

    fn subscribe(&mut self, topic: Topic) -> Result<SubscriptionId> {
        Ok(self.subscriptions.add(topic))
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(id);
    }

    fn set_position(&mut self, window: WindowHandle, x: f64, y: f64) -> Result<()> {
        let id = x11_window(window)?;
        self.conn
            .configure_window(
                id,
                &ConfigureWindowAux::new().x(x.round() as i32).y(y.round() as i32),
            )
            .context(format!("Failed to move window {}", window))?;
        self.conn.flush().context("Failed to flush X11 connection after move")?;
        Ok(())
    }

    fn set_size(&mut self, window: WindowHandle, width: f64, height: f64) -> Result<()> {
        let id = x11_window(window)?;
        self.conn
            .configure_window(
                id,
                &ConfigureWindowAux::new()
                    .width(width.round().max(1.0) as u32)
                    .height(height.round().max(1.0) as u32),
            )
            .context(format!("Failed to resize window {}", window))?;
        self.conn.flush().context("Failed to flush X11 connection after resize")?;
        Ok(())
    }

    fn close(&mut self, window: WindowHandle) -> Result<()> {
        let id = x11_window(window)?;
        self.send_root_message(
            id,
            self.atoms.net_close_window,
            [x11rb::CURRENT_TIME, SOURCE_PAGER, 0, 0, 0],
        )
    }

    fn raise(&mut self, window: WindowHandle) -> Result<()> {
        let id = x11_window(window)?;
        self.conn
            .configure_window(id, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
            .context(format!("Failed to raise window {} to top of stack", window))?;
        self.conn.flush().context("Failed to flush X11 connection after raise")?;
        Ok(())
    }

    fn focus(&mut self, window: WindowHandle) -> Result<()> {
        let id = x11_window(window)?;
        self.send_root_message(
            id,
            self.atoms.net_active_window,
            [SOURCE_PAGER, x11rb::CURRENT_TIME, 0, 0, 0],
        )
    }

    fn poll_events(&mut self) -> Result<Vec<WindowEvent>> {
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("Failed to poll X11 events")?
        {
            self.handle_event(event);
        }
        self.conn.flush().context("Failed to flush X11 connection")?;
        let pending = std::mem::take(&mut self.pending);
        Ok(self.subscriptions.retain_subscribed(pending))
    }
}
