//! Monitor discovery via RandR

use anyhow::{Context, Result};
use tracing::{debug, warn};
use x11rb::protocol::randr::ConnectionExt as RandrExt;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, Screen as RootScreen};
use x11rb::rust_connection::RustConnection;

use super::atoms::CachedAtoms;
use super::props::{parse_workarea, scale_from_physical, usable_bounds};
use crate::constants::x11::PROPERTY_READ_LENGTH;
use crate::types::{Rect, Screen};

/// Current monitor layout; the whole root window when RandR has nothing
pub fn query_screens(conn: &RustConnection, root: &RootScreen, atoms: &CachedAtoms) -> Vec<Screen> {
    let workarea = match read_workarea(conn, root, atoms) {
        Ok(area) => area,
        Err(e) => {
            debug!(error = %e, "No _NET_WORKAREA, using full monitor bounds");
            None
        }
    };

    match query_monitors(conn, root) {
        Ok(monitors) if !monitors.is_empty() => monitors
            .into_iter()
            .map(|screen| {
                let usable = usable_bounds(screen.bounds, workarea);
                screen.with_usable(usable)
            })
            .collect(),
        Ok(_) => {
            warn!("RandR reported no monitors, falling back to root window");
            vec![root_screen(root, workarea)]
        }
        Err(e) => {
            warn!(error = %e, "RandR monitor query failed, falling back to root window");
            vec![root_screen(root, workarea)]
        }
    }
}

fn query_monitors(conn: &RustConnection, root: &RootScreen) -> Result<Vec<Screen>> {
    let reply = conn
        .randr_get_monitors(root.root, true)
        .context("Failed to query RandR monitors")?
        .reply()
        .context("Failed to get reply for RandR monitors")?;

    let mut screens = Vec::with_capacity(reply.monitors.len());
    for monitor in &reply.monitors {
        let name = conn
            .get_atom_name(monitor.name)
            .context("Failed to query monitor name")?
            .reply()
            .map(|reply| String::from_utf8_lossy(&reply.name).into_owned())
            .unwrap_or_else(|_| format!("monitor-{}", screens.len()));
        let bounds = Rect::new(
            f64::from(monitor.x),
            f64::from(monitor.y),
            f64::from(monitor.width),
            f64::from(monitor.height),
        );
        let scale = scale_from_physical(monitor.width, monitor.width_in_millimeters);
        debug!(name = %name, bounds = ?bounds, scale = scale, primary = monitor.primary, "Discovered monitor");
        screens.push(Screen::new(name, bounds, scale, monitor.primary));
    }
    Ok(screens)
}

fn read_workarea(conn: &RustConnection, root: &RootScreen, atoms: &CachedAtoms) -> Result<Option<Rect>> {
    let reply = conn
        .get_property(
            false,
            root.root,
            atoms.net_workarea,
            AtomEnum::CARDINAL,
            0,
            PROPERTY_READ_LENGTH,
        )
        .context("Failed to query _NET_WORKAREA property")?
        .reply()
        .context("Failed to get reply for _NET_WORKAREA query")?;
    let values: Vec<u32> = reply.value32().map(Iterator::collect).unwrap_or_default();
    Ok(parse_workarea(&values))
}

fn root_screen(root: &RootScreen, workarea: Option<Rect>) -> Screen {
    let bounds = Rect::new(
        0.0,
        0.0,
        f64::from(root.width_in_pixels),
        f64::from(root.height_in_pixels),
    );
    let scale = scale_from_physical(root.width_in_pixels, u32::from(root.width_in_millimeters));
    Screen::new("root", bounds, scale, true).with_usable(usable_bounds(bounds, workarea))
}
