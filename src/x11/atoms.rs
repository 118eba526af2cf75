use anyhow::{Context, Result};
use x11rb::protocol::xproto::{Atom, ConnectionExt};
use x11rb::rust_connection::RustConnection;

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub wm_name: Atom,
    pub wm_class: Atom,
    pub wm_normal_hints: Atom,
    pub wm_transient_for: Atom,
    pub utf8_string: Atom,
    pub net_wm_name: Atom,
    pub net_wm_pid: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_modal: Atom,
    pub net_wm_window_type: Atom,
    /// `_NET_WM_WINDOW_TYPE_*` values that mark menus, tooltips and the like
    pub popup_types: Vec<Atom>,
    pub net_client_list: Atom,
    pub net_workarea: Atom,
    pub net_active_window: Atom,
    pub net_close_window: Atom,
    pub net_frame_extents: Atom,
}

const POPUP_TYPE_NAMES: [&str; 7] = [
    "_NET_WM_WINDOW_TYPE_DROPDOWN_MENU",
    "_NET_WM_WINDOW_TYPE_POPUP_MENU",
    "_NET_WM_WINDOW_TYPE_TOOLTIP",
    "_NET_WM_WINDOW_TYPE_NOTIFICATION",
    "_NET_WM_WINDOW_TYPE_COMBO",
    "_NET_WM_WINDOW_TYPE_DND",
    "_NET_WM_WINDOW_TYPE_MENU",
];

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .context(format!("Failed to intern {} atom", name))?
        .reply()
        .context(format!("Failed to get reply for {} atom", name))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        let popup_types = POPUP_TYPE_NAMES
            .iter()
            .map(|name| intern(conn, name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            wm_name: intern(conn, "WM_NAME")?,
            wm_class: intern(conn, "WM_CLASS")?,
            wm_normal_hints: intern(conn, "WM_NORMAL_HINTS")?,
            wm_transient_for: intern(conn, "WM_TRANSIENT_FOR")?,
            utf8_string: intern(conn, "UTF8_STRING")?,
            net_wm_name: intern(conn, "_NET_WM_NAME")?,
            net_wm_pid: intern(conn, "_NET_WM_PID")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_modal: intern(conn, "_NET_WM_STATE_MODAL")?,
            net_wm_window_type: intern(conn, "_NET_WM_WINDOW_TYPE")?,
            popup_types,
            net_client_list: intern(conn, "_NET_CLIENT_LIST")?,
            net_workarea: intern(conn, "_NET_WORKAREA")?,
            net_active_window: intern(conn, "_NET_ACTIVE_WINDOW")?,
            net_close_window: intern(conn, "_NET_CLOSE_WINDOW")?,
            net_frame_extents: intern(conn, "_NET_FRAME_EXTENTS")?,
        })
    }
}
