//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Position validation and placement constants
pub mod placement {
    /// Minimum overlap (per axis) between a window and a screen's usable
    /// bounds for the window to count as reachable by the user
    pub const MIN_VISIBLE_PIXELS: f64 = 100.0;

    /// Lowest coordinate accepted as a real position (rejects placeholder values
    /// while still allowing negative-origin multi-monitor layouts)
    pub const MIN_COORDINATE: f64 = -10000.0;

    /// Width used for centering when the window has no size yet
    pub const FALLBACK_WIDTH: f64 = 400.0;

    /// Height used for centering when the window has no size yet
    pub const FALLBACK_HEIGHT: f64 = 300.0;

    /// Absolute output-scale difference treated as a display scale change
    pub const SCALE_CHANGE_TOLERANCE: f64 = 0.01;
}

/// Synthetic screen used when the window system reports none
pub mod synthetic_screen {
    pub const WIDTH: f64 = 1920.0;
    pub const HEIGHT: f64 = 1080.0;
    pub const NAME: &str = "synthetic";
}

/// Window identity constants
pub mod identity {
    /// Prefix marking process-local fallback ids (never persisted)
    pub const FALLBACK_ID_PREFIX: &str = "@";
}

/// Durable storage constants
pub mod storage {
    /// Preference key holding the serialized dialog records
    pub const POSITIONS_KEY: &str = "dialog_keeper.positions";

    /// Default serialized-size budget, kept well under the store's value limit
    pub const DEFAULT_MAX_CHARS: usize = 7500;

    /// Smallest budget accepted from configuration
    pub const MIN_MAX_CHARS: usize = 512;

    /// Maximum value length of the file preference store
    pub const FILE_STORE_MAX_VALUE_LEN: usize = 8192;

    /// Serialized form of an empty record map
    pub const EMPTY_BLOB: &str = "{}";
}

/// Config file location constants
pub mod config {
    /// Directory under the XDG config dir
    pub const APP_DIR: &str = "dialog-keeper";

    /// Main configuration file name
    pub const FILENAME: &str = "config.json";

    /// Preference store file name
    pub const PREFERENCES_FILENAME: &str = "preferences.json";

    /// Default log level when neither LOG_LEVEL nor the config sets one
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

/// Daemon loop timing
pub mod daemon {
    use std::time::Duration;

    /// Idle sleep between loop passes when nothing happened
    pub const POLL_INTERVAL: Duration = Duration::from_millis(15);

    /// How long a CLI client waits for the event thread to answer
    pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
}

/// IPC socket constants
pub mod ipc {
    use std::time::Duration;

    /// Socket path relative to XDG_RUNTIME_DIR (or the cache dir)
    pub const SOCKET_RELATIVE_PATH: &str = "dialog-keeper/daemon.sock";

    /// Maximum frame payload (1 MB)
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// Owner-only access to the socket file
    pub const SOCKET_MODE: u32 = 0o700;

    /// How often `list --watch` polls the daemon
    pub const WATCH_INTERVAL: Duration = Duration::from_millis(500);

    /// Extra time a client waits on top of the daemon's reply timeout
    pub const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);
}

/// X11 protocol constants
pub mod x11 {
    /// Source indication for _NET_ACTIVE_WINDOW / _NET_CLOSE_WINDOW (2 = pager/direct user action)
    pub const SOURCE_PAGER: u32 = 2;

    /// Upper bound (in 32-bit units) when reading string/list properties
    pub const PROPERTY_READ_LENGTH: u32 = 1024;

    /// WM_NORMAL_HINTS flag: program-specified minimum size
    pub const SIZE_HINT_P_MIN_SIZE: u32 = 1 << 4;

    /// WM_NORMAL_HINTS flag: program-specified maximum size
    pub const SIZE_HINT_P_MAX_SIZE: u32 = 1 << 5;

    /// Reference DPI for scale 1.0
    pub const BASE_DPI: f64 = 96.0;

    /// Millimetres per inch
    pub const MM_PER_INCH: f64 = 25.4;
}
