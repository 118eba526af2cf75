//! Control socket between the CLI and a running daemon
//!
//! Each frame is a u32 little-endian payload length followed by that many
//! bytes of JSON. A client may send any number of requests on one connection;
//! the daemon answers each with exactly one response, in order.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

pub mod handler;
mod messages;
pub use messages::{DaemonStatus, ListedDialog, ManagerRequest, ManagerResponse};

use crate::constants::daemon::REPLY_TIMEOUT;
use crate::constants::ipc::{CLIENT_TIMEOUT_MARGIN, MAX_MESSAGE_SIZE, SOCKET_MODE, SOCKET_RELATIVE_PATH};

const LEN_PREFIX: usize = std::mem::size_of::<u32>();

/// `$XDG_RUNTIME_DIR/dialog-keeper/daemon.sock`, or the same under the cache dir
pub fn default_socket_path() -> Result<PathBuf> {
    let base = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime_dir) => PathBuf::from(runtime_dir),
        None => dirs::cache_dir().context("Neither XDG_RUNTIME_DIR nor a cache directory is available")?,
    };
    Ok(base.join(SOCKET_RELATIVE_PATH))
}

/// One end of a control connection
pub struct Connection {
    stream: UnixStream,
}

impl Connection {
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let frame = encode_frame(message)?;
        self.stream
            .write_all(&frame)
            .context("Failed to send frame over control socket")
    }

    pub fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        read_frame(&mut self.stream)
    }
}

/// CLI side of the control socket
pub struct ManagerClient {
    conn: Connection,
}

impl ManagerClient {
    /// Replies slower than the daemon's own deadline plus a margin fail instead of hanging
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).context(format!(
            "No daemon at {} (start one with `dialog-keeper run`)",
            path.display()
        ))?;
        stream
            .set_read_timeout(Some(REPLY_TIMEOUT + CLIENT_TIMEOUT_MARGIN))
            .context("Failed to set control socket timeout")?;
        Ok(Self {
            conn: Connection { stream },
        })
    }

    pub fn request(&mut self, request: &ManagerRequest) -> Result<ManagerResponse> {
        self.conn.send(request)?;
        self.conn
            .recv()
            .context(format!("No reply from daemon to {:?}", request))
    }
}

/// Daemon side: owns the socket file for as long as it lives
pub struct ManagerServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl ManagerServer {
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        if socket_path.exists() {
            // Something answering means a second daemon; silence means a leftover file
            if UnixStream::connect(&socket_path).is_ok() {
                bail!("A daemon is already running on {}", socket_path.display());
            }
            fs::remove_file(&socket_path)
                .context(format!("Failed to remove leftover socket {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to listen on {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&socket_path, fs::Permissions::from_mode(SOCKET_MODE))
                .context(format!("Failed to restrict permissions on {}", socket_path.display()))?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Blocks until a client connects
    pub fn accept(&self) -> Result<Connection> {
        let (stream, _addr) = self
            .listener
            .accept()
            .context("Failed to accept control connection")?;
        Ok(Connection { stream })
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ManagerServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.socket_path);
    }
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_MESSAGE_SIZE {
        bail!("Frame of {} bytes exceeds the {} byte limit", len, MAX_MESSAGE_SIZE);
    }
    Ok(())
}

/// Length prefix and payload in one buffer, so a frame goes out in a single write
fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(message).context("Failed to encode control message")?;
    check_len(payload.len())?;
    let len = u32::try_from(payload.len()).context("Frame length does not fit the prefix")?;

    let mut frame = Vec::with_capacity(LEN_PREFIX + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn read_frame<T: DeserializeOwned>(source: &mut impl Read) -> Result<T> {
    let mut prefix = [0u8; LEN_PREFIX];
    source
        .read_exact(&mut prefix)
        .context("Control connection closed before a frame arrived")?;
    let len = u32::from_le_bytes(prefix) as usize;
    check_len(len)?;

    let mut payload = vec![0u8; len];
    source
        .read_exact(&mut payload)
        .context(format!("Control frame truncated (expected {} bytes)", len))?;
    serde_json::from_slice(&payload).context("Failed to decode control message")
}
