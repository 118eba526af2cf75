//! IPC message types for CLI client ↔ daemon communication

use serde::{Deserialize, Serialize};

use crate::types::DialogRecord;

/// Requests sent from a client to the daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ManagerRequest {
    /// Current record list (open and remembered-closed)
    List,

    /// Center an open dialog on the primary screen
    Center(String),

    BringToFront(String),

    Close(String),

    /// Forget the saved position for an id
    Reset(String),

    RecoverOffScreen,

    ClearAll,

    SetTrackAllWindows(bool),

    AddTargetedTitle(String),

    RemoveTargetedTitle(String),

    Exclude(String),

    Include(String),

    /// Screen diagnostics text
    Screens,

    /// Tracking policy and counters
    Status,

    /// Health check
    Ping,

    /// Request graceful shutdown
    Shutdown,
}

/// Responses sent from the daemon to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ManagerResponse {
    /// `generation` changes whenever the list does
    Records {
        generation: u64,
        dialogs: Vec<ListedDialog>,
    },

    /// Outcome of an id-addressed operation (false = not found / not open)
    Done(bool),

    /// Number of windows moved back on screen
    Recovered(usize),

    Screens(String),

    Status(DaemonStatus),

    /// Health check response
    Pong,

    /// Acknowledgment that request was processed
    Ready,

    /// Error occurred
    Error(String),
}

/// One entry of the record list as the daemon sees it right now
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListedDialog {
    pub record: DialogRecord,
    /// Sufficiently visible on the current screens
    pub on_screen: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DaemonStatus {
    pub track_all: bool,
    pub targeted_titles: Vec<String>,
    pub excluded_ids: Vec<String>,
    pub tracked: usize,
    pub listed: usize,
    /// Character budget of the stored positions
    pub storage_budget: usize,
}
