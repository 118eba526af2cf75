//! Windows seen but not yet tracked
//!
//! ```text
//! AwaitingTitle --title, eligible--> (tracking protocol)
//! AwaitingTitle --title, ineligible--> dropped
//! AwaitingTitle --shown untitled--> fallback id, tracking protocol
//! AwaitingShow  --shown--> re-apply placement, tracker attached
//! ```

use crate::window_system::{SubscriptionId, WindowHandle, WindowKind, WindowSystem};

use super::restore::Placement;

#[derive(Debug, Clone, PartialEq)]
pub enum PendingState {
    /// No usable title yet
    AwaitingTitle,
    /// Identity resolved and placement (if any) applied before show
    AwaitingShow {
        id: String,
        placement: Option<Placement>,
    },
}

#[derive(Debug)]
pub struct PendingWindow {
    pub window: WindowHandle,
    pub state: PendingState,
    subscriptions: Vec<SubscriptionId>,
}

impl PendingWindow {
    pub fn new(window: WindowHandle, state: PendingState, subscriptions: Vec<SubscriptionId>) -> Self {
        Self {
            window,
            state,
            subscriptions,
        }
    }

    /// Release this window's subscriptions
    pub fn release(mut self, ws: &mut dyn WindowSystem) {
        for id in self.subscriptions.drain(..) {
            ws.unsubscribe(id);
        }
    }
}

/// Process-local id for a window whose title never resolved
pub fn fallback_id(kind: WindowKind, window: WindowHandle) -> String {
    format!(
        "{}{}:{}",
        crate::constants::identity::FALLBACK_ID_PREFIX,
        kind.name(),
        window.0
    )
}
