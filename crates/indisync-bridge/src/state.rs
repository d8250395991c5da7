use std::sync::Arc;

use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of a queue client. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum BridgeState {
    Connecting,
    Connected,
    Stopping,
    Stopped,
}

impl BridgeState {
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

/// Advance `state` to `next` unless it is already at or past it.
pub(crate) fn advance(state: &watch::Sender<BridgeState>, next: BridgeState) -> bool {
    state.send_if_modified(|current| {
        if *current < next {
            debug!(from = %current, to = %next, "bridge state");
            *current = next;
            true
        } else {
            false
        }
    })
}

/// Stops a bridge from any thread or task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Arc<watch::Sender<BridgeState>>,
}

impl ShutdownHandle {
    /// Request a stop. Idempotent; the engine notices within one poll or
    /// backoff interval.
    pub fn shutdown(&self) {
        advance(&self.state, BridgeState::Stopping);
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
