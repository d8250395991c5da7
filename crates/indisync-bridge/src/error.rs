// ── Bridge error types ──
//
// Errors surfaced to the synchronous side. Everything that happens on the
// engine after start-up is absorbed there and logged.

use indisync_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Start-up errors ──────────────────────────────────────────────
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid bridge configuration: {message}")]
    Config { message: String },

    #[error("Cannot start bridge runtime: {0}")]
    Runtime(#[from] std::io::Error),

    // ── Queue errors ─────────────────────────────────────────────────
    #[error("Command queue is full")]
    QueueFull,

    #[error("Bridge has stopped")]
    Stopped,

    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    // ── Shutdown errors ──────────────────────────────────────────────
    #[error("Bridge engine thread panicked")]
    ThreadPanicked,
}

impl BridgeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCommand(reason.into())
    }
}
