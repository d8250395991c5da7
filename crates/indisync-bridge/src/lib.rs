// indisync-bridge: Queue client between an async session and synchronous consumers.
//
// The session runs on its own thread and runtime. A consumer talks to it
// through a bounded command queue and reads notifications (each carrying
// an immutable snapshot) from a bounded event queue.

pub mod client;
pub mod command;
pub mod config;
mod engine;
pub mod error;
pub mod state;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{CommandSender, QueueClient};
pub use command::{Command, QueueItem};
pub use config::{BridgeConfig, EventQueuePolicy};
pub use error::BridgeError;
pub use state::{BridgeState, ShutdownHandle};
