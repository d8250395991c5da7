// ── Runtime session configuration ──
//
// Describes how a session behaves. Built by the caller (or by the
// config crate from a TOML file) and handed in; core never reads disk.

use std::time::Duration;

use crate::blob::BlobPolicy;
use crate::model::DEFAULT_MESSAGE_CAPACITY;

/// Configuration for one session (driver-side or client-side).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Name used in log spans.
    pub name: String,
    /// Messages kept per device and session-wide.
    pub message_capacity: usize,
    /// Capacity of the hardware update channel.
    pub update_capacity: usize,
    /// Timeout applied to snoops registered without one. `None` disables.
    pub default_snoop_timeout: Option<Duration>,
    /// BLOB policy assumed for the peer until it sends `EnableBlob`.
    pub peer_blob_policy: BlobPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "session".into(),
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            update_capacity: 32,
            default_snoop_timeout: None,
            peer_blob_policy: BlobPolicy::Never,
        }
    }
}
