// ── Bridge configuration ──
//
// Runtime knobs for one queue client. Built by the caller or by the
// config crate; never read from disk here.

use std::time::Duration;

use indisync_core::BlobPolicy;

use crate::error::BridgeError;

/// How the outbound event queue behaves when the consumer falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventQueuePolicy {
    /// FIFO of the given capacity. When full the engine retries with
    /// backoff; nothing is dropped.
    Bounded(usize),
    /// Depth one, newest wins. Intermediate notifications are dropped.
    Latest,
}

impl Default for EventQueuePolicy {
    fn default() -> Self {
        Self::Bounded(4)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Capacity of the inbound command queue.
    pub command_capacity: usize,
    pub event_queue: EventQueuePolicy,
    /// Wait between delivery attempts on a full event queue.
    pub backoff: Duration,
    /// Polling period of the blocking receive helpers; also bounds the
    /// final flush on shutdown.
    pub poll_interval: Duration,
    /// BLOB policy for targets the consumer has not configured.
    pub default_blob_policy: BlobPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_capacity: 16,
            event_queue: EventQueuePolicy::default(),
            backoff: Duration::from_millis(20),
            poll_interval: Duration::from_millis(50),
            default_blob_policy: BlobPolicy::Never,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), BridgeError> {
        let invalid = |message: &str| {
            Err(BridgeError::Config {
                message: message.to_owned(),
            })
        };
        if self.command_capacity == 0 {
            return invalid("command_capacity must be at least 1");
        }
        if self.event_queue == EventQueuePolicy::Bounded(0) {
            return invalid("bounded event queue needs a capacity of at least 1");
        }
        if self.backoff.is_zero() {
            return invalid("backoff must be non-zero");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll_interval must be non-zero");
        }
        Ok(())
    }
}
