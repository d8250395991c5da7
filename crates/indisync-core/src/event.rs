// ── Notification taxonomy ──
//
// Every mutation of the property store stages exactly one `Notification`.
// Subscribers (the wire, snooping devices, bridge queues) all see the same
// records in the same order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

use crate::model::Vector;
use crate::snapshot::Snapshot;

/// What happened.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString,
)]
pub enum EventType {
    Define,
    #[strum(serialize = "DefineBLOB")]
    #[serde(rename = "DefineBLOB")]
    DefineBlob,
    Delete,
    Set,
    #[strum(serialize = "SetBLOB")]
    #[serde(rename = "SetBLOB")]
    SetBlob,
    Message,
    TimeOut,
    GetProperties,
    /// Synthetic: a snapshot requested through a bridge, no protocol event.
    #[strum(serialize = "snapshot")]
    #[serde(rename = "snapshot")]
    Snapshot,
}

impl EventType {
    /// Events a snooping device is forwarded.
    pub fn is_snoopable(self) -> bool {
        matches!(
            self,
            Self::Define | Self::DefineBlob | Self::Delete | Self::Set | Self::SetBlob
        )
    }

    /// Events carrying BLOB payloads.
    pub fn carries_blob(self) -> bool {
        matches!(self, Self::SetBlob)
    }
}

/// Where the mutation behind a notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum Origin {
    /// This session's own devices or API calls; written to the wire.
    Local,
    /// Mirrored from the wire.
    Remote,
}

/// A state-change record with the snapshot taken right after the change.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event_type: EventType,
    pub device: Option<String>,
    pub vector: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub origin: Origin,
    /// Only set for `Message` and for updates sent with a message.
    pub message: Option<String>,
    pub snapshot: Arc<Snapshot>,
}

impl Notification {
    /// The affected vector as it was when this notification was emitted.
    pub fn vector_snapshot(&self) -> Option<&Vector> {
        self.snapshot
            .vector(self.device.as_deref()?, self.vector.as_deref()?)
    }

    /// Whether this notification concerns `device` (and `vector`, if given).
    ///
    /// Device-wide notifications (no vector) match any vector of the device.
    pub fn concerns(&self, device: &str, vector: Option<&str>) -> bool {
        if self.device.as_deref() != Some(device) {
            return false;
        }
        match (vector, self.vector.as_deref()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}
