// ── Session snapshots ──
//
// An immutable deep copy of the store, taken atomically by the session's
// single writer and shared behind an `Arc`. Nothing hands out `&mut`
// access to a snapshot once it has been built.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::{Device, Member, Message, Vector};

/// Point-in-time view of every device, vector and member in a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    /// Whether the session's transport was live when the snapshot was taken.
    pub connected: bool,
    devices: IndexMap<String, Device>,
    messages: Vec<Message>,
}

impl Snapshot {
    pub(crate) fn new(
        connected: bool,
        devices: IndexMap<String, Device>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            taken_at: Utc::now(),
            connected,
            devices,
            messages,
        }
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn vector(&self, device: &str, vector: &str) -> Option<&Vector> {
        self.devices.get(device)?.vector(vector)
    }

    pub fn member(&self, device: &str, vector: &str, member: &str) -> Option<&Member> {
        self.vector(device, vector)?.member(member)
    }

    /// Session-wide messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// JSON export. BLOB members are exported as size/format only.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
