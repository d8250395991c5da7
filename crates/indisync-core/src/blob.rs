// ── BLOB delivery policy ──
//
// BLOB payloads can be large, so each subscriber negotiates whether it
// receives them. Policies are set per (device, optional vector) target;
// a vector-specific entry overrides the device-wide one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::event::{EventType, Notification};

/// Whether a subscriber receives BLOB payloads for a target.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum BlobPolicy {
    /// No BLOB payloads (protocol default).
    #[default]
    Never,
    /// BLOB payloads in addition to everything else.
    Also,
    /// BLOB payloads only; other value updates for the target are withheld.
    Only,
}

/// One subscriber's BLOB policies.
#[derive(Debug, Clone, Default)]
pub struct BlobPolicyTable {
    default: BlobPolicy,
    entries: HashMap<(String, Option<String>), BlobPolicy>,
}

impl BlobPolicyTable {
    pub fn new(default: BlobPolicy) -> Self {
        Self {
            default,
            entries: HashMap::new(),
        }
    }

    pub fn set(&mut self, device: &str, vector: Option<&str>, policy: BlobPolicy) {
        self.entries
            .insert((device.to_owned(), vector.map(str::to_owned)), policy);
    }

    pub fn policy_for(&self, device: &str, vector: Option<&str>) -> BlobPolicy {
        if let Some(vector) = vector {
            if let Some(policy) = self
                .entries
                .get(&(device.to_owned(), Some(vector.to_owned())))
            {
                return *policy;
            }
        }
        self.entries
            .get(&(device.to_owned(), None))
            .copied()
            .unwrap_or(self.default)
    }

    /// Whether a notification passes this subscriber's policy.
    pub fn admits(&self, notification: &Notification) -> bool {
        let Some(device) = notification.device.as_deref() else {
            return true;
        };
        let policy = self.policy_for(device, notification.vector.as_deref());
        match notification.event_type {
            EventType::SetBlob => policy != BlobPolicy::Never,
            EventType::Set => policy != BlobPolicy::Only,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_entry_overrides_device_entry() {
        let mut table = BlobPolicyTable::default();
        assert_eq!(table.policy_for("cam", Some("image")), BlobPolicy::Never);

        table.set("cam", None, BlobPolicy::Also);
        table.set("cam", Some("preview"), BlobPolicy::Never);

        assert_eq!(table.policy_for("cam", Some("image")), BlobPolicy::Also);
        assert_eq!(table.policy_for("cam", Some("preview")), BlobPolicy::Never);
        assert_eq!(table.policy_for("other", None), BlobPolicy::Never);
    }

    #[test]
    fn parses_tokens() {
        assert_eq!("Only".parse::<BlobPolicy>().ok(), Some(BlobPolicy::Only));
        assert!("Sometimes".parse::<BlobPolicy>().is_err());
    }
}
