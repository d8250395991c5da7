// ── Remote mirroring ──
//
// A client-side session keeps a copy of the devices it learns about from
// the wire. Mirrored mutations stage notifications with `Origin::Remote`
// so they reach local subscribers but are never echoed back.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{PropertyStore, define_event, set_event};
use crate::error::CoreError;
use crate::event::{EventType, Origin};
use crate::model::{Device, Vector};
use crate::session::protocol::SetVector;

impl PropertyStore {
    /// Store (or replace) a remote vector definition.
    pub(crate) fn mirror_define(&mut self, mut vector: Vector) {
        let device = vector.device.clone();
        let capacity = self.message_capacity;
        let entry = self.devices.entry(device.clone()).or_insert_with(|| {
            let mut d = Device::new(&device);
            d.set_message_capacity(capacity);
            d
        });
        entry.enable = true;
        vector.enable = true;
        let name = vector.name.clone();
        let message = vector.message.clone();
        let event = define_event(&vector);
        entry.upsert_vector(vector);
        self.stage(event, Some(&device), Some(&name), Origin::Remote, message);
    }

    /// Apply a remote value update to a mirrored vector.
    ///
    /// Members the mirror does not know, or whose type differs, are
    /// skipped; the remaining values still land.
    pub(crate) fn mirror_set(&mut self, update: SetVector) -> Result<(), CoreError> {
        let target = self.vector_mut(&update.device, &update.vector)?;
        for (member, value) in update.values {
            match target.set(&member, value) {
                Ok(()) => {}
                Err(CoreError::UnknownMember { .. }) => {
                    debug!(device = %update.device, vector = %update.vector, %member, "ignoring unknown member");
                }
                Err(e) => {
                    warn!(device = %update.device, vector = %update.vector, error = %e, "ignoring mismatched member");
                }
            }
        }
        if let Some(state) = update.state {
            target.state = state;
        }
        if let Some(timeout) = update.timeout {
            target.timeout = timeout;
        }
        target.message.clone_from(&update.message);
        target.timestamp = update.timestamp.or_else(|| Some(Utc::now()));
        let event = set_event(target);
        self.stage(
            event,
            Some(&update.device),
            Some(&update.vector),
            Origin::Remote,
            update.message,
        );
        Ok(())
    }

    /// Withdraw a mirrored vector, or a whole device when `vector` is `None`.
    pub(crate) fn mirror_delete(
        &mut self,
        device: &str,
        vector: Option<&str>,
        message: Option<String>,
    ) -> Result<(), CoreError> {
        match vector {
            Some(name) => self.vector_mut(device, name)?.enable = false,
            None => self.device_mut(device)?.enable = false,
        }
        self.stage(
            EventType::Delete,
            Some(device),
            vector,
            Origin::Remote,
            message,
        );
        Ok(())
    }

    /// Record a message received from the wire. Messages naming a device
    /// this store has not seen go to the session history.
    pub(crate) fn mirror_message(
        &mut self,
        device: Option<&str>,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.push_message(device, text, timestamp, Origin::Remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::model::{Member, MemberValue, PropertyState, VectorKind};

    fn remote_vector() -> Vector {
        let mut v = Vector::new("info", VectorKind::Text, vec![Member::text("status", "idle")])
            .unwrap();
        v.device = "remote".into();
        v
    }

    #[test]
    fn mirrors_define_set_and_delete() {
        let mut store = PropertyStore::new(&SessionConfig::default());
        store.mirror_define(remote_vector());
        assert!(!store.is_owned("remote"));

        store
            .mirror_set(SetVector {
                device: "remote".into(),
                vector: "info".into(),
                state: Some(PropertyState::Ok),
                timeout: None,
                message: Some("ready".into()),
                timestamp: None,
                values: vec![
                    ("status".into(), MemberValue::Text("busy".into())),
                    ("missing".into(), MemberValue::Text("x".into())),
                ],
            })
            .unwrap();
        store.mirror_delete("remote", Some("info"), None).unwrap();

        let events: Vec<_> = store.drain_staged();
        let types: Vec<_> = events.iter().map(|n| n.event_type).collect();
        assert_eq!(types, [EventType::Define, EventType::Set, EventType::Delete]);
        assert!(events.iter().all(|n| n.origin == Origin::Remote));

        let set = events[1].vector_snapshot().unwrap();
        assert_eq!(set.state, PropertyState::Ok);
        assert_eq!(set.member("status").and_then(|m| m.text_value()), Some("busy"));
        assert!(!store.vector("remote", "info").unwrap().enable);
    }

    #[test]
    fn updates_for_unknown_vectors_are_rejected() {
        let mut store = PropertyStore::new(&SessionConfig::default());
        let err = store
            .mirror_set(SetVector {
                device: "ghost".into(),
                vector: "v".into(),
                state: None,
                timeout: None,
                message: None,
                timestamp: None,
                values: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownDevice { .. }));
        assert!(store.drain_staged().is_empty());
    }
}
