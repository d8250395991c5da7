// ── Property store ──
//
// The authoritative devicename → Device mapping of one session. It is
// mutated only by the session's control loop (single writer, no locks);
// every mutation stages one notification carrying a fresh snapshot.

mod mirror;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::event::{EventType, Notification, Origin};
use crate::model::{Device, MemberInput, MessageLog, PropertyState, Vector};
use crate::snapshot::Snapshot;

/// Canonical state of a session.
#[derive(Debug)]
pub struct PropertyStore {
    devices: IndexMap<String, Device>,
    /// Devices registered at assembly; the rest are mirrored from the wire.
    owned: HashSet<String>,
    messages: MessageLog,
    message_capacity: usize,
    connected: bool,
    staged: VecDeque<Notification>,
}

impl PropertyStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            devices: IndexMap::new(),
            owned: HashSet::new(),
            messages: MessageLog::new(config.message_capacity),
            message_capacity: config.message_capacity,
            connected: false,
            staged: VecDeque::new(),
        }
    }

    /// Register a device owned by this session.
    ///
    /// Fails with `DuplicateIdentity` if the name is taken, and with
    /// `RuleViolation` if a switch vector starts in a state its rule forbids.
    pub fn add_device(&mut self, mut device: Device) -> Result<(), CoreError> {
        if self.devices.contains_key(&device.name) {
            return Err(CoreError::duplicate_device(&device.name));
        }
        for vector in device.vectors() {
            vector.validate_rule()?;
        }
        device.set_message_capacity(self.message_capacity);
        self.owned.insert(device.name.clone());
        self.devices.insert(device.name.clone(), device);
        Ok(())
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn is_owned(&self, device: &str) -> bool {
        self.owned.contains(device)
    }

    pub fn has_owned_devices(&self) -> bool {
        !self.owned.is_empty()
    }

    pub fn vector(&self, device: &str, vector: &str) -> Result<&Vector, CoreError> {
        self.devices
            .get(device)
            .ok_or_else(|| CoreError::UnknownDevice {
                device: device.to_owned(),
            })?
            .vector(vector)
            .ok_or_else(|| CoreError::unknown_vector(device, vector))
    }

    /// Mutable access for driver-side setters. Changes reach subscribers
    /// only through [`send_update`](Self::send_update).
    pub fn vector_mut(&mut self, device: &str, vector: &str) -> Result<&mut Vector, CoreError> {
        self.devices
            .get_mut(device)
            .ok_or_else(|| CoreError::UnknownDevice {
                device: device.to_owned(),
            })?
            .vector_mut(vector)
            .ok_or_else(|| CoreError::unknown_vector(device, vector))
    }

    fn device_mut(&mut self, device: &str) -> Result<&mut Device, CoreError> {
        self.devices
            .get_mut(device)
            .ok_or_else(|| CoreError::UnknownDevice {
                device: device.to_owned(),
            })
    }

    /// Whether a vector is currently visible to clients.
    fn is_visible(&self, device: &str, vector: &str) -> bool {
        self.devices
            .get(device)
            .is_some_and(|d| d.enable && d.vector(vector).is_some_and(|v| v.enable))
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Register a new vector under an existing device and advertise it.
    pub fn define_vector(&mut self, device: &str, vector: Vector) -> Result<(), CoreError> {
        vector.validate_rule()?;
        let name = vector.name.clone();
        let event = define_event(&vector);
        self.device_mut(device)?.add_vector(vector)?;
        if self.is_visible(device, &name) {
            self.stage(event, Some(device), Some(&name), Origin::Local, None);
        }
        Ok(())
    }

    /// Validate and apply a client's write to an owned vector.
    ///
    /// Withdrawn vectors (or vectors of a disabled device) are reported as
    /// unknown. Read-only vectors and switch submissions breaking the
    /// vector's rule are rejected without touching state; the error is logged and
    /// returned. No protocol-level reply is produced for a rejection.
    pub fn apply_incoming_write(
        &mut self,
        device: &str,
        vector: &str,
        values: &IndexMap<String, MemberInput>,
    ) -> Result<(), CoreError> {
        self.write(device, vector, values, true)
    }

    /// Apply a value submission from the driver itself; permission is
    /// not checked, the switch rule still is. A withdrawn vector takes the
    /// value silently.
    pub fn apply_local_write(
        &mut self,
        device: &str,
        vector: &str,
        values: &IndexMap<String, MemberInput>,
    ) -> Result<(), CoreError> {
        self.write(device, vector, values, false)
    }

    fn write(
        &mut self,
        device: &str,
        vector: &str,
        values: &IndexMap<String, MemberInput>,
        check_perm: bool,
    ) -> Result<(), CoreError> {
        let visible = self.is_visible(device, vector);
        let target = self.vector_mut(device, vector)?;
        if check_perm && !visible {
            warn!(device, vector, "dropping write to withdrawn vector");
            return Err(CoreError::unknown_vector(device, vector));
        }
        if check_perm && !target.perm().is_writable() {
            warn!(device, vector, "dropping write to read-only vector");
            return Err(CoreError::PermissionViolation {
                device: device.to_owned(),
                vector: vector.to_owned(),
            });
        }
        let changes = target.resolve_submission(values).inspect_err(|e| {
            warn!(device, vector, error = %e, "dropping invalid write");
        })?;
        target.apply(changes)?;
        target.timestamp = Some(Utc::now());
        target.message = None;
        let event = set_event(target);
        if !visible {
            debug!(device, vector, "vector disabled, write not announced");
            return Ok(());
        }
        self.stage(event, Some(device), Some(vector), Origin::Local, None);
        Ok(())
    }

    /// Stage a Set (or SetBLOB) for a vector changed through setters.
    ///
    /// A vector withdrawn from view is updated but not announced.
    pub fn send_update(
        &mut self,
        device: &str,
        vector: &str,
        message: Option<&str>,
        state: Option<PropertyState>,
    ) -> Result<(), CoreError> {
        let target = self.vector_mut(device, vector)?;
        if let Some(state) = state {
            target.state = state;
        }
        target.message = message.map(str::to_owned);
        target.timestamp = Some(Utc::now());
        let event = set_event(target);
        if !self.is_visible(device, vector) {
            debug!(device, vector, "vector disabled, update not sent");
            return Ok(());
        }
        self.stage(
            event,
            Some(device),
            Some(vector),
            Origin::Local,
            message.map(str::to_owned),
        );
        Ok(())
    }

    /// Re-advertise a vector's full definition.
    pub fn send_define(
        &mut self,
        device: &str,
        vector: &str,
        message: Option<&str>,
    ) -> Result<(), CoreError> {
        let target = self.vector_mut(device, vector)?;
        target.message = message.map(str::to_owned);
        let event = define_event(target);
        if !self.is_visible(device, vector) {
            debug!(device, vector, "vector disabled, definition not sent");
            return Ok(());
        }
        self.stage(
            event,
            Some(device),
            Some(vector),
            Origin::Local,
            message.map(str::to_owned),
        );
        Ok(())
    }

    /// Toggle a vector (or, with `vector = None`, a whole device).
    ///
    /// true → false stages `Delete`; false → true stages a full `Define`.
    /// Setting the current value is a no-op. Returns whether a
    /// notification was staged.
    pub fn set_enable(
        &mut self,
        device: &str,
        vector: Option<&str>,
        enabled: bool,
        message: Option<&str>,
    ) -> Result<bool, CoreError> {
        let Some(vector) = vector else {
            let target = self.device_mut(device)?;
            if target.enable == enabled {
                return Ok(false);
            }
            target.enable = enabled;
            let event = if enabled {
                EventType::Define
            } else {
                EventType::Delete
            };
            self.stage(event, Some(device), None, Origin::Local, message.map(str::to_owned));
            return Ok(true);
        };

        let target = self.vector_mut(device, vector)?;
        if target.enable == enabled {
            return Ok(false);
        }
        target.enable = enabled;
        target.message = message.map(str::to_owned);
        let event = if enabled {
            define_event(target)
        } else {
            EventType::Delete
        };
        if !self.device(device).is_some_and(|d| d.enable) {
            debug!(device, vector, "device disabled, toggle not announced");
            return Ok(false);
        }
        self.stage(
            event,
            Some(device),
            Some(vector),
            Origin::Local,
            message.map(str::to_owned),
        );
        Ok(true)
    }

    /// Append to a device's (or the session's) message history.
    pub fn record_message(
        &mut self,
        device: Option<&str>,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.push_message(device, text, timestamp, Origin::Local)
    }

    fn push_message(
        &mut self,
        device: Option<&str>,
        text: &str,
        timestamp: DateTime<Utc>,
        origin: Origin,
    ) -> Result<(), CoreError> {
        match device {
            Some(name) => match self.devices.get_mut(name) {
                Some(d) => d.messages.push(timestamp, text),
                None if origin == Origin::Remote => self.messages.push(timestamp, text),
                None => {
                    return Err(CoreError::UnknownDevice {
                        device: name.to_owned(),
                    });
                }
            },
            None => self.messages.push(timestamp, text),
        }
        let mut notification = self.notification(EventType::Message, device, None, origin);
        notification.timestamp = Some(timestamp);
        notification.message = Some(text.to_owned());
        self.staged.push_back(notification);
        Ok(())
    }

    // ── Snapshots and notifications ──────────────────────────────────

    /// Deep copy of every device, vector, member and the session messages.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.connected,
            self.devices.clone(),
            self.messages.iter().cloned().collect(),
        )
    }

    /// Build a notification without staging it.
    pub fn notification(
        &self,
        event_type: EventType,
        device: Option<&str>,
        vector: Option<&str>,
        origin: Origin,
    ) -> Notification {
        let timestamp = match (device, vector) {
            (Some(d), Some(v)) => self.vector(d, v).ok().and_then(|v| v.timestamp),
            _ => None,
        };
        Notification {
            event_type,
            device: device.map(str::to_owned),
            vector: vector.map(str::to_owned),
            timestamp: timestamp.or_else(|| Some(Utc::now())),
            origin,
            message: None,
            snapshot: Arc::new(self.snapshot()),
        }
    }

    fn stage(
        &mut self,
        event_type: EventType,
        device: Option<&str>,
        vector: Option<&str>,
        origin: Origin,
        message: Option<String>,
    ) {
        let mut notification = self.notification(event_type, device, vector, origin);
        notification.message = message;
        self.staged.push_back(notification);
    }

    pub(crate) fn stage_notification(&mut self, notification: Notification) {
        self.staged.push_back(notification);
    }

    /// Oldest staged notification.
    pub fn next_staged(&mut self) -> Option<Notification> {
        self.staged.pop_front()
    }

    /// All staged notifications in mutation order.
    pub fn drain_staged(&mut self) -> Vec<Notification> {
        self.staged.drain(..).collect()
    }

    /// Enabled definitions of owned devices, optionally narrowed to one
    /// device or one vector.
    pub(crate) fn definitions(&self, device: Option<&str>, vector: Option<&str>) -> Vec<Vector> {
        self.devices
            .values()
            .filter(|d| self.owned.contains(&d.name) && d.enable)
            .filter(|d| device.is_none_or(|name| d.name == name))
            .flat_map(|d| d.vectors())
            .filter(|v| v.enable && vector.is_none_or(|name| v.name == name))
            .cloned()
            .collect()
    }
}

fn define_event(vector: &Vector) -> EventType {
    if vector.is_blob() {
        EventType::DefineBlob
    } else {
        EventType::Define
    }
}

fn set_event(vector: &Vector) -> EventType {
    if vector.is_blob() {
        EventType::SetBlob
    } else {
        EventType::Set
    }
}
