// ── Session engine ──
//
// Owns the property store and performs every mutation and all wire I/O
// on a single task. Embedders either call `run` (stand-alone drivers) or
// drive the step API themselves (the bridge), interleaving:
//
//   inbound message / command / update → store mutation → staged
//   notification → `next_notification` (snoop routing, wire conversion)
//   → `flush` to the transport.

pub mod handler;
pub mod protocol;
pub mod transport;

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blob::{BlobPolicy, BlobPolicyTable};
use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::event::{EventType, Notification, Origin};
use crate::model::{Device, MemberInput};
use crate::snoop::SnoopRegistry;
use crate::store::PropertyStore;

pub use handler::{DeviceHandler, SessionContext, Update, UpdateSender};
pub use protocol::{NewVector, ProtocolMessage, SetVector};
pub use transport::{DetachedTransport, MemoryTransport, Transport};

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles a session from its owned devices.
///
/// Identity is checked eagerly in [`build`](Self::build): a repeated
/// device name fails there, before any transport is opened.
pub struct SessionBuilder {
    config: SessionConfig,
    devices: Vec<Device>,
    handlers: Vec<(String, Box<dyn DeviceHandler>)>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            devices: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    pub fn devices(mut self, devices: impl IntoIterator<Item = Device>) -> Self {
        self.devices.extend(devices);
        self
    }

    /// Attach driver logic to an owned device.
    pub fn handler(mut self, device: impl Into<String>, handler: impl DeviceHandler + 'static) -> Self {
        self.handlers.push((device.into(), Box::new(handler)));
        self
    }

    pub fn build(self) -> Result<Session, CoreError> {
        let mut store = PropertyStore::new(&self.config);
        for device in self.devices {
            let name = device.name.clone();
            store.add_device(device).inspect_err(|e| {
                warn!(session = %self.config.name, device = %name, error = %e, "session assembly failed");
            })?;
        }

        let mut handlers = HashMap::with_capacity(self.handlers.len());
        for (device, handler) in self.handlers {
            if !store.is_owned(&device) {
                return Err(CoreError::UnknownDevice { device });
            }
            if handlers.insert(device.clone(), handler).is_some() {
                return Err(CoreError::DuplicateIdentity {
                    what: "handler",
                    name: device,
                });
            }
        }

        let (updates_tx, updates_rx) = mpsc::channel(self.config.update_capacity.max(1));
        Ok(Session {
            wire_blobs: BlobPolicyTable::new(self.config.peer_blob_policy),
            config: self.config,
            store,
            snoops: SnoopRegistry::new(),
            handlers,
            outbox: VecDeque::new(),
            updates_tx,
            updates_rx,
            started: false,
        })
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// One protocol session: a property store plus its wire endpoint logic.
pub struct Session {
    config: SessionConfig,
    store: PropertyStore,
    snoops: SnoopRegistry,
    handlers: HashMap<String, Box<dyn DeviceHandler>>,
    /// The peer's BLOB policy for traffic this session writes.
    wire_blobs: BlobPolicyTable,
    outbox: VecDeque<ProtocolMessage>,
    updates_tx: mpsc::Sender<Update>,
    updates_rx: mpsc::Receiver<Update>,
    started: bool,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Direct store access for the embedding task. Notifications staged
    /// here go out with the next `next_notification`/`flush` cycle.
    pub fn store_mut(&mut self) -> &mut PropertyStore {
        &mut self.store
    }

    pub fn connected(&self) -> bool {
        self.store.connected()
    }

    pub fn update_sender(&self) -> UpdateSender {
        UpdateSender::new(self.updates_tx.clone())
    }

    /// Run `f` with a context over this session's state.
    pub fn with_context<R>(&mut self, f: impl FnOnce(&mut SessionContext<'_>) -> R) -> R {
        let mut ctx = SessionContext::new(
            &mut self.store,
            &mut self.snoops,
            self.config.default_snoop_timeout,
        );
        f(&mut ctx)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run start-up hooks, open the transport and mark the session live.
    ///
    /// A session without owned devices asks its peer for every
    /// definition once connected.
    pub async fn start<T: Transport>(&mut self, transport: &mut T) -> Result<(), CoreError> {
        if !self.started {
            self.started = true;
            self.run_start_hooks();
        }
        transport.open().await?;
        self.store.set_connected(true);
        if !self.store.has_owned_devices() {
            self.outbox.push_back(ProtocolMessage::GetProperties {
                device: None,
                vector: None,
            });
        }
        info!(
            session = %self.config.name,
            devices = self.store.devices().count(),
            "session connected"
        );
        Ok(())
    }

    fn run_start_hooks(&mut self) {
        let Self {
            store,
            snoops,
            handlers,
            config,
            ..
        } = self;
        for (device, handler) in handlers.iter_mut() {
            let mut ctx = SessionContext::new(store, snoops, config.default_snoop_timeout);
            if let Err(e) = handler.on_start(&mut ctx, device) {
                warn!(%device, error = %e, "device start hook failed");
            }
        }
    }

    /// Record a dead transport. State is kept; snapshots report
    /// `connected = false` from here on.
    pub fn transport_lost(&mut self, error: &CoreError) {
        if self.store.connected() {
            warn!(session = %self.config.name, %error, "transport lost");
        }
        self.store.set_connected(false);
        self.outbox.clear();
    }

    /// Stand-alone main loop for sessions without a bridge.
    ///
    /// Returns when `cancel` fires. The transport is closed on exit.
    pub async fn run<T: Transport>(
        &mut self,
        mut transport: T,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        self.start(&mut transport).await?;
        loop {
            while let Some(notification) = self.next_notification() {
                debug!(
                    event = %notification.event_type,
                    device = ?notification.device,
                    vector = ?notification.vector,
                    "notification"
                );
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.flush(&mut transport) => {}
            }

            let deadline = self.next_deadline();
            let connected = self.connected();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(update) = self.updates_rx.recv() => self.apply_update(update),
                received = transport.recv(), if connected => match received {
                    Ok(message) => self.handle_inbound(message),
                    Err(e) => self.transport_lost(&e),
                },
                () = sleep_until_deadline(deadline) => self.expire_snoops(Instant::now()),
            }
        }
        transport.close().await;
        self.store.set_connected(false);
        info!(session = %self.config.name, "session stopped");
        Ok(())
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Apply one message received from the wire.
    ///
    /// Owned devices accept writes only; remote devices are mirrored.
    /// Failures are logged and absorbed.
    pub fn handle_inbound(&mut self, message: ProtocolMessage) {
        debug!(kind = message.kind(), device = ?message.device(), "inbound");
        match message {
            ProtocolMessage::GetProperties { device, vector } => {
                for definition in self.store.definitions(device.as_deref(), vector.as_deref()) {
                    self.outbox
                        .push_back(ProtocolMessage::DefVector(Box::new(definition)));
                }
                let notification = self.store.notification(
                    EventType::GetProperties,
                    device.as_deref(),
                    vector.as_deref(),
                    Origin::Remote,
                );
                self.store.stage_notification(notification);
            }
            ProtocolMessage::DefVector(vector) => {
                if self.store.is_owned(&vector.device) {
                    debug!(device = %vector.device, "ignoring remote definition of owned device");
                } else {
                    self.store.mirror_define(*vector);
                }
            }
            ProtocolMessage::SetVector(update) => {
                if self.store.is_owned(&update.device) {
                    debug!(device = %update.device, "ignoring remote update of owned device");
                } else if let Err(e) = self.store.mirror_set(update) {
                    debug!(error = %e, "ignoring update for unknown vector");
                }
            }
            ProtocolMessage::NewVector(write) => self.handle_write(&write),
            ProtocolMessage::DelProperty {
                device,
                vector,
                message,
            } => {
                if self.store.is_owned(&device) {
                    debug!(%device, "ignoring remote delete of owned device");
                } else if let Err(e) =
                    self.store.mirror_delete(&device, vector.as_deref(), message)
                {
                    debug!(error = %e, "ignoring delete for unknown target");
                }
            }
            ProtocolMessage::Message {
                device,
                message,
                timestamp,
            } => {
                if let Err(e) = self.store.mirror_message(device.as_deref(), &message, timestamp) {
                    debug!(error = %e, "ignoring message");
                }
            }
            ProtocolMessage::EnableBlob {
                device,
                vector,
                policy,
            } => {
                debug!(%device, ?vector, %policy, "peer BLOB policy");
                self.wire_blobs.set(&device, vector.as_deref(), policy);
            }
        }
    }

    fn handle_write(&mut self, write: &NewVector) {
        if !self.store.is_owned(&write.device) {
            debug!(device = %write.device, "ignoring write for device not served here");
            return;
        }
        if self
            .store
            .apply_incoming_write(&write.device, &write.vector, &write.values)
            .is_err()
        {
            return;
        }
        self.after_write(&write.device, &write.vector);
    }

    fn after_write(&mut self, device: &str, vector: &str) {
        let Self {
            store,
            snoops,
            handlers,
            config,
            ..
        } = self;
        if let Some(handler) = handlers.get_mut(device) {
            let mut ctx = SessionContext::new(store, snoops, config.default_snoop_timeout);
            if let Err(e) = handler.on_write(&mut ctx, device, vector) {
                warn!(%device, %vector, error = %e, "write hook failed");
            }
        }
    }

    // ── Local requests ───────────────────────────────────────────────

    /// Submit new values for a vector.
    ///
    /// For an owned device the values are applied here (rule checked,
    /// permission not) and the device's `on_write` hook runs. For a
    /// remote device the write is checked against the mirror and sent to
    /// its owner; the mirror changes only when the owner answers.
    pub fn submit(
        &mut self,
        device: &str,
        vector: &str,
        values: &IndexMap<String, MemberInput>,
    ) -> Result<(), CoreError> {
        if self.store.is_owned(device) {
            self.store.apply_local_write(device, vector, values)?;
            self.after_write(device, vector);
            return Ok(());
        }

        let target = self.store.vector(device, vector)?;
        if !target.perm().is_writable() {
            warn!(device, vector, "not sending write to read-only vector");
            return Err(CoreError::PermissionViolation {
                device: device.to_owned(),
                vector: vector.to_owned(),
            });
        }
        target.resolve_submission(values).inspect_err(|e| {
            warn!(device, vector, error = %e, "not sending invalid write");
        })?;
        self.outbox.push_back(ProtocolMessage::NewVector(NewVector {
            device: device.to_owned(),
            vector: vector.to_owned(),
            timestamp: Some(chrono::Utc::now()),
            values: values.clone(),
        }));
        Ok(())
    }

    /// Ask the owner of a remote device for a BLOB policy. Owned devices
    /// need no negotiation and are skipped.
    pub fn request_blobs(&mut self, device: &str, vector: Option<&str>, policy: BlobPolicy) {
        if self.store.is_owned(device) {
            return;
        }
        self.outbox.push_back(ProtocolMessage::EnableBlob {
            device: device.to_owned(),
            vector: vector.map(str::to_owned),
            policy,
        });
    }

    /// A synthetic notification carrying the current snapshot.
    pub fn snapshot_notification(&self) -> Notification {
        self.store
            .notification(EventType::Snapshot, None, None, Origin::Local)
    }

    // ── Hardware updates ─────────────────────────────────────────────

    /// Next closure queued through an [`UpdateSender`].
    ///
    /// Never resolves to `None` while the session is alive, since it
    /// keeps a sender of its own.
    pub async fn recv_update(&mut self) -> Option<Update> {
        self.updates_rx.recv().await
    }

    pub fn apply_update(&mut self, update: Update) {
        if let Err(e) = self.with_context(update) {
            warn!(session = %self.config.name, error = %e, "hardware update failed");
        }
    }

    // ── Snoop timers ─────────────────────────────────────────────────

    pub fn next_deadline(&self) -> Option<Instant> {
        self.snoops.next_deadline()
    }

    /// Deliver one `TimeOut` to each snooper whose watch went quiet.
    pub fn expire_snoops(&mut self, now: Instant) {
        for expired in self.snoops.expire(now) {
            debug!(
                snooper = %expired.snooper,
                device = %expired.target.device,
                vector = ?expired.target.vector,
                "snoop timed out"
            );
            let notification = self.store.notification(
                EventType::TimeOut,
                Some(&expired.target.device),
                expired.target.vector.as_deref(),
                Origin::Local,
            );
            self.deliver_snoop(&expired.snooper, &notification);
        }
    }

    fn deliver_snoop(&mut self, snooper: &str, notification: &Notification) {
        let Self {
            store,
            snoops,
            handlers,
            config,
            ..
        } = self;
        let Some(handler) = handlers.get_mut(snooper) else {
            debug!(%snooper, "snooper has no handler");
            return;
        };
        let mut ctx = SessionContext::new(store, snoops, config.default_snoop_timeout);
        if let Err(e) = handler.on_snoop(&mut ctx, notification) {
            warn!(%snooper, error = %e, "snoop hook failed");
        }
    }

    // ── Fan-out ──────────────────────────────────────────────────────

    /// Take the oldest staged notification, forwarding it to snooping
    /// devices and queueing its wire form.
    ///
    /// Snoop hooks may stage further notifications; they come out of
    /// later calls, after this one.
    pub fn next_notification(&mut self) -> Option<Notification> {
        let notification = self.store.next_staged()?;
        for snooper in self.snoops.observe(&notification, Instant::now()) {
            self.deliver_snoop(&snooper, &notification);
        }
        if notification.origin == Origin::Local {
            self.queue_wire(&notification);
        }
        Some(notification)
    }

    fn queue_wire(&mut self, notification: &Notification) {
        let device = notification.device.as_deref();
        let vector = notification.vector.as_deref();
        let snapshot = &notification.snapshot;
        match notification.event_type {
            EventType::Define | EventType::DefineBlob => {
                let Some(device) = device.and_then(|d| snapshot.device(d)) else {
                    return;
                };
                for definition in device
                    .vectors()
                    .filter(|v| v.enable && vector.is_none_or(|name| v.name == name))
                {
                    self.outbox
                        .push_back(ProtocolMessage::DefVector(Box::new(definition.clone())));
                }
            }
            EventType::Set | EventType::SetBlob => {
                if !self.wire_blobs.admits(notification) {
                    debug!(?device, ?vector, "withheld by peer BLOB policy");
                    return;
                }
                if let Some(v) = notification.vector_snapshot() {
                    self.outbox
                        .push_back(ProtocolMessage::SetVector(SetVector::from_vector(v)));
                }
            }
            EventType::Delete => {
                if let Some(device) = device {
                    self.outbox.push_back(ProtocolMessage::DelProperty {
                        device: device.to_owned(),
                        vector: vector.map(str::to_owned),
                        message: notification.message.clone(),
                    });
                }
            }
            EventType::Message => {
                self.outbox.push_back(ProtocolMessage::Message {
                    device: device.map(str::to_owned),
                    message: notification.message.clone().unwrap_or_default(),
                    timestamp: notification.timestamp.unwrap_or_else(chrono::Utc::now),
                });
            }
            EventType::TimeOut | EventType::GetProperties | EventType::Snapshot => {}
        }
    }

    /// Write queued wire messages in order. A send failure marks the
    /// transport lost and drops the rest.
    pub async fn flush<T: Transport>(&mut self, transport: &mut T) {
        for target in self.snoops.take_requests() {
            self.outbox.push_back(ProtocolMessage::GetProperties {
                device: Some(target.device),
                vector: target.vector,
            });
        }
        if !self.store.connected() {
            if !self.outbox.is_empty() {
                debug!(dropped = self.outbox.len(), "not connected, discarding outbound");
                self.outbox.clear();
            }
            return;
        }
        while let Some(message) = self.outbox.pop_front() {
            if let Err(e) = transport.send(message).await {
                self.transport_lost(&e);
                return;
            }
        }
    }

    /// Wire messages waiting for the next flush.
    pub fn pending_outbound(&self) -> usize {
        self.outbox.len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.config.name)
            .field("connected", &self.store.connected())
            .field("handlers", &self.handlers.len())
            .field("outbox", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

/// Sleep until `deadline`, or forever without one.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
