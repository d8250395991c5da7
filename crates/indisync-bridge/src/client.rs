//! Synchronous side of the bridge.
//!
//! [`QueueClient::spawn`] assembles the session, starts the engine on a
//! dedicated thread with its own current-thread runtime, and hands back
//! the two queue endpoints. Nothing here blocks longer than the caller
//! asks: receive helpers poll at `poll_interval`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indisync_core::{
    BlobPolicy, BlobPolicyTable, MemberInput, Notification, SessionBuilder, Transport,
    UpdateSender,
};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{Command, QueueItem};
use crate::config::{BridgeConfig, EventQueuePolicy};
use crate::engine::{Engine, EventSink};
use crate::error::BridgeError;
use crate::state::{BridgeState, ShutdownHandle};

// ── Command sender ───────────────────────────────────────────────────

/// Producer end of the command queue. Clone it to submit from several
/// threads.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<QueueItem>,
}

impl CommandSender {
    /// Queue an item without waiting.
    pub fn send(&self, item: impl Into<QueueItem>) -> Result<(), BridgeError> {
        self.tx.try_send(item.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BridgeError::Stopped,
        })
    }

    /// Queue an item, waiting for room. Plain threads only.
    pub fn send_blocking(&self, item: impl Into<QueueItem>) -> Result<(), BridgeError> {
        self.tx
            .blocking_send(item.into())
            .map_err(|_| BridgeError::Stopped)
    }

    /// Queue a raw JSON command, parsed (or dropped) by the engine.
    pub fn send_raw(&self, raw: Value) -> Result<(), BridgeError> {
        self.send(QueueItem::Raw(raw))
    }
}

// ── Event receiver ───────────────────────────────────────────────────

enum EventSource {
    Bounded(mpsc::Receiver<Notification>),
    Latest(watch::Receiver<Option<Notification>>),
}

impl EventSource {
    fn try_recv(&mut self) -> Option<Notification> {
        match self {
            Self::Bounded(rx) => rx.try_recv().ok(),
            // Still readable after the engine has dropped its sender.
            Self::Latest(rx) => {
                let latest = rx.borrow_and_update();
                if latest.has_changed() {
                    latest.clone()
                } else {
                    None
                }
            }
        }
    }
}

fn event_channel(policy: EventQueuePolicy) -> (EventSink, EventSource) {
    match policy {
        EventQueuePolicy::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (EventSink::Bounded(tx), EventSource::Bounded(rx))
        }
        EventQueuePolicy::Latest => {
            let (tx, rx) = watch::channel(None);
            (EventSink::Latest(tx), EventSource::Latest(rx))
        }
    }
}

// ── Queue client ─────────────────────────────────────────────────────

/// A running session seen through two bounded queues.
pub struct QueueClient {
    commands: CommandSender,
    events: EventSource,
    state: watch::Receiver<BridgeState>,
    shutdown: ShutdownHandle,
    updates: UpdateSender,
    poll_interval: Duration,
    thread: Option<JoinHandle<()>>,
}

impl QueueClient {
    /// Build the session and start its engine thread.
    ///
    /// Identity is checked while building: duplicate device names fail
    /// here with `DuplicateIdentity`, before the transport is touched.
    pub fn spawn<T>(
        session: SessionBuilder,
        transport: T,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError>
    where
        T: Transport + 'static,
    {
        config.validate()?;
        let session = session.build()?;
        let name = session.config().name.clone();
        let updates = session.update_sender();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (sink, source) = event_channel(config.event_queue);
        let (state_tx, state_rx) = watch::channel(BridgeState::Connecting);
        let state_tx = Arc::new(state_tx);
        let cancel = CancellationToken::new();

        let engine = Engine {
            session,
            transport,
            commands: command_rx,
            events: sink,
            state: Arc::clone(&state_tx),
            cancel: cancel.clone(),
            blobs: BlobPolicyTable::new(config.default_blob_policy),
            backlog: VecDeque::new(),
            outgoing: VecDeque::new(),
            config: config.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(format!("indisync-{name}"))
            .spawn(move || runtime.block_on(engine.run()))?;
        info!(session = %name, "bridge started");

        Ok(Self {
            commands: CommandSender { tx: command_tx },
            events: source,
            state: state_rx,
            shutdown: ShutdownHandle {
                cancel,
                state: state_tx,
            },
            updates,
            poll_interval: config.poll_interval,
            thread: Some(thread),
        })
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// A clonable producer for the command queue.
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.commands.send(command)
    }

    pub fn send_raw(&self, raw: Value) -> Result<(), BridgeError> {
        self.commands.send_raw(raw)
    }

    pub fn submit<I, K, V>(&self, device: &str, vector: &str, values: I) -> Result<(), BridgeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MemberInput>,
    {
        self.send(Command::submit(device, vector, values))
    }

    pub fn set_blob_policy(
        &self,
        device: &str,
        vector: Option<&str>,
        policy: BlobPolicy,
    ) -> Result<(), BridgeError> {
        self.send(Command::BlobPolicy {
            device: device.to_owned(),
            vector: vector.map(str::to_owned),
            policy,
        })
    }

    /// Ask for one `snapshot` notification.
    pub fn request_snapshot(&self) -> Result<(), BridgeError> {
        self.send(Command::Snapshot)
    }

    /// Hardware-update handle for the session behind this bridge.
    pub fn update_sender(&self) -> UpdateSender {
        self.updates.clone()
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Next notification, if one is waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.events.try_recv()
    }

    /// Wait up to `timeout` for a notification, polling at the configured
    /// interval.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Notification> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(notification) = self.try_recv() {
                return Some(notification);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Notifications already queued, without waiting.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Poll until the bridge reaches `target` (or beyond) or `timeout`
    /// passes. Returns whether it got there.
    pub fn wait_for(&self, target: BridgeState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state() >= target {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Request a stop. Idempotent; returns immediately.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop and wait for the engine thread to finish.
    pub fn join(mut self) -> Result<(), BridgeError> {
        self.shutdown();
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<(), BridgeError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        thread.join().map_err(|_| BridgeError::ThreadPanicked)
    }
}

impl Drop for QueueClient {
    fn drop(&mut self) {
        self.shutdown();
        if self.join_thread().is_err() {
            debug!("bridge engine thread panicked");
        }
    }
}

impl std::fmt::Debug for QueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueClient")
            .field("state", &self.state())
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}
