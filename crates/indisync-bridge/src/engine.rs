//! Engine side of the bridge.
//!
//! Runs on the bridge's own single-threaded runtime. Owns the session and
//! the transport, multiplexes commands, wire traffic, hardware updates and
//! snoop timers, and feeds every notification to the consumer's queue in
//! emission order.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use indisync_core::session::sleep_until_deadline;
use indisync_core::{BlobPolicyTable, Notification, Session, Transport};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, QueueItem};
use crate::config::BridgeConfig;
use crate::state::{BridgeState, advance};

/// Where the engine puts notifications for the consumer.
pub(crate) enum EventSink {
    Bounded(mpsc::Sender<Notification>),
    Latest(watch::Sender<Option<Notification>>),
}

pub(crate) struct Engine<T> {
    pub(crate) session: Session,
    pub(crate) transport: T,
    pub(crate) commands: mpsc::Receiver<QueueItem>,
    pub(crate) events: EventSink,
    pub(crate) state: Arc<watch::Sender<BridgeState>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) config: BridgeConfig,
    /// The consumer's BLOB policy.
    pub(crate) blobs: BlobPolicyTable,
    /// Commands read while backing off on a full event queue.
    pub(crate) backlog: VecDeque<QueueItem>,
    /// Notifications taken from the session, not yet delivered.
    pub(crate) outgoing: VecDeque<Notification>,
}

impl<T: Transport> Engine<T> {
    pub(crate) async fn run(mut self) {
        match self.session.start(&mut self.transport).await {
            Ok(()) => {
                advance(&self.state, BridgeState::Connected);
            }
            Err(e) => {
                warn!(error = %e, "transport did not open; serving local state only");
                self.session.transport_lost(&e);
            }
        }

        loop {
            if self.deliver_pending().await.is_break() {
                break;
            }
            // A peer that stops reading must not hold off shutdown.
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = self.session.flush(&mut self.transport) => {}
            }

            if let Some(item) = self.backlog.pop_front() {
                if self.handle(item).is_break() {
                    break;
                }
                continue;
            }

            let deadline = self.session.next_deadline();
            let connected = self.session.connected();
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                item = self.commands.recv() => {
                    let Some(item) = item else {
                        debug!("command queue closed");
                        break;
                    };
                    if self.handle(item).is_break() {
                        break;
                    }
                }
                Some(update) = self.session.recv_update() => self.session.apply_update(update),
                received = self.transport.recv(), if connected => match received {
                    Ok(message) => self.session.handle_inbound(message),
                    Err(e) => self.session.transport_lost(&e),
                },
                () = sleep_until_deadline(deadline) => self.session.expire_snoops(Instant::now()),
            }
        }

        self.stop().await;
    }

    fn handle(&mut self, item: QueueItem) -> ControlFlow<()> {
        let command = match item {
            QueueItem::Command(command) => command,
            QueueItem::Raw(raw) => match Command::from_raw(&raw) {
                Ok(command) => command,
                Err(e) => {
                    debug!(error = %e, "dropping malformed command");
                    return ControlFlow::Continue(());
                }
            },
        };

        match command {
            Command::Stop => {
                info!("stop requested through command queue");
                self.cancel.cancel();
                return ControlFlow::Break(());
            }
            Command::Snapshot => {
                // Keep emission order: anything staged first goes ahead.
                while let Some(n) = self.session.next_notification() {
                    self.outgoing.push_back(n);
                }
                self.outgoing.push_back(self.session.snapshot_notification());
            }
            Command::Submit {
                device,
                vector,
                values,
            } => {
                if let Err(e) = self.session.submit(&device, &vector, &values) {
                    debug!(%device, %vector, error = %e, "submission dropped");
                }
            }
            Command::BlobPolicy {
                device,
                vector,
                policy,
            } => {
                debug!(%device, ?vector, %policy, "consumer BLOB policy");
                self.blobs.set(&device, vector.as_deref(), policy);
                self.session.request_blobs(&device, vector.as_deref(), policy);
            }
        }
        ControlFlow::Continue(())
    }

    /// Hand every pending notification to the consumer, in order.
    async fn deliver_pending(&mut self) -> ControlFlow<()> {
        loop {
            while let Some(n) = self.session.next_notification() {
                self.outgoing.push_back(n);
            }
            let Some(notification) = self.outgoing.pop_front() else {
                return ControlFlow::Continue(());
            };
            if !self.blobs.admits(&notification) {
                debug!(
                    event = %notification.event_type,
                    device = ?notification.device,
                    vector = ?notification.vector,
                    "withheld by consumer BLOB policy"
                );
                continue;
            }
            self.deliver(notification).await?;
        }
    }

    async fn deliver(&mut self, notification: Notification) -> ControlFlow<()> {
        let tx = match &self.events {
            EventSink::Latest(tx) => {
                tx.send_replace(Some(notification));
                return ControlFlow::Continue(());
            }
            EventSink::Bounded(tx) => tx,
        };

        let mut pending = notification;
        loop {
            match tx.try_send(pending) {
                Ok(()) => return ControlFlow::Continue(()),
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("event consumer gone; notification discarded");
                    return ControlFlow::Continue(());
                }
                Err(mpsc::error::TrySendError::Full(n)) => pending = n,
            }

            debug!(backoff = ?self.config.backoff, "event queue full, retrying");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return ControlFlow::Break(()),
                () = tokio::time::sleep(self.config.backoff) => {}
            }

            // A stop sentinel must not wait behind a wedged consumer.
            while self.backlog.len() < self.config.command_capacity {
                let Ok(item) = self.commands.try_recv() else {
                    break;
                };
                if item.is_stop() {
                    info!("stop requested while event queue full");
                    self.cancel.cancel();
                    return ControlFlow::Break(());
                }
                self.backlog.push_back(item);
            }
        }
    }

    async fn stop(mut self) {
        self.cancel.cancel();
        advance(&self.state, BridgeState::Stopping);
        if self.session.pending_outbound() > 0
            && tokio::time::timeout(
                self.config.poll_interval,
                self.session.flush(&mut self.transport),
            )
            .await
            .is_err()
        {
            warn!("final flush timed out; outbound messages dropped");
        }
        self.transport.close().await;
        advance(&self.state, BridgeState::Stopped);
        info!(session = %self.session.config().name, "bridge stopped");
    }
}
