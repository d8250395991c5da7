// ── Driver-side hooks ──
//
// Per-device driver data is passed explicitly: each owned device may
// carry a `DeviceHandler`, and every hook gets a `SessionContext` with
// mutable access to the store and the snoop registry.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::event::Notification;
use crate::snoop::{SnoopRegistry, SnoopTarget};
use crate::store::PropertyStore;

/// Mutable view of a running session, handed to hooks and updates.
pub struct SessionContext<'a> {
    pub store: &'a mut PropertyStore,
    snoops: &'a mut SnoopRegistry,
    default_snoop_timeout: Option<Duration>,
    now: Instant,
}

impl<'a> SessionContext<'a> {
    pub(crate) fn new(
        store: &'a mut PropertyStore,
        snoops: &'a mut SnoopRegistry,
        default_snoop_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            snoops,
            default_snoop_timeout,
            now: Instant::now(),
        }
    }

    /// Engine time at which this context was created.
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Have `snooper` receive Define/Delete/Set traffic for `device`
    /// (one vector, or all of them).
    ///
    /// Re-registering re-arms the watch. Without an explicit timeout the
    /// session default applies.
    pub fn snoop(
        &mut self,
        snooper: &str,
        device: &str,
        vector: Option<&str>,
        timeout: Option<Duration>,
    ) {
        self.snoops.register(
            snooper,
            SnoopTarget::new(device, vector),
            timeout.or(self.default_snoop_timeout),
            self.now,
        );
    }
}

/// Driver logic attached to one owned device.
///
/// Every hook runs on the engine; it must not block. Returned errors are
/// logged and otherwise absorbed.
pub trait DeviceHandler: Send {
    /// Called once when the session starts, before any traffic.
    fn on_start(&mut self, _ctx: &mut SessionContext<'_>, _device: &str) -> Result<(), CoreError> {
        Ok(())
    }

    /// A client write to `device`/`vector` was accepted and applied.
    fn on_write(
        &mut self,
        _ctx: &mut SessionContext<'_>,
        _device: &str,
        _vector: &str,
    ) -> Result<(), CoreError> {
        Ok(())
    }

    /// Snooped traffic, or a `TimeOut` for a quiet snoop target.
    fn on_snoop(
        &mut self,
        _ctx: &mut SessionContext<'_>,
        _notification: &Notification,
    ) -> Result<(), CoreError> {
        Ok(())
    }
}

// ── Hardware updates ──

/// A closure run on the engine with a [`SessionContext`].
pub type Update = Box<dyn FnOnce(&mut SessionContext<'_>) -> Result<(), CoreError> + Send>;

/// Lets hardware tasks and threads change state on a running session.
///
/// Notifications staged by an update are flushed as soon as it returns.
#[derive(Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<Update>,
}

impl UpdateSender {
    pub(crate) fn new(tx: mpsc::Sender<Update>) -> Self {
        Self { tx }
    }

    pub async fn send<F>(&self, update: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut SessionContext<'_>) -> Result<(), CoreError> + Send + 'static,
    {
        self.tx
            .send(Box::new(update))
            .await
            .map_err(|_| CoreError::SessionClosed)
    }

    /// Blocking variant for plain threads. Must not be called from
    /// within an async context.
    pub fn blocking_send<F>(&self, update: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut SessionContext<'_>) -> Result<(), CoreError> + Send + 'static,
    {
        self.tx
            .blocking_send(Box::new(update))
            .map_err(|_| CoreError::SessionClosed)
    }
}

impl std::fmt::Debug for UpdateSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
