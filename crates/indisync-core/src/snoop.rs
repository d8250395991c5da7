// ── Snooping ──
//
// A device registers interest in another device's vectors and is then
// forwarded every Define/Delete/Set notification for that target, tagged
// with the target's names. With a timeout, silence longer than the window
// produces one `TimeOut` and disarms the watch until re-registered.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::event::Notification;

/// The device (and optionally vector) being snooped on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnoopTarget {
    pub device: String,
    pub vector: Option<String>,
}

impl SnoopTarget {
    pub fn new(device: impl Into<String>, vector: Option<&str>) -> Self {
        Self {
            device: device.into(),
            vector: vector.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone)]
struct Watch {
    snooper: String,
    target: SnoopTarget,
    timeout: Option<Duration>,
    /// `None` once the timeout has fired, or when no timeout was asked for.
    deadline: Option<Instant>,
}

/// A snoop watch that went quiet past its timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
    pub snooper: String,
    pub target: SnoopTarget,
}

/// All snoop registrations of one session.
#[derive(Debug, Default)]
pub struct SnoopRegistry {
    watches: Vec<Watch>,
    /// Targets newly registered, to be requested on the wire.
    requests: Vec<SnoopTarget>,
}

impl SnoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-arm) `snooper`'s watch on `target`.
    pub fn register(
        &mut self,
        snooper: &str,
        target: SnoopTarget,
        timeout: Option<Duration>,
        now: Instant,
    ) {
        let deadline = timeout.map(|t| now + t);
        if let Some(watch) = self
            .watches
            .iter_mut()
            .find(|w| w.snooper == snooper && w.target == target)
        {
            watch.timeout = timeout;
            watch.deadline = deadline;
        } else {
            self.watches.push(Watch {
                snooper: snooper.to_owned(),
                target: target.clone(),
                timeout,
                deadline,
            });
        }
        debug!(snooper, device = %target.device, vector = ?target.vector, ?timeout, "snoop registered");
        self.requests.push(target);
    }

    /// Snoopers to forward `notification` to, pushing their deadlines out.
    ///
    /// Each snooper appears once even if several of its watches match.
    pub fn observe(&mut self, notification: &Notification, now: Instant) -> Vec<String> {
        if !notification.event_type.is_snoopable() {
            return Vec::new();
        }
        let mut snoopers: Vec<String> = Vec::new();
        for watch in &mut self.watches {
            if !notification.concerns(&watch.target.device, watch.target.vector.as_deref()) {
                continue;
            }
            if let (Some(timeout), Some(_)) = (watch.timeout, watch.deadline) {
                watch.deadline = Some(now + timeout);
            }
            if !snoopers.contains(&watch.snooper) {
                snoopers.push(watch.snooper.clone());
            }
        }
        snoopers
    }

    /// Watches whose deadline has passed; each fires once.
    pub fn expire(&mut self, now: Instant) -> Vec<Expired> {
        let mut expired = Vec::new();
        for watch in &mut self.watches {
            if watch.deadline.is_some_and(|d| d <= now) {
                watch.deadline = None;
                expired.push(Expired {
                    snooper: watch.snooper.clone(),
                    target: watch.target.clone(),
                });
            }
        }
        expired
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.watches.iter().filter_map(|w| w.deadline).min()
    }

    pub(crate) fn take_requests(&mut self) -> Vec<SnoopTarget> {
        std::mem::take(&mut self.requests)
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}
