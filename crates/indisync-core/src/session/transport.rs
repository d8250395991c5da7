// ── Transport contract ──
//
// The session needs only an ordered, cooperative message pipe. Wire
// encoding, sockets and reconnection live behind this trait.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::debug;

use super::protocol::ProtocolMessage;
use crate::error::CoreError;

/// Default per-direction buffer of [`MemoryTransport::pair`].
pub const DEFAULT_MEMORY_CAPACITY: usize = 64;

/// A bidirectional, FIFO message pipe.
///
/// `recv` must be cancel-safe: the engine polls it inside `select!` and
/// drops the future whenever another branch wins.
pub trait Transport: Send {
    fn open(&mut self) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Next inbound message; `TransportLost` once the peer is gone.
    fn recv(&mut self) -> impl Future<Output = Result<ProtocolMessage, CoreError>> + Send;

    fn send(
        &mut self,
        message: ProtocolMessage,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

// ── In-memory transport ─────────────────────────────────────────────

/// One end of an in-process connection.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<mpsc::Sender<ProtocolMessage>>,
    rx: mpsc::Receiver<ProtocolMessage>,
}

impl MemoryTransport {
    /// Two connected endpoints. Dropping or closing one is seen as
    /// transport loss by the other.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let capacity = capacity.max(1);
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Some(a_tx),
                rx: a_rx,
            },
            Self {
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }

    fn lost(reason: &str) -> CoreError {
        CoreError::TransportLost {
            reason: reason.to_owned(),
        }
    }
}

impl Transport for MemoryTransport {
    async fn open(&mut self) -> Result<(), CoreError> {
        match &self.tx {
            Some(tx) if !tx.is_closed() => Ok(()),
            _ => Err(Self::lost("peer endpoint closed")),
        }
    }

    async fn recv(&mut self) -> Result<ProtocolMessage, CoreError> {
        self.rx.recv().await.ok_or_else(|| Self::lost("peer endpoint closed"))
    }

    async fn send(&mut self, message: ProtocolMessage) -> Result<(), CoreError> {
        let tx = self.tx.as_ref().ok_or_else(|| Self::lost("endpoint closed"))?;
        tx.send(message)
            .await
            .map_err(|_| Self::lost("peer endpoint closed"))
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
        debug!("memory transport closed");
    }
}

// ── Detached transport ──────────────────────────────────────────────

/// A transport with no peer: sends are discarded and nothing arrives.
///
/// Lets a driver session run stand-alone, e.g. behind a bridge in tests.
#[derive(Debug, Default)]
pub struct DetachedTransport {
    sent: usize,
}

impl DetachedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages discarded so far.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Transport for DetachedTransport {
    async fn open(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<ProtocolMessage, CoreError> {
        std::future::pending().await
    }

    async fn send(&mut self, _message: ProtocolMessage) -> Result<(), CoreError> {
        self.sent += 1;
        Ok(())
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_delivers_in_order_and_reports_loss() {
        let (mut a, mut b) = MemoryTransport::pair(4);
        a.open().await.unwrap();
        for i in 0..3 {
            a.send(ProtocolMessage::GetProperties {
                device: Some(format!("dev{i}")),
                vector: None,
            })
            .await
            .unwrap();
        }
        for i in 0..3 {
            let msg = b.recv().await.unwrap();
            assert_eq!(msg.device(), Some(format!("dev{i}").as_str()));
        }

        a.close().await;
        assert!(matches!(b.recv().await, Err(CoreError::TransportLost { .. })));
        assert!(b.open().await.is_err());
    }
}
