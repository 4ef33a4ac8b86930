//! Error sink shared by the transport binding and its owner.
//!
//! The sink holds a single slot, so a report waits until the owner drains
//! the previous one. Whoever owns the options must keep reading
//! [`ErrorReceiver::recv`] for the transport's whole lifetime, otherwise the
//! background tasks stall on their next report.

use crate::error::TransportError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Writer half of the error channel.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<TransportError>,
}

/// Reader half of the error channel. Clones compete for the same errors.
#[derive(Debug, Clone)]
pub struct ErrorReceiver {
    rx: Arc<Mutex<mpsc::Receiver<TransportError>>>,
}

/// Create a connected sink and receiver.
#[must_use]
pub fn error_channel() -> (ErrorSink, ErrorReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (
        ErrorSink { tx },
        ErrorReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl ErrorSink {
    /// Report an error, waiting until there is room for it.
    pub async fn report(&self, error: TransportError) {
        if let Err(err) = self.tx.send(error).await {
            tracing::warn!(error = %err.0, "Error receiver dropped, discarding transport error");
        }
    }
}

impl ErrorReceiver {
    /// Wait for the next transport error.
    ///
    /// Returns `None` once every sink has been dropped.
    pub async fn recv(&self) -> Option<TransportError> {
        self.rx.lock().await.recv().await
    }

    /// Take an error if one is ready.
    ///
    /// Clones share one receiver behind a lock. While another clone is
    /// parked in [`recv`](Self::recv) this returns `None` even if an error
    /// is queued; that waiting clone gets it instead.
    #[must_use]
    pub fn try_recv(&self) -> Option<TransportError> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn reported_errors_reach_receiver() {
        let (sink, receiver) = error_channel();

        let writer = tokio::spawn(async move {
            sink.report(TransportError::Runtime("broker down".to_string()))
                .await;
            sink.report(TransportError::Delivery("pkid 3".to_string()))
                .await;
        });

        assert_eq!(
            receiver.recv().await,
            Some(TransportError::Runtime("broker down".to_string()))
        );
        assert_eq!(
            receiver.recv().await,
            Some(TransportError::Delivery("pkid 3".to_string()))
        );
        writer.await.unwrap();
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn report_waits_for_reader() {
        let (sink, receiver) = error_channel();
        sink.report(TransportError::Runtime("first".to_string())).await;

        let mut second = task::spawn(sink.report(TransportError::Runtime("second".to_string())));
        assert_pending!(second.poll());

        assert_eq!(
            receiver.try_recv(),
            Some(TransportError::Runtime("first".to_string()))
        );
        assert!(second.is_woken());
        assert_ready!(second.poll());
        assert_eq!(
            receiver.try_recv(),
            Some(TransportError::Runtime("second".to_string()))
        );
    }

    #[tokio::test]
    async fn cloned_receivers_share_errors() {
        let (sink, receiver) = error_channel();
        let other = receiver.clone();

        sink.report(TransportError::Closed).await;
        assert_eq!(other.recv().await, Some(TransportError::Closed));
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn try_recv_yields_to_parked_clone() {
        let (sink, receiver) = error_channel();
        let parked = receiver.clone();
        let mut waiting = task::spawn(async move { parked.recv().await });
        assert_pending!(waiting.poll());

        sink.report(TransportError::Closed).await;
        assert!(receiver.try_recv().is_none());

        assert!(waiting.is_woken());
        assert_eq!(assert_ready!(waiting.poll()), Some(TransportError::Closed));
    }
}
