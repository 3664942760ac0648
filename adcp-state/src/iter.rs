//! Consuming change events
//!
//! - Waiting: `recv()`, `recv_timeout()`
//! - Non-blocking: `try_recv()`, `try_iter()`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::event::ChangeEvent;

/// Receiving end of the cache's change events
///
/// Clones share one queue: an event is handed to whichever clone asks first.
///
/// # Example
///
/// ```rust,ignore
/// let changes = registry.changes();
/// while let Some(event) = changes.recv().await {
///     println!("{} = {:?} on {}", event.attribute, event.value, event.device_id);
/// }
/// ```
#[derive(Clone)]
pub struct ChangeStream {
    rx: Arc<Mutex<mpsc::Receiver<ChangeEvent>>>,
}

impl ChangeStream {
    pub(crate) fn new(rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the cache and all its handles are gone.
    pub async fn recv(&self) -> Option<ChangeEvent> {
        self.rx.lock().await.recv().await
    }

    /// Wait for the next event for at most `timeout`
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }

    /// Take an event if one is queued
    ///
    /// Also returns `None` while another clone is waiting in `recv`.
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Iterator over the events queued right now
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }
}

impl std::fmt::Debug for ChangeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStream").finish_non_exhaustive()
    }
}

/// Non-blocking iterator over currently queued events
pub struct TryIter<'a> {
    inner: &'a ChangeStream,
}

impl<'a> Iterator for TryIter<'a> {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use crate::id::DeviceId;
    use crate::snapshot::{Revision, Validity};
    use adcp_api::AttributeId;

    fn event(revision: u64) -> ChangeEvent {
        ChangeEvent::new(
            DeviceId::from("cinema"),
            AttributeId::Power,
            ChangeKind::Value,
            None,
            Validity::Unavailable,
            Revision::new(revision),
        )
    }

    #[test]
    fn test_try_recv_empty() {
        let (_tx, rx) = mpsc::channel(4);
        let stream = ChangeStream::new(rx);
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_try_iter_drains_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let stream = ChangeStream::new(rx);
        for revision in 1..=3 {
            tx.try_send(event(revision)).unwrap();
        }

        let revisions: Vec<_> = stream.try_iter().map(|e| e.revision.get()).collect();
        assert_eq!(revisions, vec![1, 2, 3]);
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_clones_share_queue() {
        let (tx, rx) = mpsc::channel(4);
        let stream = ChangeStream::new(rx);
        let other = stream.clone();

        tx.try_send(event(1)).unwrap();
        assert!(other.try_recv().is_some());
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_expires() {
        let (_tx, rx) = mpsc::channel(4);
        let stream = ChangeStream::new(rx);

        let start = tokio::time::Instant::now();
        assert!(stream.recv_timeout(Duration::from_millis(50)).await.is_none());
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_recv_waits_for_event() {
        let (tx, rx) = mpsc::channel(4);
        let stream = ChangeStream::new(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(event(7)).await.unwrap();
        });

        let received = stream.recv_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.revision, Revision::new(7));
    }

    #[tokio::test]
    async fn test_recv_none_when_closed() {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(4);
        let stream = ChangeStream::new(rx);
        drop(tx);
        assert!(stream.recv().await.is_none());
    }
}
