use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::message::Message;
use crate::storage::EventStore;
use crate::Timestamp;

/// Creates the bounded dump queue and the worker that drains it into `store`.
pub fn channel<S: EventStore>(store: Arc<S>, capacity: usize) -> (DumpQueue, DumpWorker<S>) {
    let capacity = if capacity == 0 {
        warn!("dump queue capacity 0 cannot hold an event, using 1");
        1
    } else {
        capacity
    };
    let (sender, rx) = mpsc::channel(capacity);
    let pending = Arc::new(AtomicUsize::new(0));
    let queue = DumpQueue {
        sender,
        pending: pending.clone(),
    };
    let worker = DumpWorker {
        rx,
        store,
        pending,
    };
    (queue, worker)
}

/// Producer side of the dump queue.
#[derive(Clone)]
pub struct DumpQueue {
    sender: mpsc::Sender<Message>,
    pending: Arc<AtomicUsize>,
}

/// A reserved place in the dump queue. Sending through it never waits.
///
/// Dropping an unused slot hands the place back to the queue.
pub struct DumpSlot<'a> {
    permit: mpsc::Permit<'a, Message>,
    pending: &'a AtomicUsize,
}

impl DumpSlot<'_> {
    pub fn send(self, timestamp: Timestamp) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.permit.send(Message::Append { timestamp });
    }
}

impl DumpQueue {
    /// Waits for room in the queue. Cancelling the wait leaves the queue untouched.
    pub async fn reserve(&self) -> Result<DumpSlot<'_>> {
        let permit = self.sender.reserve().await?;
        Ok(DumpSlot {
            permit,
            pending: &self.pending,
        })
    }

    /// Enqueues a timestamp for persistence, waiting while the queue is full.
    pub async fn push(&self, timestamp: Timestamp) -> Result<()> {
        self.reserve().await?.send(timestamp);
        Ok(())
    }

    /// Waits until every timestamp pushed before this call has been handed to the store.
    pub async fn flush(&self) -> Result<()> {
        let (chan, rx) = oneshot::channel();
        self.sender.send(Message::Flush { chan }).await?;
        rx.await?;
        Ok(())
    }

    /// Closes the queue for every producer. The worker drains what is queued and quits.
    pub async fn close(&self) -> Result<()> {
        self.sender.send(Message::Close).await?;
        Ok(())
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Single consumer of the dump queue.
///
/// Being the only consumer of a FIFO queue is what keeps the log in arrival order.
pub struct DumpWorker<S> {
    rx: mpsc::Receiver<Message>,
    store: Arc<S>,
    pending: Arc<AtomicUsize>,
}

impl<S: EventStore> DumpWorker<S> {
    pub async fn run(mut self) {
        info!("dump worker started");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Message::Append { timestamp } => {
                    if let Err(e) = self.store.append(timestamp).await {
                        warn!("failed to persist {}, {:?}", timestamp, e);
                    }
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                }
                Message::Flush { chan } => {
                    if chan.send(()).is_err() {
                        debug!("Message::Flush, requester went away");
                    }
                }
                Message::Close => {
                    let pending = self.pending.load(Ordering::SeqCst);
                    debug!("Message::Close, draining {} pending", pending);
                    self.rx.close();
                }
            }
        }
        info!("dump queue closed, dump worker has quit");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::storage::FileStore;

    #[tokio::test]
    async fn persists_in_push_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("backup")));
        let (queue, worker) = channel(store.clone(), 16);
        let handle = tokio::spawn(worker.run());

        for timestamp in 1..=5 {
            queue.push(timestamp).await.unwrap();
        }
        queue.flush().await.unwrap();
        assert_eq!(queue.pending(), 0);
        assert_eq!(store.read().await.unwrap(), ",1,2,3,4,5");

        queue.close().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn closed_queue_rejects_pushes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("backup")));
        let (queue, worker) = channel(store, 16);
        queue.close().await.unwrap();
        worker.run().await;

        assert!(matches!(queue.push(1).await, Err(Error::SendError(_))));
        assert!(queue.flush().await.is_err());
        assert!(queue.close().await.is_err());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn close_drains_queued_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("backup")));
        let (queue, worker) = channel(store.clone(), 16);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();
        queue.close().await.unwrap();

        worker.run().await;
        assert_eq!(queue.pending(), 0);
        assert_eq!(store.read().await.unwrap(), ",1,2");
    }

    #[tokio::test]
    async fn write_failures_do_not_stop_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("missing").join("backup")));
        let (queue, worker) = channel(store.clone(), 16);
        let handle = tokio::spawn(worker.run());

        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();
        queue.flush().await.unwrap();
        assert_eq!(queue.pending(), 0);
        assert!(store.read().await.is_err());

        queue.close().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn full_queue_holds_producer_until_worker_drains() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("backup")));
        let (queue, worker) = channel(store.clone(), 2);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();

        let blocked = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(3).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!blocked.is_finished());
        assert_eq!(queue.pending(), 2);

        let handle = tokio::spawn(worker.run());
        blocked.await.unwrap().unwrap();
        queue.flush().await.unwrap();
        assert_eq!(queue.pending(), 0);
        assert_eq!(store.read().await.unwrap(), ",1,2,3");

        queue.close().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_pushes_are_not_counted_as_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("backup")));
        let (queue, worker) = channel(store.clone(), 2);

        let mut accepted = 0;
        for timestamp in 1..=10 {
            let push = queue.push(timestamp);
            if tokio::time::timeout(Duration::from_millis(20), push).await.is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 2);
        assert_eq!(queue.pending(), 2);

        let handle = tokio::spawn(worker.run());
        queue.flush().await.unwrap();
        assert_eq!(queue.pending(), 0);
        assert_eq!(store.read().await.unwrap(), ",1,2");

        queue.close().await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path().join("backup")));
        let (queue, _worker) = channel(store, 0);
        queue.push(1).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(20), queue.push(2))
            .await
            .is_err());
        assert_eq!(queue.pending(), 1);
    }
}
