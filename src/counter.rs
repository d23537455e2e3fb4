use std::sync::Arc;

use log::{debug, info, warn};

use crate::compactor::Compactor;
use crate::dumper::{self, DumpQueue, DumpWorker};
use crate::error::Result;
use crate::gate::Gate;
use crate::message::Status;
use crate::storage::{EventStore, FileStore};
use crate::window::SlidingWindow;
use crate::{Config, Timestamp};

/// Shared state of one persistent counter.
///
/// Owns the in-memory window, the event log, the producer side of the dump queue
/// and the admission gate. Clones share all of it, so request handlers take a clone
/// instead of reaching for globals.
pub struct Counter<S> {
    window: Arc<SlidingWindow>,
    store: Arc<S>,
    dumps: DumpQueue,
    gate: Gate,
    cfg: Arc<Config>,
}

impl<S> Clone for Counter<S> {
    fn clone(&self) -> Self {
        Self {
            window: self.window.clone(),
            store: self.store.clone(),
            dumps: self.dumps.clone(),
            gate: self.gate.clone(),
            cfg: self.cfg.clone(),
        }
    }
}

impl Counter<FileStore> {
    /// Creates a counter backed by `cfg.filename`.
    pub fn open(cfg: Config) -> (Self, DumpWorker<FileStore>) {
        let store = FileStore::new(cfg.filename.clone());
        Self::new(store, cfg)
    }
}

impl<S: EventStore + 'static> Counter<S> {
    /// Creates a counter over `store`. The returned worker must be spawned for events
    /// to reach the store.
    pub fn new(store: S, cfg: Config) -> (Self, DumpWorker<S>) {
        let store = Arc::new(store);
        let (dumps, worker) = dumper::channel(store.clone(), cfg.dump_queue_capacity);
        let counter = Self {
            window: Arc::new(SlidingWindow::new(cfg.window)),
            store,
            dumps,
            gate: Gate::new(cfg.gate_capacity),
            cfg: Arc::new(cfg),
        };
        (counter, worker)
    }

    /// A compactor over the same window and store, ready to be spawned.
    pub fn compactor(&self) -> Compactor<S> {
        Compactor::new(
            self.store.clone(),
            self.window.clone(),
            self.cfg.compact_interval,
        )
    }

    /// Records an event and queues it for persistence.
    ///
    /// Room in the dump queue is reserved before the window is touched, so a caller
    /// dropped while waiting leaves no trace in either. Once the window holds the
    /// event it is queued without another await.
    pub async fn record(&self, timestamp: Timestamp) {
        match self.dumps.reserve().await {
            Ok(slot) => {
                self.window.record(timestamp).await;
                slot.send(timestamp);
            }
            Err(e) => {
                warn!("failed to queue {} for persistence, {:?}", timestamp, e);
                self.window.record(timestamp).await;
            }
        }
    }

    /// Number of events in the trailing window.
    #[inline]
    pub async fn count(&self) -> usize {
        self.count_at(crate::now()).await
    }

    #[inline]
    pub async fn count_at(&self, now: Timestamp) -> usize {
        self.window.count_fresh(self.store.as_ref(), now).await
    }

    /// Counts the events seen so far and records a new one, under the admission gate.
    ///
    /// The slot is held for `request_delay` after the event is queued. Returns the
    /// count observed before the new event was added.
    pub async fn hit(&self) -> Result<usize> {
        let _permit = self.gate.acquire().await?;
        let timestamp = crate::now();
        debug!("received request at {}", timestamp);
        let count = self.count_at(timestamp).await;
        self.record(timestamp).await;
        if !self.cfg.request_delay.is_zero() {
            tokio::time::sleep(self.cfg.request_delay).await;
        }
        Ok(count)
    }

    /// Waits for the dump worker to persist everything queued so far.
    #[inline]
    pub async fn flush(&self) -> Result<()> {
        self.dumps.flush().await
    }

    /// Stops admitting requests, flushes pending events and closes the dump queue.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down counter, pending dumps: {}", self.dumps.pending());
        self.gate.close();
        self.dumps.flush().await?;
        self.dumps.close().await
    }

    pub async fn status(&self) -> Status {
        Status {
            window_len: self.window.len().await,
            fresh: self.count().await,
            in_flight: self.gate.in_flight(),
            gate_capacity: self.gate.capacity(),
            pending_dumps: self.dumps.pending(),
        }
    }

    #[inline]
    pub fn window(&self) -> &Arc<SlidingWindow> {
        &self.window
    }

    #[inline]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[inline]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }
}
