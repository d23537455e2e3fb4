//! A sliding window of event timestamps with lazy recovery from the event log.
//!
//! `SlidingWindow` keeps every recorded timestamp in arrival order and counts the
//! ones newer than `now - window` on demand. While the process is warm the in-memory
//! entries are authoritative. When the window is empty, typically right after a
//! restart, the count falls back to the event log and reinstalls whatever is still
//! fresh there.
//!
//! ## Example
//! ```rust,ignore
//! let window = SlidingWindow::new(std::time::Duration::from_secs(60));
//! window.record(now()).await;
//! let fresh = window.count_fresh(&store, now()).await;
//! ```

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::storage::{fresh_suffix, EventStore};
use crate::Timestamp;

pub struct SlidingWindow {
    entries: RwLock<Vec<Timestamp>>,
    length: i64,
}

impl SlidingWindow {
    /// Creates an empty window covering the trailing `length`.
    pub fn new(length: Duration) -> Self {
        Self::with_entries(length, Vec::new())
    }

    /// Creates a window already holding `entries`, expected oldest-to-newest.
    pub fn with_entries(length: Duration, entries: Vec<Timestamp>) -> Self {
        Self {
            entries: RwLock::new(entries),
            length: i64::try_from(length.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Entries must be strictly newer than the cutoff to count as fresh.
    #[inline]
    pub fn cutoff(&self, now: Timestamp) -> Timestamp {
        now.saturating_sub(self.length)
    }

    /// Appends a timestamp. Callers supply the current time; ordering is not checked.
    #[inline]
    pub async fn record(&self, timestamp: Timestamp) {
        self.entries.write().await.push(timestamp);
    }

    /// Counts the entries newer than `now - window`.
    ///
    /// An empty window is treated as a cold start and rebuilt from `store`. The
    /// exclusive lock is held from the emptiness re-check until the recovered entries
    /// are installed, so a `record` racing with recovery waits and is kept.
    pub async fn count_fresh<S>(&self, store: &S, now: Timestamp) -> usize
    where
        S: EventStore + ?Sized,
    {
        let cutoff = self.cutoff(now);
        {
            let entries = self.entries.read().await;
            if !entries.is_empty() {
                return count_after(&entries, cutoff);
            }
        }

        let mut entries = self.entries.write().await;
        if !entries.is_empty() {
            return count_after(&entries, cutoff);
        }

        info!("window is empty, loading backup");
        match store.read().await {
            Ok(content) => {
                let recovered = fresh_suffix(&content, cutoff);
                let count = recovered.len();
                debug!("recovered {} entries from backup", count);
                *entries = recovered;
                count
            }
            Err(e) if e.is_missing() => {
                debug!("nothing to recover, {}", e);
                0
            }
            Err(e) => {
                warn!("failed to load backup, {:?}", e);
                0
            }
        }
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns a copy of the retained entries, oldest first.
    pub async fn snapshot(&self) -> Vec<Timestamp> {
        self.entries.read().await.clone()
    }
}

#[inline]
fn count_after(entries: &[Timestamp], cutoff: Timestamp) -> usize {
    entries
        .iter()
        .filter(|timestamp| **timestamp > cutoff)
        .count()
}
