use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::storage::EventStore;
use crate::window::SlidingWindow;
use crate::Timestamp;

/// Outcome of one compaction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compaction {
    //Entries left in the event log
    pub retained: usize,
}

/// Periodically sheds stale entries from the event log.
///
/// Only the log is rewritten. The window is consulted for its cutoff and is never
/// mutated here.
pub struct Compactor<S> {
    store: Arc<S>,
    window: Arc<SlidingWindow>,
    interval: Duration,
}

impl<S: EventStore> Compactor<S> {
    pub fn new(store: Arc<S>, window: Arc<SlidingWindow>, interval: Duration) -> Self {
        Self {
            store,
            window,
            interval,
        }
    }

    /// Runs a single cycle against the cutoff derived from `now`.
    pub async fn compact_once(&self, now: Timestamp) -> Result<Compaction> {
        let retained = self.store.compact(self.window.cutoff(now)).await?;
        Ok(Compaction { retained })
    }

    /// Compacts immediately and then once per interval, until the task is dropped.
    pub async fn run(self) {
        info!("compactor started, interval: {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.compact_once(crate::now()).await {
                Ok(compaction) => debug!("compaction done, {:?}", compaction),
                Err(e) => warn!("compaction aborted, {:?}", e),
            }
        }
    }
}
