use std::path::PathBuf;
use std::time::Duration;

pub use crate::compactor::{Compaction, Compactor};
pub use crate::counter::Counter;
pub use crate::dumper::{DumpQueue, DumpSlot, DumpWorker};
pub use crate::error::{Error, Result};
pub use crate::gate::{Gate, Permit};
pub use crate::message::Status;
pub use crate::server::routes;
pub use crate::storage::{EventStore, FileStore};
pub use crate::window::SlidingWindow;

mod compactor;
mod counter;
mod dumper;
mod error;
mod gate;
mod message;
mod server;
pub mod storage;
mod window;

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

#[inline]
pub fn now() -> Timestamp {
    chrono::Local::now().timestamp()
}

#[derive(Clone, Debug)]
pub struct Config {
    //Backing file of the event log
    pub filename: PathBuf,
    //Length of the sliding window
    pub window: Duration,
    //Admission gate slots
    pub gate_capacity: usize,
    //Extra time a request holds its gate slot
    pub request_delay: Duration,
    //Pending events the dump queue buffers before producers wait
    pub dump_queue_capacity: usize,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filename: PathBuf::from("backup"),
            window: Duration::from_secs(60),
            gate_capacity: 5,
            request_delay: Duration::from_secs(2),
            dump_queue_capacity: 1000,
            compact_interval: Duration::from_secs(60),
        }
    }
}
