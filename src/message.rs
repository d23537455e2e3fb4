use tokio::sync::oneshot::Sender;
use serde::{Deserialize, Serialize};

use crate::Timestamp;

pub enum Message {
    Append {
        timestamp: Timestamp,
    },
    //Answered once everything queued before it is persisted
    Flush {
        chan: Sender<()>,
    },
    //Stops accepting producers; what is already queued is still persisted
    Close,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub window_len: usize,
    pub fresh: usize,
    pub in_flight: usize,
    pub gate_capacity: usize,
    pub pending_dumps: usize,
}

impl Status {
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.in_flight >= self.gate_capacity
    }
}
