use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::warn;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;

/// Admission gate bounding how many operations run at once.
#[derive(Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

/// A held gate slot. Dropping it releases the slot.
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Gate {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("gate capacity 0 would block every request, using 1");
            1
        } else {
            capacity
        };
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free slot. Fails only once the gate is closed.
    pub async fn acquire(&self) -> Result<Permit> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(self.admit(permit))
    }

    #[inline]
    fn admit(&self, permit: OwnedSemaphorePermit) -> Permit {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Permit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        }
    }

    /// Rejects waiting and future acquires. Held permits stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
