//! Admission control for in-flight backend requests.

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;

/// Bounds the number of requests awaiting a backend reply.
///
/// Waiters are queued on a semaphore and woken as soon as a slot frees up.
#[derive(Debug)]
pub struct AdmissionController {
    slots: Semaphore,
    max_pending: usize,
}

impl AdmissionController {
    pub fn new(max_pending: usize) -> Self {
        Self {
            slots: Semaphore::new(max_pending),
            max_pending,
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails only once the controller has been closed.
    pub async fn acquire(&self) -> GatewayResult<AdmissionPermit<'_>> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| GatewayError::Stopped)?;
        metrics::adjust_in_flight(1.0);
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Reject current and future waiters.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.max_pending.saturating_sub(self.available())
    }
}

/// One admitted request. The slot is released when this is dropped.
#[derive(Debug)]
pub struct AdmissionPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        metrics::adjust_in_flight(-1.0);
    }
}
