//! Admission control for in-flight requests.
//!
//! # Responsibilities
//! - Bound the number of simultaneously serviced clients
//! - Queue waiters in arrival order when the limit is reached
//! - Refuse waiters whose queue time exceeds the configured timeout
//! - Release slots exactly once per admission, on every exit path
//!
//! # Design Decisions
//! - Built on Tokio's semaphore, which queues waiters FIFO, so arrival-order
//!   admission falls out of the primitive
//! - The permit is an RAII guard; dropping it is the only release path, which
//!   covers success, errors, cancellation, and panic unwinding
//! - A timed-out waiter's acquire future is dropped, which removes it from
//!   the semaphore queue

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Error type for admission failures.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// No slot became available within the queue timeout.
    #[error("no admission slot within {0:?}")]
    Exhausted(Duration),
}

/// Bounds concurrent request servicing with FIFO queueing past the limit.
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    max_clients: usize,
    acquire_timeout: Duration,
}

impl AdmissionGate {
    /// Create a gate admitting at most `max_clients` at once.
    pub fn new(max_clients: usize, acquire_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_clients)),
            max_clients,
            acquire_timeout,
        }
    }

    /// Acquire an admission slot, queueing FIFO behind earlier waiters.
    ///
    /// Fails with [`AdmissionError::Exhausted`] if the timeout elapses first;
    /// the pipeline surfaces that as a 503.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionError> {
        let waiter = self.slots.clone().acquire_owned();
        match tokio::time::timeout(self.acquire_timeout, waiter).await {
            Ok(permit) => {
                let permit = permit.expect("Admission semaphore closed unexpectedly");
                tracing::trace!(
                    active = self.active(),
                    max_clients = self.max_clients,
                    "Admission granted"
                );
                Ok(AdmissionPermit { _permit: permit })
            }
            Err(_) => {
                metrics::record_admission_rejected();
                Err(AdmissionError::Exhausted(self.acquire_timeout))
            }
        }
    }

    /// Number of slots currently held.
    pub fn active(&self) -> usize {
        self.max_clients - self.slots.available_permits()
    }

    /// Configured client limit.
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }
}

/// A held admission slot.
///
/// Dropping the permit hands the slot to the oldest queued waiter, or
/// decrements the active count when the queue is empty.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}
