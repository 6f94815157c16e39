//! # Drain item and consumer seams.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ServiceError;
use crate::events::Severity;

/// An item that can flow through a drain worker.
///
/// The severity hint drives filtering and the priority fast path; items
/// without a severity (metrics) always take the buffered path.
pub trait DrainItem: Clone + Send + Sync + 'static {
    /// Severity of this item, if it has one.
    fn severity(&self) -> Option<Severity> {
        None
    }
}

/// Why a delivery failed.
#[derive(Error, Debug)]
pub enum DrainError {
    /// The consumer cannot be reached at all (e.g. its backing service was
    /// unloaded); the worker stops.
    #[error("consumer unavailable: {reason}")]
    Unavailable {
        /// Why the consumer is gone.
        reason: String,
    },

    /// The consumer rejected this batch; the worker's error policy decides
    /// what happens next.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl DrainError {
    /// Flattens into a [`ServiceError`] for surfacing to a producer.
    pub fn into_service_error(self) -> ServiceError {
        match self {
            DrainError::Unavailable { reason } => ServiceError::remote(reason),
            DrainError::Service(err) => err,
        }
    }
}

/// # Batch sink fed by a [`DrainWorker`](crate::drain::DrainWorker).
///
/// `deliver` returning `Ok(false)` means "received but not handled yet":
/// the batch stays buffered and is offered again on the next round.
#[async_trait]
pub trait DrainConsumer<T: DrainItem>: Send + Sync + 'static {
    /// Stable consumer id, unique within its group.
    fn id(&self) -> &str;

    /// Delivers one batch, oldest first.
    async fn deliver(&self, batch: &[T]) -> Result<bool, DrainError>;
}
