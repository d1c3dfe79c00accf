//! Lifecycle error taxonomy

use chrono::NaiveDate;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Why an operation was rejected before anything was written.
///
/// Gateway failures after a committed write never surface here; they are
/// recorded on the job instead.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("cleaner is not assigned to this job")]
    NotAssigned,

    #[error("{0}")]
    InvalidState(String),

    #[error("cleaner already has a live request on this job")]
    DuplicateRequest,

    #[error("job is scheduled for {scheduled}, today is {today}")]
    NotScheduledToday { scheduled: NaiveDate, today: NaiveDate },

    #[error("{0}")]
    Validation(String),

    /// Synchronous processor call failed; nothing was committed.
    #[error("payment processor error: {0}")]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(StoreError),
}

impl LifecycleError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Conflict => {
                Self::invalid_state("job was changed by another request, reload and retry")
            }
            StoreError::Duplicate => Self::DuplicateRequest,
            other => Self::Store(other),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
