//! Error type for the service layer.

use thiserror::Error;

use stationlend_core::DomainError;

use crate::event_store::EventStoreError;
use crate::projections::LoanProjectionError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A business rule refused the intent.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting or loading history failed.
    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// Stored history could not be read back into domain events.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("loan directory: {0}")]
    Projection(#[from] LoanProjectionError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        match value {
            // A lost optimistic race is an ordinary conflict for the caller.
            EventStoreError::Concurrency(msg) => ServiceError::Domain(DomainError::conflict(msg)),
            other => ServiceError::Store(other),
        }
    }
}

impl From<stationlend_auth::AuthzError> for ServiceError {
    fn from(value: stationlend_auth::AuthzError) -> Self {
        ServiceError::Domain(value.into())
    }
}

impl ServiceError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }
}
