//! Repository error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Neither the unit of work nor the store holds a live stream for the identity.
    #[error("Aggregate not found: {aggregate_type} with id {identifier}")]
    AggregateNotFound {
        identifier: AggregateId,
        aggregate_type: &'static str,
    },

    /// The unit of work already tracks an aggregate with this identity.
    #[error("Aggregate {0} is already attached to the unit of work")]
    AlreadyAttached(AggregateId),

    /// A repository was built without one of its collaborators.
    #[error("Repository requires a {0}")]
    MissingCollaborator(&'static str),

    /// A configuration value was rejected.
    #[error("Invalid repository configuration: {0}")]
    InvalidConfiguration(String),

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

impl RepositoryError {
    pub(crate) fn not_found<R: crate::AggregateRoot>(identifier: &AggregateId) -> Self {
        RepositoryError::AggregateNotFound {
            identifier: identifier.clone(),
            aggregate_type: R::aggregate_type(),
        }
    }

    /// Returns true for [`RepositoryError::AggregateNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::AggregateNotFound { .. })
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
