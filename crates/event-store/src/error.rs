use thiserror::Error;

use crate::{ExpectedVersion, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// An append was rejected because the stream was not at the expected version.
    #[error(
        "Wrong expected version for stream {stream}: expected {expected}, found {actual:?}"
    )]
    WrongExpectedVersion {
        stream: String,
        expected: ExpectedVersion,
        actual: Option<Version>,
    },

    /// The stream has been deleted and can no longer be written to.
    #[error("Stream deleted: {0}")]
    StreamDeleted(String),

    /// A read was requested with a batch size outside the accepted range.
    #[error("Invalid batch size {0}: must be between 1 and {max}", max = crate::MAX_BATCH_SIZE)]
    InvalidBatchSize(usize),

    /// A stored event payload could not be turned into a domain event.
    #[error("Failed to deserialize event {event_number} of stream {stream}: {source}")]
    Deserialization {
        stream: String,
        event_number: Version,
        #[source]
        source: serde_json::Error,
    },

    /// A stored event carried a type the deserializer does not know.
    #[error("Unknown event type {event_type} in stream {stream}")]
    UnknownEventType { stream: String, event_type: String },

    /// The store itself failed to serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A payload could not be serialized when building an event.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
