use async_trait::async_trait;

use crate::{EventData, EventStoreError, ExpectedVersion, RecordedEvent, Result, Version};

/// Largest number of events a single slice read may request.
pub const MAX_BATCH_SIZE: usize = 4096;

/// Options for appending events to a stream.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected state of the stream for optimistic concurrency control.
    pub expected_version: ExpectedVersion,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream's last event to be `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: ExpectedVersion::Exact(version),
        }
    }

    /// Creates options expecting the stream to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: ExpectedVersion::NoStream,
        }
    }
}

/// Outcome of reading one slice of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceReadStatus {
    Success,
    StreamNotFound,
    StreamDeleted,
}

/// One physical page of a forward stream read.
#[derive(Debug, Clone)]
pub struct StreamSlice {
    pub status: SliceReadStatus,
    pub stream: String,
    pub from_event_number: Version,
    /// Events of this page, in stream order.
    pub events: Vec<RecordedEvent>,
    /// Where the next page starts.
    pub next_event_number: Version,
    /// Number of the last event in the stream, `None` while it holds no events.
    pub last_event_number: Option<Version>,
    pub is_end_of_stream: bool,
}

impl StreamSlice {
    /// A slice for a stream that was never written.
    pub fn not_found(stream: &str, from_event_number: Version) -> Self {
        Self::empty(SliceReadStatus::StreamNotFound, stream, from_event_number)
    }

    /// A slice for a stream that carries a tombstone.
    pub fn deleted(stream: &str, from_event_number: Version) -> Self {
        Self::empty(SliceReadStatus::StreamDeleted, stream, from_event_number)
    }

    fn empty(status: SliceReadStatus, stream: &str, from_event_number: Version) -> Self {
        Self {
            status,
            stream: stream.to_owned(),
            from_event_number,
            events: Vec::new(),
            next_event_number: from_event_number,
            last_event_number: None,
            is_end_of_stream: true,
        }
    }
}

/// Core trait for asynchronous event store clients.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to the end of a stream, creating it when needed.
    ///
    /// Events are appended atomically. Appending an empty batch to a missing
    /// stream creates the stream without events.
    ///
    /// Returns the version of the stream after the append.
    async fn append_to_stream(
        &self,
        stream: &str,
        events: Vec<EventData>,
        options: AppendOptions,
    ) -> Result<Option<Version>>;

    /// Deletes a stream, leaving a tombstone behind.
    ///
    /// A tombstoned stream rejects further appends and reads report it as
    /// deleted rather than absent.
    async fn delete_stream(&self, stream: &str, expected_version: ExpectedVersion) -> Result<()>;

    /// Reads up to `count` events of a stream, starting at `start`.
    async fn read_stream_forward(
        &self,
        stream: &str,
        start: Version,
        count: usize,
    ) -> Result<StreamSlice>;
}

/// Blocking counterpart of [`EventStore`] for synchronous callers.
pub trait BlockingEventStore: Send + Sync {
    fn append_to_stream(
        &self,
        stream: &str,
        events: Vec<EventData>,
        options: AppendOptions,
    ) -> Result<Option<Version>>;

    fn delete_stream(&self, stream: &str, expected_version: ExpectedVersion) -> Result<()>;

    fn read_stream_forward(&self, stream: &str, start: Version, count: usize)
    -> Result<StreamSlice>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event to a stream.
    async fn append_event(
        &self,
        stream: &str,
        event: EventData,
        options: AppendOptions,
    ) -> Result<Option<Version>> {
        self.append_to_stream(stream, vec![event], options).await
    }

    /// Checks whether a stream is live (exists and is not deleted).
    async fn stream_exists(&self, stream: &str) -> Result<bool> {
        let slice = self.read_stream_forward(stream, Version::initial(), 1).await?;
        Ok(slice.status == SliceReadStatus::Success)
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Rejects batch sizes the store would not serve.
pub fn validate_batch_size(count: usize) -> Result<()> {
    if count == 0 || count > MAX_BATCH_SIZE {
        return Err(EventStoreError::InvalidBatchSize(count));
    }
    Ok(())
}
