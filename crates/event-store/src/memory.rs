use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::{
    EventData, EventStoreError, ExpectedVersion, RecordedEvent, Result, Version,
    store::{
        AppendOptions, BlockingEventStore, EventStore, SliceReadStatus, StreamSlice,
        validate_batch_size,
    },
};

#[derive(Debug, Default)]
struct StreamState {
    events: Vec<RecordedEvent>,
    deleted: bool,
}

impl StreamState {
    fn last_event_number(&self) -> Option<Version> {
        self.events.last().map(|e| e.event_number)
    }
}

/// In-memory event store implementation for testing.
///
/// Streams are kept in a map keyed by name. Deleting a stream keeps a
/// tombstone so that reads can tell a deleted stream from one that never
/// existed. The lock is never held across an await point, so the same
/// store serves both the blocking and the async traits.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<String, StreamState>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored across live streams.
    pub fn event_count(&self) -> usize {
        self.read_guard()
            .values()
            .filter(|s| !s.deleted)
            .map(|s| s.events.len())
            .sum()
    }

    /// Returns the number of streams, tombstones included.
    pub fn stream_count(&self) -> usize {
        self.read_guard().len()
    }

    /// Removes every stream and tombstone.
    pub fn clear(&self) {
        self.write_guard().clear();
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<String, StreamState>> {
        self.streams.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<String, StreamState>> {
        self.streams.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_expected_version(
    stream: &str,
    state: Option<&StreamState>,
    expected: ExpectedVersion,
) -> Result<()> {
    let matches = match (expected, state) {
        (ExpectedVersion::Any, _) => true,
        (ExpectedVersion::NoStream, None) => true,
        (ExpectedVersion::NoStream, Some(_)) => false,
        (ExpectedVersion::Exact(_), None) => false,
        (ExpectedVersion::Exact(version), Some(state)) => {
            state.last_event_number() == Some(version)
        }
    };

    if matches {
        Ok(())
    } else {
        Err(EventStoreError::WrongExpectedVersion {
            stream: stream.to_owned(),
            expected,
            actual: state.and_then(StreamState::last_event_number),
        })
    }
}

impl BlockingEventStore for InMemoryEventStore {
    fn append_to_stream(
        &self,
        stream: &str,
        events: Vec<EventData>,
        options: AppendOptions,
    ) -> Result<Option<Version>> {
        let mut streams = self.write_guard();

        let existing = streams.get(stream);
        if existing.is_some_and(|s| s.deleted) {
            return Err(EventStoreError::StreamDeleted(stream.to_owned()));
        }
        check_expected_version(stream, existing, options.expected_version)?;

        let state = streams.entry(stream.to_owned()).or_default();
        let mut next = state
            .last_event_number()
            .map_or(Version::initial(), |v| v.next());
        for data in events {
            state
                .events
                .push(RecordedEvent::new(stream, next, data));
            next = next.next();
        }

        Ok(state.last_event_number())
    }

    fn delete_stream(&self, stream: &str, expected_version: ExpectedVersion) -> Result<()> {
        let mut streams = self.write_guard();

        let existing = streams.get(stream);
        if existing.is_some_and(|s| s.deleted) {
            return Err(EventStoreError::StreamDeleted(stream.to_owned()));
        }
        check_expected_version(stream, existing, expected_version)?;

        streams.entry(stream.to_owned()).or_default().deleted = true;
        Ok(())
    }

    fn read_stream_forward(
        &self,
        stream: &str,
        start: Version,
        count: usize,
    ) -> Result<StreamSlice> {
        validate_batch_size(count)?;

        let streams = self.read_guard();
        let Some(state) = streams.get(stream) else {
            return Ok(StreamSlice::not_found(stream, start));
        };
        if state.deleted {
            return Ok(StreamSlice::deleted(stream, start));
        }

        let events: Vec<_> = state
            .events
            .iter()
            .skip(usize::try_from(start.as_i64()).unwrap_or(0))
            .take(count)
            .cloned()
            .collect();

        let last_event_number = state.last_event_number();
        let next_event_number = events.last().map_or(start, |e| e.event_number.next());
        let is_end_of_stream = match last_event_number {
            Some(last) => next_event_number > last,
            None => true,
        };

        Ok(StreamSlice {
            status: SliceReadStatus::Success,
            stream: stream.to_owned(),
            from_event_number: start,
            events,
            next_event_number,
            last_event_number,
            is_end_of_stream,
        })
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_to_stream(
        &self,
        stream: &str,
        events: Vec<EventData>,
        options: AppendOptions,
    ) -> Result<Option<Version>> {
        BlockingEventStore::append_to_stream(self, stream, events, options)
    }

    async fn delete_stream(&self, stream: &str, expected_version: ExpectedVersion) -> Result<()> {
        BlockingEventStore::delete_stream(self, stream, expected_version)
    }

    async fn read_stream_forward(
        &self,
        stream: &str,
        start: Version,
        count: usize,
    ) -> Result<StreamSlice> {
        BlockingEventStore::read_stream_forward(self, stream, start, count)
    }
}
