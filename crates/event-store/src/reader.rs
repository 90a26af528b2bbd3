//! Logical stream reads on top of paged slice reads.
//!
//! A reader turns a stream name into one of three outcomes: the stream's
//! events (deserialized, in stream order), "never written", or "deleted".
//! Paging is hidden from callers; however many slices it takes, they see a
//! single ordered sequence.

use async_trait::async_trait;

use crate::{
    EventDeserializer, Result, Version,
    store::{BlockingEventStore, EventStore, SliceReadStatus, StreamSlice, validate_batch_size},
};

/// The events of a live stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvents<E> {
    /// Every event of the stream, oldest first.
    pub events: Vec<E>,
    /// Number of the last event, `None` when the stream holds no events.
    pub last_event_number: Option<Version>,
}

impl<E> StreamEvents<E> {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// Result of reading a whole stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<E> {
    Found(StreamEvents<E>),
    NotFound,
    Deleted,
}

impl<E> ReadOutcome<E> {
    pub fn is_found(&self) -> bool {
        matches!(self, ReadOutcome::Found(_))
    }

    /// Returns the stream's events, if it was found.
    pub fn into_events(self) -> Option<StreamEvents<E>> {
        match self {
            ReadOutcome::Found(events) => Some(events),
            ReadOutcome::NotFound | ReadOutcome::Deleted => None,
        }
    }
}

/// Reads whole streams, blocking the caller.
pub trait EventReader: Send + Sync {
    /// Reads `stream` in pages of at most `batch_size` events.
    fn read<E>(
        &self,
        stream: &str,
        batch_size: usize,
        deserializer: &dyn EventDeserializer<E>,
    ) -> Result<ReadOutcome<E>>;
}

/// Reads whole streams asynchronously.
#[async_trait]
pub trait AsyncEventReader: Send + Sync {
    /// Reads `stream` in pages of at most `batch_size` events.
    ///
    /// Dropping the returned future abandons the read.
    async fn read<E: Send>(
        &self,
        stream: &str,
        batch_size: usize,
        deserializer: &dyn EventDeserializer<E>,
    ) -> Result<ReadOutcome<E>>;
}

enum Step<E> {
    Continue(Version),
    Done(ReadOutcome<E>),
}

/// Folds slices into a single outcome.
struct SliceAccumulator<E> {
    events: Vec<E>,
}

impl<E> SliceAccumulator<E> {
    fn new() -> Self {
        Self { events: Vec::new() }
    }

    fn accept(
        &mut self,
        slice: StreamSlice,
        deserializer: &dyn EventDeserializer<E>,
    ) -> Result<Step<E>> {
        metrics::counter!("event_reader_slices_read_total").increment(1);

        match slice.status {
            SliceReadStatus::StreamNotFound => return Ok(Step::Done(ReadOutcome::NotFound)),
            SliceReadStatus::StreamDeleted => return Ok(Step::Done(ReadOutcome::Deleted)),
            SliceReadStatus::Success => {}
        }

        tracing::debug!(
            stream = %slice.stream,
            from = %slice.from_event_number,
            count = slice.events.len(),
            end_of_stream = slice.is_end_of_stream,
            "read slice"
        );

        self.events.reserve(slice.events.len());
        for recorded in &slice.events {
            self.events.push(deserializer.deserialize(recorded)?);
        }
        metrics::counter!("event_reader_events_read_total").increment(slice.events.len() as u64);

        // An empty page cannot advance the cursor, so it ends the stream
        // whatever the store claims.
        if slice.is_end_of_stream || slice.events.is_empty() {
            let events = std::mem::take(&mut self.events);
            Ok(Step::Done(ReadOutcome::Found(StreamEvents {
                events,
                last_event_number: slice.last_event_number,
            })))
        } else {
            Ok(Step::Continue(slice.next_event_number))
        }
    }
}

/// Reader that pages through a stream with forward slice reads.
///
/// Works over a [`BlockingEventStore`] as an [`EventReader`] and over an
/// [`EventStore`] as an [`AsyncEventReader`].
#[derive(Debug, Clone, Default)]
pub struct StreamEventReader<S> {
    store: S,
}

impl<S> StreamEventReader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: BlockingEventStore> EventReader for StreamEventReader<S> {
    #[tracing::instrument(skip(self, deserializer))]
    fn read<E>(
        &self,
        stream: &str,
        batch_size: usize,
        deserializer: &dyn EventDeserializer<E>,
    ) -> Result<ReadOutcome<E>> {
        validate_batch_size(batch_size)?;

        let mut accumulator = SliceAccumulator::new();
        let mut start = Version::initial();
        loop {
            let slice = self.store.read_stream_forward(stream, start, batch_size)?;
            match accumulator.accept(slice, deserializer)? {
                Step::Continue(next) => start = next,
                Step::Done(outcome) => return Ok(outcome),
            }
        }
    }
}

#[async_trait]
impl<S: EventStore> AsyncEventReader for StreamEventReader<S> {
    #[tracing::instrument(skip(self, deserializer))]
    async fn read<E: Send>(
        &self,
        stream: &str,
        batch_size: usize,
        deserializer: &dyn EventDeserializer<E>,
    ) -> Result<ReadOutcome<E>> {
        validate_batch_size(batch_size)?;

        let mut accumulator = SliceAccumulator::new();
        let mut start = Version::initial();
        loop {
            let slice = self
                .store
                .read_stream_forward(stream, start, batch_size)
                .await?;
            match accumulator.accept(slice, deserializer)? {
                Step::Continue(next) => start = next,
                Step::Done(outcome) => return Ok(outcome),
            }
        }
    }
}
