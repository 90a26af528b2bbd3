//! Shared fixtures for the repository integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{
    AppendOptions, AsyncEventReader, BlockingEventStore, EventData, EventDeserializer,
    EventReader, ExpectedVersion, InMemoryEventStore, ReadOutcome, StreamEventReader,
};
use repository::{
    Aggregate, AggregateRoot, AsyncRepository, DomainEvent, Repository, RepositoryConfiguration,
    RootFactory, SharedRoot, UnitOfWork,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStub {
    pub value: i32,
}

impl EventStub {
    pub fn new(value: i32) -> Self {
        Self { value }
    }
}

impl DomainEvent for EventStub {
    fn event_type(&self) -> &'static str {
        "EventStub"
    }
}

/// Root that keeps every event it sees, replayed or not, so tests can
/// observe exactly what the repository fed it.
#[derive(Debug, Default)]
pub struct AggregateRootEntityStub {
    recorded: Vec<EventStub>,
}

impl AggregateRootEntityStub {
    pub fn factory() -> RootFactory<Self> {
        Arc::new(Self::default)
    }
}

impl AggregateRoot for AggregateRootEntityStub {
    type Event = EventStub;

    fn aggregate_type() -> &'static str {
        "AggregateRootEntityStub"
    }

    fn apply(&mut self, _event: &EventStub) {}

    fn recorded_events(&self) -> &[EventStub] {
        &self.recorded
    }

    fn record(&mut self, event: EventStub) {
        self.recorded.push(event);
    }

    fn clear_recorded_events(&mut self) {
        self.recorded.clear();
    }

    fn initialize(&mut self, events: impl IntoIterator<Item = EventStub>) {
        self.recorded.extend(events);
    }
}

/// One identity the scenario may populate and one it never touches.
pub struct Model {
    pub known_identifier: AggregateId,
    pub unknown_identifier: AggregateId,
}

impl Model {
    pub fn new() -> Self {
        Self {
            known_identifier: AggregateId::new(),
            unknown_identifier: AggregateId::new(),
        }
    }
}

/// Reader wrapper that counts reads and can stall them.
pub struct SpyReader<Rd> {
    inner: Rd,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl<Rd> SpyReader<Rd> {
    pub fn new(inner: Rd) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<Rd: EventReader> EventReader for SpyReader<Rd> {
    fn read<E>(
        &self,
        stream: &str,
        batch_size: usize,
        deserializer: &dyn EventDeserializer<E>,
    ) -> event_store::Result<ReadOutcome<E>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.read(stream, batch_size, deserializer)
    }
}

#[async_trait]
impl<Rd: AsyncEventReader> AsyncEventReader for SpyReader<Rd> {
    async fn read<E: Send>(
        &self,
        stream: &str,
        batch_size: usize,
        deserializer: &dyn EventDeserializer<E>,
    ) -> event_store::Result<ReadOutcome<E>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.read(stream, batch_size, deserializer).await
    }
}

pub type StubReader = SpyReader<StreamEventReader<InMemoryEventStore>>;

/// Prepares store contents and session state, then builds repositories
/// over them. Every repository built from one scenario shares its store
/// and unit of work but gets its own reader.
pub struct RepositoryScenarioBuilder {
    store: InMemoryEventStore,
    unit_of_work: Arc<UnitOfWork<AggregateRootEntityStub>>,
    batch_size: usize,
    read_delay: Option<Duration>,
}

impl RepositoryScenarioBuilder {
    pub fn new() -> Self {
        Self {
            store: InMemoryEventStore::new(),
            unit_of_work: Arc::new(UnitOfWork::new()),
            batch_size: repository::DEFAULT_BATCH_SIZE,
            read_delay: None,
        }
    }

    pub fn with_events(self, stream: &AggregateId, events: &[EventStub]) -> Self {
        let data = events
            .iter()
            .map(|event| {
                EventData::builder()
                    .event_type(event.event_type())
                    .payload(event)
                    .unwrap()
                    .build()
            })
            .collect();
        BlockingEventStore::append_to_stream(
            &self.store,
            stream.as_str(),
            data,
            AppendOptions::new(),
        )
        .unwrap();
        self
    }

    pub fn with_raw_event(self, stream: &AggregateId, payload: serde_json::Value) -> Self {
        let data = EventData::builder()
            .event_type("EventStub")
            .payload_raw(payload)
            .build();
        BlockingEventStore::append_to_stream(
            &self.store,
            stream.as_str(),
            vec![data],
            AppendOptions::new(),
        )
        .unwrap();
        self
    }

    pub fn with_deleted_stream(self, stream: &AggregateId) -> Self {
        BlockingEventStore::delete_stream(&self.store, stream.as_str(), ExpectedVersion::Any)
            .unwrap();
        self
    }

    pub fn with_attached(
        self,
        identifier: &AggregateId,
        root: SharedRoot<AggregateRootEntityStub>,
    ) -> Self {
        self.unit_of_work
            .attach(Aggregate::new(
                identifier.clone(),
                event_store::Version::initial(),
                root,
            ))
            .unwrap();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    fn reader(&self) -> Arc<StubReader> {
        let spy = SpyReader::new(StreamEventReader::new(self.store.clone()));
        Arc::new(match self.read_delay {
            Some(delay) => spy.with_delay(delay),
            None => spy,
        })
    }

    fn configuration(&self) -> Arc<RepositoryConfiguration<EventStub>> {
        Arc::new(
            RepositoryConfiguration::builder()
                .batch_size(self.batch_size)
                .build()
                .unwrap(),
        )
    }

    pub fn build_for_repository(&self) -> Repository<AggregateRootEntityStub, StubReader> {
        Repository::new(
            AggregateRootEntityStub::factory(),
            Arc::clone(&self.unit_of_work),
            self.reader(),
            self.configuration(),
        )
    }

    pub fn build_for_async_repository(
        &self,
    ) -> AsyncRepository<AggregateRootEntityStub, StubReader> {
        AsyncRepository::new(
            AggregateRootEntityStub::factory(),
            Arc::clone(&self.unit_of_work),
            self.reader(),
            self.configuration(),
        )
    }
}
