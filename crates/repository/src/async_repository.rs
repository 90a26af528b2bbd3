//! Async repository over an [`AsyncEventReader`].
//!
//! Resolution follows the same order as the synchronous [`Repository`]:
//! unit of work first, then the stream. Loads of one identity are funneled
//! through a per-identity gate that only lives while someone is loading it.
//!
//! [`Repository`]: crate::Repository

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::AggregateId;
use event_store::{AsyncEventReader, Version};

use crate::aggregate::{Aggregate, AggregateRoot, SharedRoot};
use crate::configuration::RepositoryConfiguration;
use crate::error::{RepositoryError, Result};
use crate::repository::{RepositoryBuilder, RootFactory, cached, materialize};
use crate::unit_of_work::UnitOfWork;

type LoadGate = Arc<tokio::sync::Mutex<()>>;
type LoadGates = Mutex<HashMap<AggregateId, LoadGate>>;

fn lock_gates(gates: &LoadGates) -> MutexGuard<'_, HashMap<AggregateId, LoadGate>> {
    gates.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A caller's claim on the load gate of one identity.
///
/// Dropping the last lease removes the gate from the map, including when
/// the owning future is cancelled mid-load.
struct GateLease<'a> {
    gates: &'a LoadGates,
    identifier: &'a AggregateId,
    gate: LoadGate,
}

impl<'a> GateLease<'a> {
    fn acquire(gates: &'a LoadGates, identifier: &'a AggregateId) -> Self {
        let gate = Arc::clone(lock_gates(gates).entry(identifier.clone()).or_default());
        Self {
            gates,
            identifier,
            gate,
        }
    }
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut gates = lock_gates(self.gates);
        // Leases are only cloned under the map lock, so two references
        // (the map's and ours) means nobody else is waiting.
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(self.identifier);
        }
    }
}

/// Repository that resolves aggregates with an [`AsyncEventReader`].
///
/// Concurrent lookups of the same identity share a single store read: the
/// first caller loads while the others wait on the identity's gate and then
/// find the root in the unit of work.
///
/// Dropping a lookup future before it completes leaves the unit of work
/// untouched, since an aggregate is only attached once its stream has been
/// fully read and replayed.
pub struct AsyncRepository<R: AggregateRoot, Rd> {
    root_factory: RootFactory<R>,
    unit_of_work: Arc<UnitOfWork<R>>,
    event_reader: Arc<Rd>,
    configuration: Arc<RepositoryConfiguration<R::Event>>,
    load_gates: LoadGates,
}

impl<R: AggregateRoot, Rd> AsyncRepository<R, Rd> {
    pub fn new(
        root_factory: RootFactory<R>,
        unit_of_work: Arc<UnitOfWork<R>>,
        event_reader: Arc<Rd>,
        configuration: Arc<RepositoryConfiguration<R::Event>>,
    ) -> Self {
        Self {
            root_factory,
            unit_of_work,
            event_reader,
            configuration,
            load_gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn builder() -> RepositoryBuilder<R, Rd> {
        RepositoryBuilder::default()
    }

    pub fn root_factory(&self) -> &RootFactory<R> {
        &self.root_factory
    }

    pub fn unit_of_work(&self) -> &Arc<UnitOfWork<R>> {
        &self.unit_of_work
    }

    pub fn event_reader(&self) -> &Arc<Rd> {
        &self.event_reader
    }

    pub fn configuration(&self) -> &Arc<RepositoryConfiguration<R::Event>> {
        &self.configuration
    }

    /// Attaches a new root at version zero. Never touches the store.
    pub fn add(&self, identifier: AggregateId, root: SharedRoot<R>) -> Result<()> {
        tracing::debug!(%identifier, "adding aggregate");
        self.unit_of_work
            .attach(Aggregate::new(identifier, Version::initial(), root))
    }

    #[cfg(test)]
    fn pending_loads(&self) -> usize {
        lock_gates(&self.load_gates).len()
    }
}

impl<R: AggregateRoot, Rd: AsyncEventReader> AsyncRepository<R, Rd> {
    /// Returns the root for `identifier`.
    ///
    /// Fails with [`RepositoryError::AggregateNotFound`] when the stream is
    /// missing, empty or deleted.
    pub async fn get(&self, identifier: &AggregateId) -> Result<SharedRoot<R>> {
        self.get_optional(identifier)
            .await?
            .ok_or_else(|| RepositoryError::not_found::<R>(identifier))
    }

    /// Returns the root for `identifier`, or `None` where [`get`](Self::get)
    /// would fail with [`RepositoryError::AggregateNotFound`].
    #[tracing::instrument(skip(self), fields(aggregate_type = R::aggregate_type()))]
    pub async fn get_optional(&self, identifier: &AggregateId) -> Result<Option<SharedRoot<R>>> {
        if let Some(root) = cached(&self.unit_of_work, identifier) {
            return Ok(Some(root));
        }

        let lease = GateLease::acquire(&self.load_gates, identifier);
        let _load = lease.gate.lock().await;
        if let Some(root) = cached(&self.unit_of_work, identifier) {
            return Ok(Some(root));
        }

        let stream = self.configuration.stream_name_resolver().resolve(identifier);
        let outcome = self
            .event_reader
            .read(
                &stream,
                self.configuration.batch_size(),
                self.configuration.deserializer().as_ref(),
            )
            .await?;

        Ok(materialize(identifier, &stream, outcome, &self.root_factory)
            .map(|aggregate| self.unit_of_work.get_or_attach(aggregate).into_root()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DomainEvent;
    use event_store::{
        AppendOptions, BlockingEventStore, EventData, InMemoryEventStore, StreamEventReader,
    };
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ticked;

    impl DomainEvent for Ticked {
        fn event_type(&self) -> &'static str {
            "Ticked"
        }
    }

    #[derive(Debug, Default)]
    struct Clock {
        ticks: usize,
        changes: Vec<Ticked>,
    }

    impl AggregateRoot for Clock {
        type Event = Ticked;

        fn aggregate_type() -> &'static str {
            "Clock"
        }

        fn apply(&mut self, _event: &Ticked) {
            self.ticks += 1;
        }

        fn recorded_events(&self) -> &[Ticked] {
            &self.changes
        }

        fn record(&mut self, event: Ticked) {
            self.changes.push(event);
        }

        fn clear_recorded_events(&mut self) {
            self.changes.clear();
        }
    }

    type ClockRepository = AsyncRepository<Clock, StreamEventReader<InMemoryEventStore>>;

    fn repository(store: InMemoryEventStore) -> ClockRepository {
        AsyncRepository::new(
            Arc::new(Clock::default),
            Arc::new(UnitOfWork::new()),
            Arc::new(StreamEventReader::new(store)),
            Arc::new(RepositoryConfiguration::default()),
        )
    }

    fn store_with_clock(stream: &str, ticks: usize) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let events = (0..ticks)
            .map(|_| {
                EventData::builder()
                    .event_type("Ticked")
                    .payload(&Ticked)
                    .unwrap()
                    .build()
            })
            .collect();
        BlockingEventStore::append_to_stream(&store, stream, events, AppendOptions::new())
            .unwrap();
        store
    }

    #[tokio::test]
    async fn gates_are_released_after_unknown_lookups() {
        let repository = repository(InMemoryEventStore::new());

        for i in 0..16 {
            let id = AggregateId::from(format!("missing-{i}"));
            assert!(repository.get_optional(&id).await.unwrap().is_none());
        }

        assert_eq!(repository.pending_loads(), 0);
    }

    #[tokio::test]
    async fn gates_are_released_after_loads() {
        let repository = repository(store_with_clock("clock", 3));
        let id = AggregateId::from("clock");

        let (first, second) = tokio::join!(repository.get(&id), repository.get(&id));

        assert!(first.unwrap().ptr_eq(&second.unwrap()));
        assert_eq!(repository.pending_loads(), 0);
        assert_eq!(repository.get(&id).await.unwrap().read().ticks, 3);
    }

    #[tokio::test]
    async fn gate_is_released_when_the_lookup_is_dropped() {
        let repository = repository(InMemoryEventStore::new());
        let id = AggregateId::from("clock");
        let holder = GateLease::acquire(&repository.load_gates, &id);
        let held = holder.gate.lock().await;

        let waiting =
            tokio::time::timeout(Duration::from_millis(5), repository.get_optional(&id)).await;
        assert!(waiting.is_err());
        assert_eq!(repository.pending_loads(), 1);

        drop(held);
        drop(holder);
        assert_eq!(repository.pending_loads(), 0);
    }

    #[tokio::test]
    async fn waiting_caller_keeps_the_gate_alive() {
        let gates: LoadGates = Mutex::new(HashMap::new());
        let id = AggregateId::from("clock");

        let first = GateLease::acquire(&gates, &id);
        let second = GateLease::acquire(&gates, &id);
        assert!(Arc::ptr_eq(&first.gate, &second.gate));

        drop(first);
        assert_eq!(lock_gates(&gates).len(), 1);

        drop(second);
        assert!(lock_gates(&gates).is_empty());
    }
}
