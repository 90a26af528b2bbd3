//! Synchronous repository and the resolution steps shared with the async one.
//!
//! Resolving an identity consults, in order:
//! 1. the unit of work, which wins whenever it holds the identity,
//! 2. the event reader, whose outcome decides between a fresh root replayed
//!    from history and "not found".
//!
//! A root loaded from the store is attached to the unit of work before it is
//! handed out, so later lookups in the same session return the same instance.

use std::sync::{Arc, Mutex, PoisonError};

use common::AggregateId;
use event_store::{EventReader, ReadOutcome, StreamEvents, Version};

use crate::aggregate::{Aggregate, AggregateRoot, SharedRoot};
use crate::async_repository::AsyncRepository;
use crate::configuration::RepositoryConfiguration;
use crate::error::{RepositoryError, Result};
use crate::unit_of_work::UnitOfWork;

/// Produces a fresh, empty root. Must never return the same instance twice.
pub type RootFactory<R> = Arc<dyn Fn() -> R + Send + Sync>;

/// Builds the aggregate for a read outcome, or `None` when the stream holds
/// no live events.
///
/// Streams that exist without events are treated like missing streams.
pub(crate) fn materialize<R: AggregateRoot>(
    identifier: &AggregateId,
    stream: &str,
    outcome: ReadOutcome<R::Event>,
    root_factory: &RootFactory<R>,
) -> Option<Aggregate<R>> {
    let StreamEvents {
        events,
        last_event_number,
    } = match outcome {
        ReadOutcome::Found(found) if !found.is_empty() => found,
        ReadOutcome::Found(_) => {
            tracing::debug!(%stream, "stream has no events");
            metrics::counter!("repository_aggregates_not_found_total", "reason" => "empty")
                .increment(1);
            return None;
        }
        ReadOutcome::NotFound => {
            tracing::debug!(%stream, "stream not found");
            metrics::counter!("repository_aggregates_not_found_total", "reason" => "not_found")
                .increment(1);
            return None;
        }
        ReadOutcome::Deleted => {
            tracing::info!(%stream, "stream deleted");
            metrics::counter!("repository_aggregates_not_found_total", "reason" => "deleted")
                .increment(1);
            return None;
        }
    };

    let event_count = events.len();
    let version = last_event_number.unwrap_or_else(|| Version::new(event_count as i64 - 1));

    let mut root = root_factory();
    root.initialize(events);

    metrics::counter!("repository_aggregates_loaded_total").increment(1);
    tracing::info!(%stream, event_count, %version, "aggregate loaded");

    Some(Aggregate::new(
        identifier.clone(),
        version,
        SharedRoot::new(root),
    ))
}

/// Returns the root the unit of work holds for `identifier`, if any.
pub(crate) fn cached<R>(
    unit_of_work: &UnitOfWork<R>,
    identifier: &AggregateId,
) -> Option<SharedRoot<R>> {
    let aggregate = unit_of_work.try_get(identifier)?;
    metrics::counter!("repository_unit_of_work_hits_total").increment(1);
    tracing::trace!(%identifier, "unit of work hit");
    Some(aggregate.into_root())
}

/// Repository that resolves aggregates with a blocking [`EventReader`].
///
/// Intended for one session at a time. Loads are serialized internally so
/// that sharing it across threads never loads the same identity twice.
pub struct Repository<R: AggregateRoot, Rd> {
    root_factory: RootFactory<R>,
    unit_of_work: Arc<UnitOfWork<R>>,
    event_reader: Arc<Rd>,
    configuration: Arc<RepositoryConfiguration<R::Event>>,
    load_lock: Mutex<()>,
}

impl<R: AggregateRoot, Rd> Repository<R, Rd> {
    /// Creates a repository from its collaborators.
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
            load_lock: Mutex::new(()),
        }
    }

    /// Starts a builder that reports which collaborator is missing.
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

    /// Attaches a new root at version zero.
    ///
    /// Fails with [`RepositoryError::AlreadyAttached`] if the session already
    /// tracks `identifier`.
    pub fn add(&self, identifier: AggregateId, root: SharedRoot<R>) -> Result<()> {
        tracing::debug!(%identifier, "adding aggregate");
        self.unit_of_work
            .attach(Aggregate::new(identifier, Version::initial(), root))
    }
}

impl<R: AggregateRoot, Rd: EventReader> Repository<R, Rd> {
    /// Returns the root for `identifier`.
    ///
    /// Fails with [`RepositoryError::AggregateNotFound`] when the stream is
    /// missing, empty or deleted.
    pub fn get(&self, identifier: &AggregateId) -> Result<SharedRoot<R>> {
        self.get_optional(identifier)?
            .ok_or_else(|| RepositoryError::not_found::<R>(identifier))
    }

    /// Returns the root for `identifier`, or `None` where [`get`](Self::get)
    /// would fail with [`RepositoryError::AggregateNotFound`].
    #[tracing::instrument(skip(self), fields(aggregate_type = R::aggregate_type()))]
    pub fn get_optional(&self, identifier: &AggregateId) -> Result<Option<SharedRoot<R>>> {
        if let Some(root) = cached(&self.unit_of_work, identifier) {
            return Ok(Some(root));
        }

        let _load = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(root) = cached(&self.unit_of_work, identifier) {
            return Ok(Some(root));
        }

        let stream = self.configuration.stream_name_resolver().resolve(identifier);
        let outcome = self.event_reader.read(
            &stream,
            self.configuration.batch_size(),
            self.configuration.deserializer().as_ref(),
        )?;

        Ok(materialize(identifier, &stream, outcome, &self.root_factory)
            .map(|aggregate| self.unit_of_work.get_or_attach(aggregate).into_root()))
    }
}

/// Collects repository collaborators, reporting the first one missing.
pub struct RepositoryBuilder<R: AggregateRoot, Rd> {
    root_factory: Option<RootFactory<R>>,
    unit_of_work: Option<Arc<UnitOfWork<R>>>,
    event_reader: Option<Arc<Rd>>,
    configuration: Option<Arc<RepositoryConfiguration<R::Event>>>,
}

impl<R: AggregateRoot, Rd> Default for RepositoryBuilder<R, Rd> {
    fn default() -> Self {
        Self {
            root_factory: None,
            unit_of_work: None,
            event_reader: None,
            configuration: None,
        }
    }
}

type Parts<R, Rd> = (
    RootFactory<R>,
    Arc<UnitOfWork<R>>,
    Arc<Rd>,
    Arc<RepositoryConfiguration<<R as AggregateRoot>::Event>>,
);

impl<R: AggregateRoot, Rd> RepositoryBuilder<R, Rd> {
    pub fn root_factory(mut self, root_factory: RootFactory<R>) -> Self {
        self.root_factory = Some(root_factory);
        self
    }

    pub fn unit_of_work(mut self, unit_of_work: Arc<UnitOfWork<R>>) -> Self {
        self.unit_of_work = Some(unit_of_work);
        self
    }

    pub fn event_reader(mut self, event_reader: Arc<Rd>) -> Self {
        self.event_reader = Some(event_reader);
        self
    }

    pub fn configuration(mut self, configuration: Arc<RepositoryConfiguration<R::Event>>) -> Self {
        self.configuration = Some(configuration);
        self
    }

    fn into_parts(self) -> Result<Parts<R, Rd>> {
        Ok((
            self.root_factory
                .ok_or(RepositoryError::MissingCollaborator("root factory"))?,
            self.unit_of_work
                .ok_or(RepositoryError::MissingCollaborator("unit of work"))?,
            self.event_reader
                .ok_or(RepositoryError::MissingCollaborator("event reader"))?,
            self.configuration
                .ok_or(RepositoryError::MissingCollaborator("configuration"))?,
        ))
    }

    /// Builds a synchronous [`Repository`].
    pub fn build(self) -> Result<Repository<R, Rd>> {
        let (root_factory, unit_of_work, event_reader, configuration) = self.into_parts()?;
        Ok(Repository::new(
            root_factory,
            unit_of_work,
            event_reader,
            configuration,
        ))
    }

    /// Builds an [`AsyncRepository`].
    pub fn build_async(self) -> Result<AsyncRepository<R, Rd>> {
        let (root_factory, unit_of_work, event_reader, configuration) = self.into_parts()?;
        Ok(AsyncRepository::new(
            root_factory,
            unit_of_work,
            event_reader,
            configuration,
        ))
    }
}
