//! Aggregate roots and the records a unit of work keeps for them.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns the event type name stored alongside the payload.
    fn event_type(&self) -> &'static str;
}

/// Entry point of an event-sourced aggregate.
///
/// A root is created empty by a factory and brought up to date by
/// replaying its stream through [`initialize`](AggregateRoot::initialize).
/// Events produced by commands afterwards are kept as recorded events
/// until the commit path clears them.
pub trait AggregateRoot: Send + Sync + 'static {
    /// The type of events this root produces and consumes.
    type Event: DomainEvent;

    /// Declared type name, reported when an aggregate cannot be found.
    fn aggregate_type() -> &'static str;

    /// Folds one event into the root's state.
    ///
    /// Must be deterministic and must not fail: events are facts.
    fn apply(&mut self, event: &Self::Event);

    /// Events recorded since the root was loaded or created.
    fn recorded_events(&self) -> &[Self::Event];

    /// Appends an event to the recorded events without applying it.
    fn record(&mut self, event: Self::Event);

    /// Forgets the recorded events, typically after they were committed.
    fn clear_recorded_events(&mut self);

    /// Replays history. Replayed events are applied, not recorded.
    fn initialize(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(&event);
        }
    }

    /// Applies a new event and records it.
    fn apply_change(&mut self, event: Self::Event) {
        self.apply(&event);
        self.record(event);
    }

    fn has_recorded_events(&self) -> bool {
        !self.recorded_events().is_empty()
    }
}

/// Shared handle to a root instance.
///
/// Clones point at the same root, and equality is identity: two handles
/// are equal when they refer to the same instance. This is what lets a
/// unit of work hand out "the same root" for an identity every time.
pub struct SharedRoot<R>(Arc<RwLock<R>>);

impl<R> SharedRoot<R> {
    pub fn new(root: R) -> Self {
        Self(Arc::new(RwLock::new(root)))
    }

    /// Locks the root for reading.
    ///
    /// A lock poisoned by a panicking writer is recovered, the root is
    /// only ever mutated through its own methods.
    pub fn read(&self) -> RwLockReadGuard<'_, R> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the root for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, R> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true when both handles refer to the same root.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<R> Clone for SharedRoot<R> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<R> PartialEq for SharedRoot<R> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<R> Eq for SharedRoot<R> {}

impl<R> std::fmt::Debug for SharedRoot<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedRoot")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

impl<R> From<R> for SharedRoot<R> {
    fn from(root: R) -> Self {
        Self::new(root)
    }
}

/// A root together with its identity and the stream version it was read at.
pub struct Aggregate<R> {
    identifier: AggregateId,
    expected_version: Version,
    root: SharedRoot<R>,
}

impl<R> Aggregate<R> {
    pub fn new(identifier: AggregateId, expected_version: Version, root: SharedRoot<R>) -> Self {
        Self {
            identifier,
            expected_version,
            root,
        }
    }

    pub fn identifier(&self) -> &AggregateId {
        &self.identifier
    }

    /// Version the stream must still be at when this aggregate is committed.
    pub fn expected_version(&self) -> Version {
        self.expected_version
    }

    pub fn root(&self) -> &SharedRoot<R> {
        &self.root
    }

    pub fn into_root(self) -> SharedRoot<R> {
        self.root
    }
}

impl<R> Clone for Aggregate<R> {
    fn clone(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            expected_version: self.expected_version,
            root: self.root.clone(),
        }
    }
}

impl<R> std::fmt::Debug for Aggregate<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregate")
            .field("identifier", &self.identifier)
            .field("expected_version", &self.expected_version)
            .field("root", &self.root)
            .finish()
    }
}
