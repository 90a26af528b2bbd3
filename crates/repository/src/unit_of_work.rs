//! Per-session tracking of the aggregates a repository hands out.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use common::AggregateId;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::error::{RepositoryError, Result};

struct Entries<R> {
    aggregates: Vec<Aggregate<R>>,
    index: HashMap<AggregateId, usize>,
}

/// Identity map of the aggregates touched during one logical session.
///
/// Each identity is attached at most once, and lookups hand back a record
/// sharing the attached root, so every reader of the session observes the
/// same instance. Aggregates are enumerated in attach order.
///
/// The internal lock is only held for the duration of a map operation,
/// never across store I/O.
pub struct UnitOfWork<R> {
    entries: Mutex<Entries<R>>,
}

impl<R> UnitOfWork<R> {
    /// Creates an empty unit of work.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                aggregates: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries<R>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking an aggregate.
    ///
    /// Fails with [`RepositoryError::AlreadyAttached`] if its identity is
    /// already tracked; the existing entry is left untouched.
    pub fn attach(&self, aggregate: Aggregate<R>) -> Result<()> {
        let mut entries = self.lock();
        if entries.index.contains_key(aggregate.identifier()) {
            return Err(RepositoryError::AlreadyAttached(
                aggregate.identifier().clone(),
            ));
        }

        let position = entries.aggregates.len();
        entries
            .index
            .insert(aggregate.identifier().clone(), position);
        entries.aggregates.push(aggregate);
        Ok(())
    }

    /// Attaches `aggregate` unless its identity is already tracked, and
    /// returns the record the session keeps for that identity.
    ///
    /// When two loads of the same identity race, the first attach wins and
    /// both callers get its record.
    pub fn get_or_attach(&self, aggregate: Aggregate<R>) -> Aggregate<R> {
        let mut entries = self.lock();
        if let Some(&position) = entries.index.get(aggregate.identifier()) {
            return entries.aggregates[position].clone();
        }

        let position = entries.aggregates.len();
        entries
            .index
            .insert(aggregate.identifier().clone(), position);
        entries.aggregates.push(aggregate.clone());
        aggregate
    }

    /// Looks up the aggregate attached for `identifier`.
    pub fn try_get(&self, identifier: &AggregateId) -> Option<Aggregate<R>> {
        let entries = self.lock();
        entries
            .index
            .get(identifier)
            .map(|&position| entries.aggregates[position].clone())
    }

    pub fn contains(&self, identifier: &AggregateId) -> bool {
        self.lock().index.contains_key(identifier)
    }

    /// Snapshot of every attached aggregate, in attach order.
    pub fn aggregates(&self) -> Vec<Aggregate<R>> {
        self.lock().aggregates.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().aggregates.is_empty()
    }
}

impl<R: AggregateRoot> UnitOfWork<R> {
    /// Returns true when any attached root has recorded events.
    pub fn has_changes(&self) -> bool {
        self.aggregates()
            .iter()
            .any(|aggregate| aggregate.root().read().has_recorded_events())
    }

    /// The attached aggregates whose roots have recorded events.
    pub fn changes(&self) -> Vec<Aggregate<R>> {
        self.aggregates()
            .into_iter()
            .filter(|aggregate| aggregate.root().read().has_recorded_events())
            .collect()
    }
}

impl<R> Default for UnitOfWork<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> std::fmt::Debug for UnitOfWork<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.lock();
        f.debug_struct("UnitOfWork")
            .field("identifiers", &entries.index.keys().collect::<Vec<_>>())
            .finish()
    }
}
