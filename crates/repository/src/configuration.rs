//! Policies a repository consults when it reads a stream.

use std::sync::Arc;

use common::AggregateId;
use event_store::{EventDeserializer, JsonEventDeserializer, MAX_BATCH_SIZE};
use serde::de::DeserializeOwned;

use crate::error::{RepositoryError, Result};

/// Number of events requested per slice unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 512;

/// Maps an aggregate identity to the name of its stream.
///
/// Must be deterministic and total.
pub trait StreamNameResolver: Send + Sync {
    fn resolve(&self, identifier: &AggregateId) -> String;
}

impl<F> StreamNameResolver for F
where
    F: Fn(&AggregateId) -> String + Send + Sync,
{
    fn resolve(&self, identifier: &AggregateId) -> String {
        self(identifier)
    }
}

/// Uses the identity itself as the stream name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughStreamNameResolver;

impl StreamNameResolver for PassThroughStreamNameResolver {
    fn resolve(&self, identifier: &AggregateId) -> String {
        identifier.to_string()
    }
}

/// Prefixes the identity with a category, e.g. `order-<id>`.
#[derive(Debug, Clone)]
pub struct PrefixedStreamNameResolver {
    prefix: String,
}

impl PrefixedStreamNameResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl StreamNameResolver for PrefixedStreamNameResolver {
    fn resolve(&self, identifier: &AggregateId) -> String {
        format!("{}-{}", self.prefix, identifier)
    }
}

/// Read-side configuration of a repository.
///
/// Immutable once built; repositories share it through an `Arc`.
pub struct RepositoryConfiguration<E> {
    batch_size: usize,
    deserializer: Arc<dyn EventDeserializer<E>>,
    stream_name_resolver: Arc<dyn StreamNameResolver>,
}

impl<E> RepositoryConfiguration<E> {
    /// Creates a configuration, rejecting a batch size the store would not serve.
    pub fn new(
        batch_size: usize,
        deserializer: Arc<dyn EventDeserializer<E>>,
        stream_name_resolver: Arc<dyn StreamNameResolver>,
    ) -> Result<Self> {
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(RepositoryError::InvalidConfiguration(format!(
                "batch size must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}"
            )));
        }

        Ok(Self {
            batch_size,
            deserializer,
            stream_name_resolver,
        })
    }

    /// Upper bound on the events requested per slice read.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn deserializer(&self) -> &Arc<dyn EventDeserializer<E>> {
        &self.deserializer
    }

    pub fn stream_name_resolver(&self) -> &Arc<dyn StreamNameResolver> {
        &self.stream_name_resolver
    }
}

impl<E: DeserializeOwned + 'static> RepositoryConfiguration<E> {
    pub fn builder() -> RepositoryConfigurationBuilder<E> {
        RepositoryConfigurationBuilder::default()
    }
}

/// JSON payloads, pass-through stream names and [`DEFAULT_BATCH_SIZE`].
impl<E: DeserializeOwned + 'static> Default for RepositoryConfiguration<E> {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            deserializer: Arc::new(JsonEventDeserializer::<E>::new()),
            stream_name_resolver: Arc::new(PassThroughStreamNameResolver),
        }
    }
}

impl<E> std::fmt::Debug for RepositoryConfiguration<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfiguration")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RepositoryConfiguration`]; unset options take their defaults.
pub struct RepositoryConfigurationBuilder<E> {
    batch_size: usize,
    deserializer: Option<Arc<dyn EventDeserializer<E>>>,
    stream_name_resolver: Option<Arc<dyn StreamNameResolver>>,
}

impl<E> Default for RepositoryConfigurationBuilder<E> {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            deserializer: None,
            stream_name_resolver: None,
        }
    }
}

impl<E: DeserializeOwned + 'static> RepositoryConfigurationBuilder<E> {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn deserializer(mut self, deserializer: impl EventDeserializer<E> + 'static) -> Self {
        self.deserializer = Some(Arc::new(deserializer));
        self
    }

    pub fn stream_name_resolver(mut self, resolver: impl StreamNameResolver + 'static) -> Self {
        self.stream_name_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn build(self) -> Result<RepositoryConfiguration<E>> {
        RepositoryConfiguration::new(
            self.batch_size,
            self.deserializer
                .unwrap_or_else(|| Arc::new(JsonEventDeserializer::<E>::new())),
            self.stream_name_resolver
                .unwrap_or_else(|| Arc::new(PassThroughStreamNameResolver)),
        )
    }
}
