//! Turning stored payloads back into domain events.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::{EventStoreError, RecordedEvent, Result};

/// Converts a [`RecordedEvent`] into a domain event.
///
/// Failures are fatal for the read that triggered them.
pub trait EventDeserializer<E>: Send + Sync {
    fn deserialize(&self, event: &RecordedEvent) -> Result<E>;
}

impl<E, F> EventDeserializer<E> for F
where
    F: Fn(&RecordedEvent) -> Result<E> + Send + Sync,
{
    fn deserialize(&self, event: &RecordedEvent) -> Result<E> {
        self(event)
    }
}

/// Deserializes the JSON payload of an event with `serde_json`.
///
/// The stored event type is not consulted, so `E` is usually an
/// externally or adjacently tagged enum.
pub struct JsonEventDeserializer<E> {
    _phantom: PhantomData<fn() -> E>,
}

impl<E> JsonEventDeserializer<E> {
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<E> Default for JsonEventDeserializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for JsonEventDeserializer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonEventDeserializer").finish()
    }
}

impl<E: DeserializeOwned> EventDeserializer<E> for JsonEventDeserializer<E> {
    fn deserialize(&self, event: &RecordedEvent) -> Result<E> {
        serde_json::from_value(event.payload.clone()).map_err(|source| {
            EventStoreError::Deserialization {
                stream: event.stream_name.clone(),
                event_number: event.event_number,
                source,
            }
        })
    }
}
