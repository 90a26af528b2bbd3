pub mod deserializer;
pub mod error;
pub mod event;
pub mod memory;
pub mod reader;
pub mod store;

pub use deserializer::{EventDeserializer, JsonEventDeserializer};
pub use error::{EventStoreError, Result};
pub use event::{EventData, EventDataBuilder, EventId, ExpectedVersion, RecordedEvent, Version};
pub use memory::InMemoryEventStore;
pub use reader::{AsyncEventReader, EventReader, ReadOutcome, StreamEventReader, StreamEvents};
pub use store::{
    AppendOptions, BlockingEventStore, EventStore, EventStoreExt, MAX_BATCH_SIZE, SliceReadStatus,
    StreamSlice,
};
