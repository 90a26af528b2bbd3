//! Types shared across the workspace.

mod types;

pub use types::AggregateId;
