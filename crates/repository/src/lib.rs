//! Event-sourced aggregate repository.
//!
//! This crate resolves aggregate roots by identity, including:
//! - AggregateRoot trait for roots rebuilt by replaying their events
//! - UnitOfWork identity map tracking every root handed out in a session
//! - Repository and AsyncRepository reading streams through an event reader
//! - RepositoryConfiguration for batch size, payload decoding and stream naming

pub mod aggregate;
pub mod async_repository;
pub mod configuration;
pub mod error;
pub mod repository;
pub mod unit_of_work;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, SharedRoot};
pub use async_repository::AsyncRepository;
pub use configuration::{
    DEFAULT_BATCH_SIZE, PassThroughStreamNameResolver, PrefixedStreamNameResolver,
    RepositoryConfiguration, RepositoryConfigurationBuilder, StreamNameResolver,
};
pub use error::{RepositoryError, Result};
pub use repository::{Repository, RepositoryBuilder, RootFactory};
pub use unit_of_work::UnitOfWork;
