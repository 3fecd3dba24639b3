//! `Eventline` - aggregate replay and command processing over an event log
//!
//! Aggregates are rebuilt by replaying the ordered events of their own
//! stream, and commands append new events under optimistic concurrency: the
//! append carries the version the decision was made against and the store
//! refuses it if the stream has moved on.
//!
//! The pieces, leaves first:
//!
//! - [`EventStore`] is the storage port. Adapters implement it; the
//!   `eventline-memory` crate provides an in-memory one.
//! - [`EventStreamReader`] reads windows of a stream by sequence number or
//!   by append time.
//! - [`AggregateKind`] describes one aggregate type; [`Aggregate`] enforces
//!   gapless, in-order replay.
//! - [`AggregateRegistry`] and [`AggregateFactory`] produce default states.
//! - [`AggregateRepository`] rebuilds aggregates to latest, to a sequence
//!   number, or to a point in time.
//! - [`CommandProcessor`] runs the read-decide-append cycle, optionally
//!   with retries.
//!
//! The library emits `tracing` spans and events but never installs a
//! subscriber.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod config;
pub mod errors;
pub mod event;
pub mod event_store;
pub mod processor;
pub mod reader;
pub mod registry;
pub mod repository;
pub mod types;

#[cfg(test)]
mod test_fixtures;

pub use aggregate::{Aggregate, AggregateKind};
pub use config::{
    BackoffMultiplier, ConfigError, MaxRetryAttempts, ProcessorConfig, RetryBaseDelayMs,
    RetryConfig, RetryMaxDelayMs, RetryPolicy,
};
pub use errors::{
    CommandError, CommandResult, EventStoreError, EventStoreResult, InstantiationError,
    ReplayError, RepositoryError, RepositoryResult,
};
pub use event::{Event, EventMetadata, NewEvent};
pub use event_store::{EventStore, EventWindow};
pub use processor::{CommandProcessor, CommandTarget, ExecutionContext, ProcessOutcome};
pub use reader::EventStreamReader;
pub use registry::{AggregateFactory, AggregateRegistry};
pub use repository::{AggregateRepository, IdentifierGenerator, UuidIdentifierGenerator};
pub use types::{EventId, SequenceNumber, StreamId, Timestamp};
