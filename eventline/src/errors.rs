//! Error types for `Eventline`.
//!
//! The taxonomy separates failures by how a caller should react:
//!
//! - **Retryable**: [`CommandError::ConcurrencyConflict`] means another writer
//!   appended first. Re-run the whole read-decide-append cycle.
//! - **Bugs**: [`ReplayError`] means a window was malformed or misordered.
//!   Never retried.
//! - **Configuration**: [`InstantiationError`] means an aggregate kind could
//!   not produce its default state. Surfaced at startup where possible.
//!
//! Absent or unknown streams are not errors anywhere on the read path; they
//! degrade to empty results.
//!
//! # Example
//!
//! ```rust,ignore
//! match processor.process_existing(&order_id, ShipOrder).await {
//!     Ok(outcome) => info!(version = %outcome.new_version, "shipped"),
//!     Err(err) if err.is_retryable() => schedule_retry(order_id),
//!     Err(err) => return Err(err.into()),
//! }
//! ```

use crate::types::{SequenceNumber, StreamId};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by an [`EventStore`](crate::event_store::EventStore) implementation.
#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    /// The requested stream does not exist.
    ///
    /// Readers treat this as an empty stream.
    #[error("Stream '{0}' not found")]
    StreamNotFound(StreamId),

    /// The stream moved on since the writer observed it.
    #[error(
        "Concurrency conflict on stream '{stream}': expected version {expected}, but current is {current}"
    )]
    ConcurrencyConflict {
        /// The stream with the version conflict
        stream: StreamId,
        /// The version the writer observed
        expected: SequenceNumber,
        /// The version the store holds
        current: SequenceNumber,
    },

    /// The connection to the backing store failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The store is temporarily unavailable.
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EventStoreError {
    /// True for failures that may succeed when simply attempted again.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Unavailable(_) | Self::Timeout(_)
        )
    }
}

/// An event could not be applied to an aggregate.
///
/// Every variant indicates a caller or adapter bug: the event window handed to
/// the aggregate was not the contiguous, ordered history of its own stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// The event's sequence number is not exactly one past the aggregate's.
    #[error("Sequence gap on stream '{stream}': expected event {expected}, got {actual}")]
    SequenceGap {
        /// The aggregate's stream
        stream: StreamId,
        /// The only sequence number that may be applied next
        expected: SequenceNumber,
        /// The sequence number that was offered
        actual: SequenceNumber,
    },

    /// The event belongs to a different stream than the aggregate.
    #[error("Event from stream '{actual}' cannot be applied to aggregate '{expected}'")]
    StreamMismatch {
        /// The aggregate's stream
        expected: StreamId,
        /// The stream the event came from
        actual: StreamId,
    },

    /// The aggregate already sits at the last representable sequence number.
    #[error("Sequence numbers exhausted on stream '{stream}'")]
    SequenceExhausted {
        /// The aggregate's stream
        stream: StreamId,
    },
}

/// An aggregate kind could not be constructed in its default state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiationError {
    /// The kind's factory reported a failure.
    #[error("Aggregate kind '{kind}' could not be instantiated: {reason}")]
    FactoryFailed {
        /// The aggregate kind tag
        kind: &'static str,
        /// What the factory reported
        reason: String,
    },

    /// No factory was registered for the kind.
    #[error("Aggregate kind '{kind}' is not registered")]
    NotRegistered {
        /// The aggregate kind tag
        kind: &'static str,
    },

    /// A second factory was registered under an existing kind tag.
    #[error("Aggregate kind '{kind}' is already registered")]
    DuplicateKind {
        /// The aggregate kind tag
        kind: &'static str,
    },
}

/// Failures while rebuilding an aggregate from its stream.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// The default instance could not be created.
    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    /// The retrieved window could not be replayed.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// The store failed while reading.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

/// Errors that can occur while processing a command.
///
/// # Error Handling Strategy
///
/// - **ValidationFailed / BusinessRuleViolation**: domain rejection from
///   `decide`; report to the user
/// - **ConcurrencyConflict**: retry the full cycle with fresh state
/// - **Replay / Instantiation**: a bug or misconfiguration; do not retry
/// - **EventStore**: handle based on the specific store error
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// The command input was invalid for this aggregate.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The command violates a business rule given the aggregate's state.
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    /// Another writer appended to the stream after it was read.
    #[error(
        "Concurrency conflict on stream '{stream}': expected version {expected}, but current is {current}"
    )]
    ConcurrencyConflict {
        /// The stream with the version conflict
        stream: StreamId,
        /// The version observed when the decision was made
        expected: SequenceNumber,
        /// The version the store holds
        current: SequenceNumber,
    },

    /// The aggregate's history could not be replayed.
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// The aggregate kind could not be instantiated.
    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    /// The event store failed.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// True when re-running the full command cycle may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Type alias for event store results.
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Type alias for repository results.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Type alias for command results.
pub type CommandResult<T> = Result<T, CommandError>;

impl From<EventStoreError> for CommandError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                stream,
                expected,
                current,
            } => Self::ConcurrencyConflict {
                stream,
                expected,
                current,
            },
            other => Self::EventStore(other),
        }
    }
}

impl From<RepositoryError> for CommandError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Instantiation(e) => Self::Instantiation(e),
            RepositoryError::Replay(e) => Self::Replay(e),
            RepositoryError::EventStore(e) => e.into(),
        }
    }
}
