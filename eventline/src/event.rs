//! Event types for the event sourcing system.
//!
//! An [`Event`] is an immutable fact that has been appended to a stream and
//! therefore carries its position and append time. A [`NewEvent`] is the
//! not-yet-persisted form handed to the store; the store assigns the position.

use crate::types::{EventId, SequenceNumber, StreamId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A persisted domain event.
///
/// The generic type `E` is the domain payload, usually an enum with one
/// variant per event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<E> {
    /// Unique identifier for this event
    pub event_id: EventId,
    /// The stream this event belongs to
    pub stream_id: StreamId,
    /// 1-based position within the stream, assigned at append time
    pub sequence_number: SequenceNumber,
    /// When the store accepted the event
    pub occurred_at: Timestamp,
    /// The domain payload
    pub payload: E,
    /// Optional tracing and audit metadata
    pub metadata: Option<EventMetadata>,
}

impl<E> Event<E> {
    /// Creates a persisted event.
    pub const fn new(
        event_id: EventId,
        stream_id: StreamId,
        sequence_number: SequenceNumber,
        occurred_at: Timestamp,
        payload: E,
        metadata: Option<EventMetadata>,
    ) -> Self {
        Self {
            event_id,
            stream_id,
            sequence_number,
            occurred_at,
            payload,
            metadata,
        }
    }

    /// Converts a pending event into its persisted form.
    pub fn from_new(
        new_event: NewEvent<E>,
        stream_id: StreamId,
        sequence_number: SequenceNumber,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            event_id: new_event.event_id,
            stream_id,
            sequence_number,
            occurred_at,
            payload: new_event.payload,
            metadata: new_event.metadata,
        }
    }
}

/// An event waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent<E> {
    /// Unique identifier for this event (must be `UUIDv7`)
    pub event_id: EventId,
    /// The event payload
    pub payload: E,
    /// Optional metadata for this event
    pub metadata: Option<EventMetadata>,
}

impl<E> NewEvent<E> {
    /// Creates a new event with a fresh identifier and no metadata.
    pub fn new(payload: E) -> Self {
        Self {
            event_id: EventId::new(),
            payload,
            metadata: None,
        }
    }

    /// Creates a new event carrying the given metadata.
    pub fn with_metadata(payload: E, metadata: EventMetadata) -> Self {
        Self {
            event_id: EventId::new(),
            payload,
            metadata: Some(metadata),
        }
    }
}

/// Metadata that can be attached to events for tracking and correlation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// ID used to correlate the events produced by one request
    pub correlation_id: Option<String>,
    /// ID of the user or system that issued the command
    pub user_id: Option<String>,
    /// Additional custom metadata
    pub custom: HashMap<String, String>,
}

impl EventMetadata {
    /// Creates new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the user ID.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Adds custom metadata.
    #[must_use]
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}
