//! Event store abstraction for the `Eventline` library.
//!
//! This module defines the [`EventStore`] port that every storage backend
//! implements, together with [`EventWindow`], the read predicate the port
//! understands. The core only ever consumes this trait; how events are laid
//! out on disk or in a database is the adapter's business.

use crate::errors::EventStoreResult;
use crate::event::{Event, NewEvent};
use crate::types::{SequenceNumber, StreamId, Timestamp};
use async_trait::async_trait;
use std::sync::Arc;

/// The slice of a stream a read should return. All bounds are inclusive.
///
/// Time windows compare against [`Event::occurred_at`]. Because the store
/// keeps `occurred_at` non-decreasing along the stream, every window selects
/// a contiguous run of sequence numbers, and events sharing a timestamp keep
/// their sequence order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventWindow {
    /// Every event in the stream
    #[default]
    All,
    /// `sequence_number <= to`
    ToSequence(SequenceNumber),
    /// `sequence_number >= from`
    FromSequence(SequenceNumber),
    /// `from <= sequence_number <= to`
    BetweenSequences {
        /// First sequence number to include
        from: SequenceNumber,
        /// Last sequence number to include
        to: SequenceNumber,
    },
    /// `occurred_at <= to`
    ToTime(Timestamp),
    /// `occurred_at >= from`
    FromTime(Timestamp),
    /// `from <= occurred_at <= to`
    BetweenTimes {
        /// Earliest append time to include
        from: Timestamp,
        /// Latest append time to include
        to: Timestamp,
    },
}

impl EventWindow {
    /// Returns whether `event` falls inside this window.
    ///
    /// Adapters that cannot push the predicate down to their backend should
    /// filter with this method so every store agrees on window membership.
    pub fn contains<E>(&self, event: &Event<E>) -> bool {
        let seq = event.sequence_number;
        let at = event.occurred_at;
        match *self {
            Self::All => true,
            Self::ToSequence(to) => seq <= to,
            Self::FromSequence(from) => seq >= from,
            Self::BetweenSequences { from, to } => from <= seq && seq <= to,
            Self::ToTime(to) => at <= to,
            Self::FromTime(from) => at >= from,
            Self::BetweenTimes { from, to } => from <= at && at <= to,
        }
    }

    /// True when the bounds are inverted, so no event can ever match.
    pub fn is_inverted(&self) -> bool {
        match *self {
            Self::BetweenSequences { from, to } => from > to,
            Self::BetweenTimes { from, to } => from > to,
            _ => false,
        }
    }
}

/// The storage contract the core consumes.
///
/// Implementations own the per-stream ordering and must make the version
/// check in [`append`](EventStore::append) atomic with the write: two writers
/// presenting the same `expected_version` must never both succeed.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The event payload type this store handles.
    type Event: Send + Sync;

    /// Reads the events of `stream_id` that fall inside `window`, ascending by
    /// sequence number.
    ///
    /// A stream that does not exist may be reported either as an empty vector
    /// or as [`EventStoreError::StreamNotFound`](crate::errors::EventStoreError::StreamNotFound);
    /// readers treat both as empty.
    async fn read(
        &self,
        stream_id: &StreamId,
        window: &EventWindow,
    ) -> EventStoreResult<Vec<Event<Self::Event>>>;

    /// Appends `events` to `stream_id` if its current version equals
    /// `expected_version`.
    ///
    /// On success the events receive sequence numbers
    /// `expected_version + 1 ..= expected_version + k` in the order supplied,
    /// and the new stream version is returned. On a version mismatch nothing
    /// is written and [`EventStoreError::ConcurrencyConflict`](crate::errors::EventStoreError::ConcurrencyConflict)
    /// is returned.
    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent<Self::Event>>,
    ) -> EventStoreResult<SequenceNumber>;

    /// Returns the current version of `stream_id`, or 0 if it does not exist.
    async fn stream_version(&self, stream_id: &StreamId) -> EventStoreResult<SequenceNumber>;
}

#[async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    type Event = S::Event;

    async fn read(
        &self,
        stream_id: &StreamId,
        window: &EventWindow,
    ) -> EventStoreResult<Vec<Event<Self::Event>>> {
        (**self).read(stream_id, window).await
    }

    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent<Self::Event>>,
    ) -> EventStoreResult<SequenceNumber> {
        (**self).append(stream_id, expected_version, events).await
    }

    async fn stream_version(&self, stream_id: &StreamId) -> EventStoreResult<SequenceNumber> {
        (**self).stream_version(stream_id).await
    }
}

#[async_trait]
impl<S> EventStore for &S
where
    S: EventStore + ?Sized,
{
    type Event = S::Event;

    async fn read(
        &self,
        stream_id: &StreamId,
        window: &EventWindow,
    ) -> EventStoreResult<Vec<Event<Self::Event>>> {
        (**self).read(stream_id, window).await
    }

    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent<Self::Event>>,
    ) -> EventStoreResult<SequenceNumber> {
        (**self).append(stream_id, expected_version, events).await
    }

    async fn stream_version(&self, stream_id: &StreamId) -> EventStoreResult<SequenceNumber> {
        (**self).stream_version(stream_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventId;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Timestamp::new(Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn event(seq: u64, secs: i64) -> Event<()> {
        Event::new(
            EventId::new(),
            StreamId::try_new("s").unwrap(),
            SequenceNumber::new(seq),
            at(secs),
            (),
            None,
        )
    }

    #[test]
    fn sequence_windows_are_inclusive() {
        let e = event(5, 0);
        assert!(EventWindow::All.contains(&e));
        assert!(EventWindow::ToSequence(SequenceNumber::new(5)).contains(&e));
        assert!(!EventWindow::ToSequence(SequenceNumber::new(4)).contains(&e));
        assert!(EventWindow::FromSequence(SequenceNumber::new(5)).contains(&e));
        assert!(!EventWindow::FromSequence(SequenceNumber::new(6)).contains(&e));
        assert!(EventWindow::BetweenSequences {
            from: SequenceNumber::new(5),
            to: SequenceNumber::new(5),
        }
        .contains(&e));
    }

    #[test]
    fn time_windows_are_inclusive() {
        let e = event(1, 100);
        assert!(EventWindow::ToTime(at(100)).contains(&e));
        assert!(!EventWindow::ToTime(at(99)).contains(&e));
        assert!(EventWindow::FromTime(at(100)).contains(&e));
        assert!(!EventWindow::FromTime(at(101)).contains(&e));
        assert!(EventWindow::BetweenTimes {
            from: at(50),
            to: at(100),
        }
        .contains(&e));
        assert!(!EventWindow::BetweenTimes {
            from: at(101),
            to: at(200),
        }
        .contains(&e));
    }

    #[test]
    fn inverted_ranges_are_detected() {
        assert!(EventWindow::BetweenSequences {
            from: SequenceNumber::new(3),
            to: SequenceNumber::new(2),
        }
        .is_inverted());
        assert!(EventWindow::BetweenTimes {
            from: at(2),
            to: at(1),
        }
        .is_inverted());
        assert!(!EventWindow::All.is_inverted());
        assert!(!EventWindow::BetweenTimes {
            from: at(1),
            to: at(1),
        }
        .is_inverted());
    }
}
