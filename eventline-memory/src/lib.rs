//! In-memory adapter for the `Eventline` event sourcing library
//!
//! This crate provides an in-memory implementation of the `EventStore` trait
//! from the eventline crate, useful for testing and development scenarios
//! where persistence is not required. It also ships the test doubles the
//! integration suites use: a [`ManualClock`] for deterministic append times
//! and a [`FaultInjectingStore`] for failure and contention scenarios.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod clock;
pub mod fault;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fault::FaultInjectingStore;

use async_trait::async_trait;
use eventline::{
    Event, EventStore, EventStoreError, EventStoreResult, EventWindow, NewEvent, SequenceNumber,
    StreamId,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

type Streams<E> = HashMap<StreamId, Vec<Event<E>>>;

/// Thread-safe in-memory event store.
///
/// Clones share storage. Appends check the expected version and write under
/// a single write lock, so concurrent writers observing the same version
/// can never both succeed. Append times come from the configured [`Clock`]
/// and are clamped so they never decrease along a stream.
#[derive(Clone)]
pub struct InMemoryEventStore<E> {
    streams: Arc<RwLock<Streams<E>>>,
    clock: Arc<dyn Clock>,
}

impl<E> InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    /// Create a new empty in-memory event store
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a new empty store that stamps events with `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            clock: Arc::new(clock),
        }
    }

    /// Number of streams holding at least one event.
    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }

    /// Total number of events across all streams.
    pub fn event_count(&self) -> usize {
        self.streams.read().values().map(Vec::len).sum()
    }
}

impl<E> Default for InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for InMemoryEventStore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("streams", &self.streams.read().len())
            .finish_non_exhaustive()
    }
}

fn version_of<E>(events: &[Event<E>]) -> SequenceNumber {
    events
        .last()
        .map_or_else(SequenceNumber::initial, |event| event.sequence_number)
}

#[async_trait]
impl<E> EventStore for InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    type Event = E;

    async fn read(
        &self,
        stream_id: &StreamId,
        window: &EventWindow,
    ) -> EventStoreResult<Vec<Event<E>>> {
        let streams = self.streams.read();
        let events: Vec<_> = streams
            .get(stream_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| window.contains(event))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        trace!(%stream_id, count = events.len(), "read stream");
        Ok(events)
    }

    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent<E>>,
    ) -> EventStoreResult<SequenceNumber> {
        let mut streams = self.streams.write();

        let current = streams
            .get(stream_id)
            .map_or_else(SequenceNumber::initial, |events| version_of(events));
        if current != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                stream: stream_id.clone(),
                expected: expected_version,
                current,
            });
        }
        if events.is_empty() {
            return Ok(current);
        }
        let room = u64::MAX - current.into_inner();
        if !u64::try_from(events.len()).is_ok_and(|count| count <= room) {
            return Err(EventStoreError::Internal(format!(
                "stream '{stream_id}' cannot take {} more events at version {current}",
                events.len()
            )));
        }

        let stream = streams.entry(stream_id.clone()).or_default();
        let now = self.clock.now();
        let occurred_at = stream
            .last()
            .map_or(now, |last| last.occurred_at.max(now));

        let mut version = current;
        for new_event in events {
            version = version.next();
            stream.push(Event::from_new(
                new_event,
                stream_id.clone(),
                version,
                occurred_at,
            ));
        }

        debug!(%stream_id, %version, "appended events");
        Ok(version)
    }

    async fn stream_version(&self, stream_id: &StreamId) -> EventStoreResult<SequenceNumber> {
        Ok(self
            .streams
            .read()
            .get(stream_id)
            .map_or_else(SequenceNumber::initial, |events| version_of(events)))
    }
}
