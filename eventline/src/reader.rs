//! Windowed retrieval over a single stream.
//!
//! [`EventStreamReader`] is the read side every rebuild goes through. It
//! turns "no such stream" into an empty result, skips the store entirely
//! when the answer is known to be empty, and always hands back events in
//! ascending sequence order regardless of what the adapter returned.

use crate::errors::{EventStoreError, EventStoreResult};
use crate::event::Event;
use crate::event_store::{EventStore, EventWindow};
use crate::types::{SequenceNumber, StreamId, Timestamp};
use tracing::{instrument, trace};

/// Reads ordered slices of a stream from an [`EventStore`].
#[derive(Debug, Clone)]
pub struct EventStreamReader<S> {
    store: S,
}

impl<S> EventStreamReader<S>
where
    S: EventStore,
{
    /// Creates a reader over `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the events of `stream_id` inside `window`, ascending by
    /// sequence number.
    ///
    /// An absent identifier or an inverted range yields an empty vector
    /// without touching the store. A store reporting the stream as missing
    /// also yields an empty vector. Every other store error is returned
    /// unchanged.
    #[instrument(skip(self))]
    pub async fn retrieve(
        &self,
        stream_id: Option<&StreamId>,
        window: EventWindow,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        let Some(stream_id) = stream_id else {
            return Ok(Vec::new());
        };
        if window.is_inverted() {
            trace!("inverted window, skipping store read");
            return Ok(Vec::new());
        }

        let mut events = match self.store.read(stream_id, &window).await {
            Ok(events) => events,
            Err(EventStoreError::StreamNotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        events.retain(|event| window.contains(event));
        events.sort_by_key(|event| event.sequence_number);
        trace!(count = events.len(), "events retrieved");
        Ok(events)
    }

    /// Every event of the stream.
    pub async fn retrieve_all_events(
        &self,
        stream_id: Option<&StreamId>,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        self.retrieve(stream_id, EventWindow::All).await
    }

    /// Events with `sequence_number <= to`.
    pub async fn retrieve_events_to_sequence_number(
        &self,
        stream_id: Option<&StreamId>,
        to: SequenceNumber,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        self.retrieve(stream_id, EventWindow::ToSequence(to)).await
    }

    /// Events with `sequence_number >= from`.
    pub async fn retrieve_events_from_sequence_number(
        &self,
        stream_id: Option<&StreamId>,
        from: SequenceNumber,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        self.retrieve(stream_id, EventWindow::FromSequence(from))
            .await
    }

    /// Events with `from <= sequence_number <= to`.
    pub async fn retrieve_events_between_sequence_numbers(
        &self,
        stream_id: Option<&StreamId>,
        from: SequenceNumber,
        to: SequenceNumber,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        self.retrieve(stream_id, EventWindow::BetweenSequences { from, to })
            .await
    }

    /// Events with `occurred_at <= to`.
    pub async fn retrieve_events_to_date(
        &self,
        stream_id: Option<&StreamId>,
        to: Timestamp,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        self.retrieve(stream_id, EventWindow::ToTime(to)).await
    }

    /// Events with `occurred_at >= from`.
    pub async fn retrieve_events_from_date(
        &self,
        stream_id: Option<&StreamId>,
        from: Timestamp,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        self.retrieve(stream_id, EventWindow::FromTime(from)).await
    }

    /// Events with `from <= occurred_at <= to`.
    pub async fn retrieve_events_between_dates(
        &self,
        stream_id: Option<&StreamId>,
        from: Timestamp,
        to: Timestamp,
    ) -> EventStoreResult<Vec<Event<S::Event>>> {
        self.retrieve(stream_id, EventWindow::BetweenTimes { from, to })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{at, event, order_id, order_one, OrderEvent, VecStore};
    use std::sync::Arc;

    fn seqs(events: &[Event<OrderEvent>]) -> Vec<u64> {
        events.iter().map(|e| e.sequence_number.into_inner()).collect()
    }

    fn reader() -> EventStreamReader<Arc<VecStore>> {
        EventStreamReader::new(Arc::new(VecStore::seeded(order_one())))
    }

    #[tokio::test]
    async fn absent_stream_id_never_reaches_the_store() {
        let reader = reader();

        let events = reader.retrieve_all_events(None).await.unwrap();

        assert!(events.is_empty());
        assert_eq!(reader.store().read_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_stream_is_empty() {
        let reader = reader();
        let events = reader
            .retrieve_all_events(Some(&order_id("nonexistent-id")))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn stream_not_found_is_treated_as_empty() {
        let store = VecStore::seeded(order_one());
        store.fail_reads_with(EventStoreError::StreamNotFound(order_id("order-1")));
        let reader = EventStreamReader::new(store);

        let events = reader
            .retrieve_all_events(Some(&order_id("order-1")))
            .await
            .unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn other_store_errors_propagate() {
        let store = VecStore::new();
        store.fail_reads_with(EventStoreError::Unavailable("maintenance".into()));
        let reader = EventStreamReader::new(store);

        let err = reader
            .retrieve_all_events(Some(&order_id("order-1")))
            .await
            .unwrap_err();

        assert!(matches!(err, EventStoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn sequence_windows_are_inclusive() {
        let reader = reader();
        let id = order_id("order-1");

        let to = reader
            .retrieve_events_to_sequence_number(Some(&id), SequenceNumber::new(2))
            .await
            .unwrap();
        let from = reader
            .retrieve_events_from_sequence_number(Some(&id), SequenceNumber::new(2))
            .await
            .unwrap();
        let between = reader
            .retrieve_events_between_sequence_numbers(
                Some(&id),
                SequenceNumber::new(2),
                SequenceNumber::new(2),
            )
            .await
            .unwrap();

        assert_eq!(seqs(&to), vec![1, 2]);
        assert_eq!(seqs(&from), vec![2, 3]);
        assert_eq!(seqs(&between), vec![2]);
    }

    #[tokio::test]
    async fn date_windows_are_inclusive() {
        let reader = reader();
        let id = order_id("order-1");

        let to = reader.retrieve_events_to_date(Some(&id), at(20)).await.unwrap();
        let from = reader
            .retrieve_events_from_date(Some(&id), at(20))
            .await
            .unwrap();
        let between = reader
            .retrieve_events_between_dates(Some(&id), at(11), at(30))
            .await
            .unwrap();

        assert_eq!(seqs(&to), vec![1, 2]);
        assert_eq!(seqs(&from), vec![2, 3]);
        assert_eq!(seqs(&between), vec![2, 3]);
    }

    #[tokio::test]
    async fn inverted_ranges_are_empty_without_a_read() {
        let reader = reader();
        let id = order_id("order-1");

        let by_sequence = reader
            .retrieve_events_between_sequence_numbers(
                Some(&id),
                SequenceNumber::new(3),
                SequenceNumber::new(1),
            )
            .await
            .unwrap();
        let by_date = reader
            .retrieve_events_between_dates(Some(&id), at(30), at(10))
            .await
            .unwrap();

        assert!(by_sequence.is_empty());
        assert!(by_date.is_empty());
        assert_eq!(reader.store().read_calls(), 0);
    }

    #[tokio::test]
    async fn output_is_sorted_even_if_the_store_is_not() {
        let store = VecStore::seeded(vec![
            event("order-1", 3, 30, OrderEvent::item("pear")),
            event("order-1", 1, 10, OrderEvent::created("alice")),
            event("order-1", 2, 20, OrderEvent::item("apple")),
        ]);
        let reader = EventStreamReader::new(store);

        let events = reader
            .retrieve_all_events(Some(&order_id("order-1")))
            .await
            .unwrap();

        assert_eq!(seqs(&events), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn equal_timestamps_keep_sequence_order() {
        let store = VecStore::seeded(vec![
            event("order-1", 2, 10, OrderEvent::item("apple")),
            event("order-1", 1, 10, OrderEvent::created("alice")),
            event("order-1", 3, 10, OrderEvent::item("pear")),
        ]);
        let reader = EventStreamReader::new(store);

        let events = reader
            .retrieve_events_between_dates(Some(&order_id("order-1")), at(10), at(10))
            .await
            .unwrap();

        assert_eq!(seqs(&events), vec![1, 2, 3]);
    }
}
