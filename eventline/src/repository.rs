//! Rebuilding aggregates from their streams.

use crate::aggregate::{Aggregate, AggregateKind};
use crate::errors::{InstantiationError, RepositoryResult};
use crate::event::Event;
use crate::event_store::EventStore;
use crate::reader::EventStreamReader;
use crate::registry::{AggregateFactory, AggregateRegistry};
use crate::types::{SequenceNumber, StreamId, Timestamp};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Produces identifiers for newly created aggregates.
pub trait IdentifierGenerator: Send + Sync {
    /// Returns a fresh, unused stream identifier.
    fn generate(&self) -> StreamId;
}

/// Generates `UUIDv7` identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdentifierGenerator;

impl IdentifierGenerator for UuidIdentifierGenerator {
    fn generate(&self) -> StreamId {
        StreamId::generate()
    }
}

/// Builds aggregates of kind `K` from the events in store `S`.
///
/// Every build starts from a fresh default state produced by the kind's
/// factory, reads a window of the stream through an [`EventStreamReader`]
/// and replays it in ascending order.
///
/// # Example
///
/// ```rust,ignore
/// let repository = AggregateRepository::<Order, _>::new(store, AggregateFactory::from_default())?;
///
/// let latest = repository.build_latest(&order_id).await?;
/// let as_of_yesterday = repository.build_to_date(&order_id, yesterday).await?;
/// ```
pub struct AggregateRepository<K: AggregateKind, S> {
    reader: EventStreamReader<S>,
    factory: AggregateFactory<K>,
    identifiers: Arc<dyn IdentifierGenerator>,
}

impl<K, S> AggregateRepository<K, S>
where
    K: AggregateKind,
    S: EventStore<Event = K::Event>,
{
    /// Creates a repository, invoking `factory` once to make sure it works.
    pub fn new(store: S, factory: AggregateFactory<K>) -> Result<Self, InstantiationError> {
        factory.instantiate()?;
        Ok(Self {
            reader: EventStreamReader::new(store),
            factory,
            identifiers: Arc::new(UuidIdentifierGenerator),
        })
    }

    /// Creates a repository using the factory registered for `K`.
    pub fn from_registry(
        store: S,
        registry: &AggregateRegistry,
    ) -> Result<Self, InstantiationError> {
        Self::new(store, registry.factory::<K>()?)
    }

    /// Replaces the identifier generator used by [`build_new`](Self::build_new).
    #[must_use]
    pub fn with_identifier_generator(mut self, generator: impl IdentifierGenerator + 'static) -> Self {
        self.identifiers = Arc::new(generator);
        self
    }

    /// The reader this repository fetches through.
    pub const fn reader(&self) -> &EventStreamReader<S> {
        &self.reader
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        self.reader.store()
    }

    /// A default-state aggregate with a freshly generated identifier.
    pub fn build_new(&self) -> Result<Aggregate<K>, InstantiationError> {
        self.build_new_with_id(self.identifiers.generate())
    }

    /// A default-state aggregate for `aggregate_identifier`, without
    /// looking at the store.
    pub fn build_new_with_id(
        &self,
        aggregate_identifier: StreamId,
    ) -> Result<Aggregate<K>, InstantiationError> {
        Ok(Aggregate::new(aggregate_identifier, self.factory.instantiate()?))
    }

    /// Replays every event of the stream.
    #[instrument(skip(self), fields(kind = K::KIND))]
    pub async fn build_latest(&self, aggregate_identifier: &StreamId) -> RepositoryResult<Aggregate<K>> {
        let events = self
            .reader
            .retrieve_all_events(Some(aggregate_identifier))
            .await?;
        self.replay(aggregate_identifier, &events)
    }

    /// Replays the events with `sequence_number <= to`.
    #[instrument(skip(self), fields(kind = K::KIND))]
    pub async fn build_to_sequence_number(
        &self,
        aggregate_identifier: &StreamId,
        to: SequenceNumber,
    ) -> RepositoryResult<Aggregate<K>> {
        let events = self
            .reader
            .retrieve_events_to_sequence_number(Some(aggregate_identifier), to)
            .await?;
        self.replay(aggregate_identifier, &events)
    }

    /// Replays the events with `occurred_at <= to`.
    #[instrument(skip(self), fields(kind = K::KIND))]
    pub async fn build_to_date(
        &self,
        aggregate_identifier: &StreamId,
        to: Timestamp,
    ) -> RepositoryResult<Aggregate<K>> {
        let events = self
            .reader
            .retrieve_events_to_date(Some(aggregate_identifier), to)
            .await?;
        self.replay(aggregate_identifier, &events)
    }

    fn replay(
        &self,
        aggregate_identifier: &StreamId,
        events: &[Event<K::Event>],
    ) -> RepositoryResult<Aggregate<K>> {
        let mut aggregate = self.build_new_with_id(aggregate_identifier.clone())?;
        aggregate.replay(events)?;
        debug!(
            events = events.len(),
            sequence_number = %aggregate.sequence_number(),
            "aggregate rebuilt"
        );
        Ok(aggregate)
    }
}

impl<K, S> fmt::Debug for AggregateRepository<K, S>
where
    K: AggregateKind,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("kind", &K::KIND)
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EventStoreError, RepositoryError, ReplayError};
    use crate::test_fixtures::{at, event, order_id, order_one, Order, OrderEvent, OrderState, VecStore};
    use proptest::prelude::*;

    struct Fixed(&'static str);

    impl IdentifierGenerator for Fixed {
        fn generate(&self) -> StreamId {
            order_id(self.0)
        }
    }

    fn repository(store: VecStore) -> AggregateRepository<Order, VecStore> {
        AggregateRepository::new(store, AggregateFactory::from_default()).unwrap()
    }

    #[test]
    fn build_new_generates_distinct_identifiers() {
        let repository = repository(VecStore::new());

        let a = repository.build_new().unwrap();
        let b = repository.build_new().unwrap();

        assert_ne!(a.aggregate_identifier(), b.aggregate_identifier());
        assert!(a.is_new());
        assert_eq!(a.state(), &OrderState::default());
    }

    #[test]
    fn identifier_generator_can_be_replaced() {
        let repository = repository(VecStore::new()).with_identifier_generator(Fixed("order-42"));
        assert_eq!(
            repository.build_new().unwrap().aggregate_identifier(),
            &order_id("order-42")
        );
    }

    #[test]
    fn broken_factory_fails_at_construction() {
        let result = AggregateRepository::<Order, _>::new(
            VecStore::new(),
            AggregateFactory::fallible(|| Err("boom".into())),
        );
        assert!(matches!(
            result,
            Err(InstantiationError::FactoryFailed { kind: "order", .. })
        ));
    }

    #[test]
    fn unregistered_kind_fails_at_construction() {
        let result =
            AggregateRepository::<Order, _>::from_registry(VecStore::new(), &AggregateRegistry::new());
        assert!(matches!(
            result,
            Err(InstantiationError::NotRegistered { kind: "order" })
        ));
    }

    #[tokio::test]
    async fn build_latest_replays_everything() {
        let repository = repository(VecStore::seeded(order_one()));

        let aggregate = repository.build_latest(&order_id("order-1")).await.unwrap();

        assert_eq!(aggregate.sequence_number(), SequenceNumber::new(3));
        assert_eq!(aggregate.state().items, vec!["apple", "pear"]);
        assert_eq!(aggregate.last_modification_date(), Some(at(30)));
    }

    #[tokio::test]
    async fn build_to_sequence_number_stops_early() {
        let repository = repository(VecStore::seeded(order_one()));

        let aggregate = repository
            .build_to_sequence_number(&order_id("order-1"), SequenceNumber::new(2))
            .await
            .unwrap();

        assert_eq!(aggregate.sequence_number(), SequenceNumber::new(2));
        assert_eq!(aggregate.state().items, vec!["apple"]);
    }

    #[tokio::test]
    async fn build_to_date_uses_append_time() {
        let repository = repository(VecStore::seeded(order_one()));
        let id = order_id("order-1");

        let before_anything = repository.build_to_date(&id, at(5)).await.unwrap();
        let after_creation = repository.build_to_date(&id, at(15)).await.unwrap();

        assert!(before_anything.is_new());
        assert_eq!(after_creation.sequence_number(), SequenceNumber::first());
        assert_eq!(after_creation.state().customer.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn empty_stream_builds_default_with_identifier() {
        let repository = repository(VecStore::new());

        let aggregate = repository.build_latest(&order_id("order-9")).await.unwrap();

        assert_eq!(aggregate.aggregate_identifier(), &order_id("order-9"));
        assert!(aggregate.is_new());
        assert_eq!(aggregate.last_modification_date(), None);
    }

    #[tokio::test]
    async fn gapped_history_is_a_replay_error() {
        let repository = repository(VecStore::seeded(vec![
            event("order-1", 1, 10, OrderEvent::created("alice")),
            event("order-1", 3, 30, OrderEvent::item("pear")),
        ]));

        let err = repository.build_latest(&order_id("order-1")).await.unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Replay(ReplayError::SequenceGap { .. })
        ));
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let store = VecStore::new();
        store.fail_reads_with(EventStoreError::ConnectionFailed("refused".into()));
        let repository = repository(store);

        let err = repository.build_latest(&order_id("order-1")).await.unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::EventStore(EventStoreError::ConnectionFailed(_))
        ));
    }

    proptest! {
        #[test]
        fn building_to_a_prefix_then_applying_the_rest_matches(total in 1u64..20, split in 0u64..20) {
            let split = split.min(total);
            let mut history = vec![event("order-1", 1, 1, OrderEvent::created("c"))];
            for seq in 2..=total {
                history.push(event("order-1", seq, i64::try_from(seq).unwrap(), OrderEvent::item("sku")));
            }
            let repository = repository(VecStore::seeded(history.clone()));
            let id = order_id("order-1");
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let (mut prefix, full) = runtime.block_on(async {
                (
                    repository.build_to_sequence_number(&id, SequenceNumber::new(split)).await.unwrap(),
                    repository.build_to_sequence_number(&id, SequenceNumber::new(total)).await.unwrap(),
                )
            });
            let split_at = usize::try_from(split).unwrap();
            prefix.replay(&history[split_at..]).unwrap();

            prop_assert_eq!(prefix, full);
        }
    }
}
