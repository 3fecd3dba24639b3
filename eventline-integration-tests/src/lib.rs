//! Integration tests for `Eventline`
//!
//! This crate holds the fixtures shared by the suites under `tests/`: a
//! small order domain and helpers that wire it to the in-memory store.

#![allow(missing_docs, clippy::missing_panics_doc)]

use chrono::{TimeZone, Utc};
use eventline::{
    Aggregate, AggregateFactory, AggregateKind, AggregateRegistry, AggregateRepository,
    CommandError, CommandProcessor, CommandResult, EventStore, StreamId, Timestamp,
};
use eventline_memory::InMemoryEventStore;
use tracing_subscriber::EnvFilter;

pub struct Order;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderState {
    pub customer: Option<String>,
    pub items: Vec<String>,
    pub shipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Created { customer: String },
    ItemAdded { sku: String },
    Shipped,
}

#[derive(Debug, Clone)]
pub enum OrderCommand {
    Create { customer: String },
    AddItem { sku: String },
    Ship,
}

impl OrderCommand {
    pub fn create(customer: &str) -> Self {
        Self::Create {
            customer: customer.to_string(),
        }
    }

    pub fn add_item(sku: &str) -> Self {
        Self::AddItem {
            sku: sku.to_string(),
        }
    }
}

impl AggregateKind for Order {
    const KIND: &'static str = "order";
    type State = OrderState;
    type Event = OrderEvent;
    type Command = OrderCommand;

    fn apply(state: &mut OrderState, event: &OrderEvent) {
        match event {
            OrderEvent::Created { customer } => state.customer = Some(customer.clone()),
            OrderEvent::ItemAdded { sku } => state.items.push(sku.clone()),
            OrderEvent::Shipped => state.shipped = true,
        }
    }

    fn decide(aggregate: &Aggregate<Self>, command: OrderCommand) -> CommandResult<Vec<OrderEvent>> {
        let state = aggregate.state();
        match command {
            OrderCommand::Create { customer } => {
                if state.customer.is_some() {
                    return Err(CommandError::BusinessRuleViolation(
                        "order already exists".into(),
                    ));
                }
                if customer.trim().is_empty() {
                    return Err(CommandError::ValidationFailed("customer is required".into()));
                }
                Ok(vec![OrderEvent::Created { customer }])
            }
            OrderCommand::AddItem { sku } => {
                if state.customer.is_none() {
                    return Err(CommandError::BusinessRuleViolation(
                        "order does not exist".into(),
                    ));
                }
                if state.shipped {
                    return Err(CommandError::BusinessRuleViolation(
                        "order already shipped".into(),
                    ));
                }
                Ok(vec![OrderEvent::ItemAdded { sku }])
            }
            OrderCommand::Ship => {
                if state.shipped {
                    return Err(CommandError::BusinessRuleViolation(
                        "order already shipped".into(),
                    ));
                }
                if state.items.is_empty() {
                    return Err(CommandError::BusinessRuleViolation(
                        "cannot ship an empty order".into(),
                    ));
                }
                Ok(vec![OrderEvent::Shipped])
            }
        }
    }
}

pub type OrderStore = InMemoryEventStore<OrderEvent>;

pub fn order_id(id: &str) -> StreamId {
    StreamId::try_new(id).expect("valid stream id")
}

pub fn at(secs: i64) -> Timestamp {
    Timestamp::new(Utc.timestamp_opt(secs, 0).single().expect("valid timestamp"))
}

pub fn registry() -> AggregateRegistry {
    AggregateRegistry::new()
        .with(AggregateFactory::<Order>::from_default())
        .expect("order factory registers")
}

pub fn order_repository<S>(store: S) -> AggregateRepository<Order, S>
where
    S: EventStore<Event = OrderEvent>,
{
    AggregateRepository::from_registry(store, &registry()).expect("order kind is registered")
}

pub fn order_processor<S>(store: S) -> CommandProcessor<Order, S>
where
    S: EventStore<Event = OrderEvent>,
{
    CommandProcessor::new(order_repository(store))
}

/// Writes the `order-1` history: created by alice, then apple and pear.
pub async fn seed_order_one<S>(processor: &CommandProcessor<Order, S>) -> StreamId
where
    S: EventStore<Event = OrderEvent>,
{
    let id = order_id("order-1");
    processor
        .process_new_at(&id, OrderCommand::create("alice"))
        .await
        .expect("order-1 is created");
    for sku in ["apple", "pear"] {
        processor
            .process_existing(&id, OrderCommand::add_item(sku))
            .await
            .expect("item is added");
    }
    id
}

/// Installs a `fmt` subscriber honouring `RUST_LOG`, for ad-hoc debugging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
