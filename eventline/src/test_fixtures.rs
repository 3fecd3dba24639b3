//! Shared fixtures for the unit tests: a small order domain and an
//! inspectable store double.

use crate::aggregate::{Aggregate, AggregateKind};
use crate::errors::{CommandError, CommandResult, EventStoreError, EventStoreResult};
use crate::event::{Event, NewEvent};
use crate::event_store::{EventStore, EventWindow};
use crate::types::{EventId, SequenceNumber, StreamId, Timestamp};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

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

impl OrderEvent {
    pub fn created(customer: &str) -> Self {
        Self::Created {
            customer: customer.to_string(),
        }
    }

    pub fn item(sku: &str) -> Self {
        Self::ItemAdded {
            sku: sku.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum OrderCommand {
    Create { customer: String },
    AddItem { sku: String },
    Ship,
    /// Accepted but produces nothing.
    Inspect,
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
            OrderCommand::Inspect => Ok(vec![]),
        }
    }
}

pub fn order_id(id: &str) -> StreamId {
    StreamId::try_new(id).unwrap()
}

pub fn at(secs: i64) -> Timestamp {
    Timestamp::new(Utc.timestamp_opt(secs, 0).unwrap())
}

pub fn event(stream: &str, seq: u64, secs: i64, payload: OrderEvent) -> Event<OrderEvent> {
    Event::new(
        EventId::new(),
        order_id(stream),
        SequenceNumber::new(seq),
        at(secs),
        payload,
        None,
    )
}

/// The `order-1` history used throughout: created, then two items.
pub fn order_one() -> Vec<Event<OrderEvent>> {
    vec![
        event("order-1", 1, 10, OrderEvent::created("alice")),
        event("order-1", 2, 20, OrderEvent::item("apple")),
        event("order-1", 3, 30, OrderEvent::item("pear")),
    ]
}

/// Store double that keeps events in insertion order and counts reads.
///
/// Unlike a real adapter it does not sort, so tests can seed events out of
/// order.
#[derive(Default)]
pub struct VecStore {
    streams: Mutex<HashMap<StreamId, Vec<Event<OrderEvent>>>>,
    read_calls: AtomicUsize,
    read_error: Mutex<Option<EventStoreError>>,
}

impl VecStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(events: Vec<Event<OrderEvent>>) -> Self {
        let store = Self::new();
        store.seed(events);
        store
    }

    pub fn seed(&self, events: Vec<Event<OrderEvent>>) {
        let mut streams = self.streams.lock().unwrap();
        for event in events {
            streams.entry(event.stream_id.clone()).or_default().push(event);
        }
    }

    pub fn fail_reads_with(&self, error: EventStoreError) {
        *self.read_error.lock().unwrap() = Some(error);
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn events(&self, stream_id: &StreamId) -> Vec<Event<OrderEvent>> {
        self.streams
            .lock()
            .unwrap()
            .get(stream_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventStore for VecStore {
    type Event = OrderEvent;

    async fn read(
        &self,
        stream_id: &StreamId,
        window: &EventWindow,
    ) -> EventStoreResult<Vec<Event<OrderEvent>>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.read_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .events(stream_id)
            .into_iter()
            .filter(|e| window.contains(e))
            .collect())
    }

    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent<OrderEvent>>,
    ) -> EventStoreResult<SequenceNumber> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams.entry(stream_id.clone()).or_default();
        let current = stream
            .iter()
            .map(|e| e.sequence_number)
            .max()
            .unwrap_or_else(SequenceNumber::initial);
        if current != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                stream: stream_id.clone(),
                expected: expected_version,
                current,
            });
        }
        let mut version = current;
        for new_event in events {
            version = version.next();
            stream.push(Event::from_new(
                new_event,
                stream_id.clone(),
                version,
                Timestamp::now(),
            ));
        }
        Ok(version)
    }

    async fn stream_version(&self, stream_id: &StreamId) -> EventStoreResult<SequenceNumber> {
        Ok(self
            .events(stream_id)
            .iter()
            .map(|e| e.sequence_number)
            .max()
            .unwrap_or_else(SequenceNumber::initial))
    }
}
