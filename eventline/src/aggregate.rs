//! Aggregates: deterministic state machines rebuilt by replaying a stream.
//!
//! An aggregate kind is described once by implementing [`AggregateKind`]:
//! its tag, its state, the events that move the state and the commands it
//! decides on. The [`Aggregate`] wrapper owns the replay bookkeeping
//! (identifier, last sequence number, last modification time) and enforces
//! the ordering invariant, so kinds only ever see events in exact sequence.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Counter;
//!
//! impl AggregateKind for Counter {
//!     const KIND: &'static str = "counter";
//!     type State = u64;
//!     type Event = CounterEvent;
//!     type Command = CounterCommand;
//!
//!     fn apply(state: &mut u64, event: &CounterEvent) {
//!         match event {
//!             CounterEvent::Added(n) => *state += n,
//!         }
//!     }
//!
//!     fn decide(aggregate: &Aggregate<Self>, command: CounterCommand) -> CommandResult<Vec<CounterEvent>> {
//!         match command {
//!             CounterCommand::Add(0) => Err(CommandError::ValidationFailed("zero".into())),
//!             CounterCommand::Add(n) => Ok(vec![CounterEvent::Added(n)]),
//!         }
//!     }
//! }
//! ```

use crate::errors::{CommandResult, ReplayError};
use crate::event::Event;
use crate::types::{SequenceNumber, StreamId, Timestamp};
use std::fmt;

/// One kind of aggregate: its state, events, commands and the two pure
/// functions that connect them.
///
/// # Contract
///
/// - [`apply`](AggregateKind::apply) must be deterministic and free of side
///   effects: the same state and event always produce the same next state. It
///   must be total; events it does not care about leave the state unchanged.
/// - [`decide`](AggregateKind::decide) must not perform I/O. It inspects the
///   fully replayed aggregate and returns the events to append, in order, or
///   rejects the command.
pub trait AggregateKind: Sized + Send + Sync + 'static {
    /// Tag identifying this kind, e.g. `"order"`. Used as the registry key.
    const KIND: &'static str;

    /// Domain state rebuilt by replay.
    type State: Send + Sync;

    /// Domain events this kind produces and consumes.
    type Event: Send + Sync;

    /// Commands this kind decides on.
    type Command: Send + Sync;

    /// Applies one event to the state.
    fn apply(state: &mut Self::State, event: &Self::Event);

    /// Evaluates `command` against the current aggregate.
    fn decide(aggregate: &Aggregate<Self>, command: Self::Command)
        -> CommandResult<Vec<Self::Event>>;
}

/// An aggregate instance as of some position in its stream.
///
/// Callers never mutate an `Aggregate` directly: it is built by the
/// repository, advanced only through [`apply_event`](Self::apply_event), and
/// dropped once the command that needed it has been processed.
pub struct Aggregate<K: AggregateKind> {
    aggregate_identifier: StreamId,
    sequence_number: SequenceNumber,
    last_modification_date: Option<Timestamp>,
    state: K::State,
}

impl<K: AggregateKind> Aggregate<K> {
    /// Creates an aggregate that has not applied any event yet.
    pub fn new(aggregate_identifier: StreamId, state: K::State) -> Self {
        Self {
            aggregate_identifier,
            sequence_number: SequenceNumber::initial(),
            last_modification_date: None,
            state,
        }
    }

    /// Identifier of the owning stream.
    pub const fn aggregate_identifier(&self) -> &StreamId {
        &self.aggregate_identifier
    }

    /// Sequence number of the last applied event, 0 if none.
    pub const fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// Append time of the last applied event.
    pub const fn last_modification_date(&self) -> Option<Timestamp> {
        self.last_modification_date
    }

    /// The domain state.
    pub const fn state(&self) -> &K::State {
        &self.state
    }

    /// True while no event has been applied.
    pub fn is_new(&self) -> bool {
        self.sequence_number.is_initial()
    }

    /// Applies the next event of the stream.
    ///
    /// The event must belong to this aggregate's stream and carry exactly
    /// `sequence_number + 1`. Both checks run before anything changes, so a
    /// rejected event leaves the aggregate exactly as it was.
    pub fn apply_event(&mut self, event: &Event<K::Event>) -> Result<(), ReplayError> {
        if event.stream_id != self.aggregate_identifier {
            return Err(ReplayError::StreamMismatch {
                expected: self.aggregate_identifier.clone(),
                actual: event.stream_id.clone(),
            });
        }

        let Some(expected) = self.sequence_number.checked_next() else {
            return Err(ReplayError::SequenceExhausted {
                stream: self.aggregate_identifier.clone(),
            });
        };
        if event.sequence_number != expected {
            return Err(ReplayError::SequenceGap {
                stream: self.aggregate_identifier.clone(),
                expected,
                actual: event.sequence_number,
            });
        }

        self.sequence_number = event.sequence_number;
        self.last_modification_date = Some(event.occurred_at);
        K::apply(&mut self.state, &event.payload);
        Ok(())
    }

    /// Applies `events` in order, stopping at the first rejected one.
    ///
    /// Events before the rejected one stay applied.
    pub fn replay<'a, I>(&mut self, events: I) -> Result<(), ReplayError>
    where
        I: IntoIterator<Item = &'a Event<K::Event>>,
        K::Event: 'a,
    {
        events
            .into_iter()
            .try_for_each(|event| self.apply_event(event))
    }
}

impl<K> Clone for Aggregate<K>
where
    K: AggregateKind,
    K::State: Clone,
{
    fn clone(&self) -> Self {
        Self {
            aggregate_identifier: self.aggregate_identifier.clone(),
            sequence_number: self.sequence_number,
            last_modification_date: self.last_modification_date,
            state: self.state.clone(),
        }
    }
}

impl<K> PartialEq for Aggregate<K>
where
    K: AggregateKind,
    K::State: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.aggregate_identifier == other.aggregate_identifier
            && self.sequence_number == other.sequence_number
            && self.last_modification_date == other.last_modification_date
            && self.state == other.state
    }
}

impl<K> fmt::Debug for Aggregate<K>
where
    K: AggregateKind,
    K::State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("kind", &K::KIND)
            .field("aggregate_identifier", &self.aggregate_identifier)
            .field("sequence_number", &self.sequence_number)
            .field("last_modification_date", &self.last_modification_date)
            .field("state", &self.state)
            .finish()
    }
}
