//! Failure injection for resilience tests.
//!
//! [`FaultInjectingStore`] wraps any [`EventStore`] and misbehaves on
//! request: it can fail a number of upcoming reads or appends with a chosen
//! error, slow appends down, or slip a competing write in right before the
//! next append so that append loses the version check for real.
//!
//! ```rust,ignore
//! let store = FaultInjectingStore::new(InMemoryEventStore::new())
//!     .with_append_latency(Duration::from_millis(5));
//! store.inject_competing_write(OrderEvent::NoteAdded("interloper".into()));
//! store.fail_next_appends(2, EventStoreError::Unavailable("failover".into()));
//! ```

use async_trait::async_trait;
use eventline::{
    Event, EventStore, EventStoreError, EventStoreResult, EventWindow, NewEvent, SequenceNumber,
    StreamId,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::warn;

struct Faults<E> {
    failing_reads: usize,
    read_error: Option<EventStoreError>,
    failing_appends: usize,
    append_error: Option<EventStoreError>,
    competing_writes: VecDeque<E>,
    append_attempts: usize,
}

impl<E> Default for Faults<E> {
    fn default() -> Self {
        Self {
            failing_reads: 0,
            read_error: None,
            failing_appends: 0,
            append_error: None,
            competing_writes: VecDeque::new(),
            append_attempts: 0,
        }
    }
}

fn take_fault(remaining: &mut usize, error: Option<&EventStoreError>) -> Option<EventStoreError> {
    if *remaining == 0 {
        return None;
    }
    *remaining -= 1;
    error.cloned()
}

enum AppendFault<E> {
    Fail(EventStoreError),
    Compete(E),
    None,
}

/// An [`EventStore`] wrapper that injects failures on demand.
pub struct FaultInjectingStore<S: EventStore> {
    inner: S,
    faults: Mutex<Faults<S::Event>>,
    append_latency: Option<Duration>,
}

impl<S: EventStore> FaultInjectingStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            append_latency: None,
        }
    }

    /// Delays every append by `latency` before it reaches the inner store.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_append_latency(mut self, latency: Duration) -> Self {
        self.append_latency = Some(latency);
        self
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Fails the next `count` reads with `error`.
    pub fn fail_next_reads(&self, count: usize, error: EventStoreError) {
        let mut faults = self.faults.lock();
        faults.failing_reads = count;
        faults.read_error = Some(error);
    }

    /// Fails the next `count` appends with `error`, without touching the
    /// inner store.
    pub fn fail_next_appends(&self, count: usize, error: EventStoreError) {
        let mut faults = self.faults.lock();
        faults.failing_appends = count;
        faults.append_error = Some(error);
    }

    /// Queues `payload` to be appended by a phantom writer immediately
    /// before the next append, which will then see a concurrency conflict.
    ///
    /// Queue several to make several consecutive appends lose.
    pub fn inject_competing_write(&self, payload: S::Event) {
        self.faults.lock().competing_writes.push_back(payload);
    }

    /// Number of appends attempted through this wrapper, failed ones
    /// included.
    pub fn append_attempts(&self) -> usize {
        self.faults.lock().append_attempts
    }

    fn next_append_fault(&self) -> AppendFault<S::Event> {
        let mut faults = self.faults.lock();
        faults.append_attempts += 1;
        let Faults {
            failing_appends,
            append_error,
            competing_writes,
            ..
        } = &mut *faults;
        if let Some(error) = take_fault(failing_appends, append_error.as_ref()) {
            return AppendFault::Fail(error);
        }
        competing_writes
            .pop_front()
            .map_or(AppendFault::None, AppendFault::Compete)
    }
}

impl<S> fmt::Debug for FaultInjectingStore<S>
where
    S: EventStore + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultInjectingStore")
            .field("inner", &self.inner)
            .field("append_latency", &self.append_latency)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S> EventStore for FaultInjectingStore<S>
where
    S: EventStore,
{
    type Event = S::Event;

    async fn read(
        &self,
        stream_id: &StreamId,
        window: &EventWindow,
    ) -> EventStoreResult<Vec<Event<Self::Event>>> {
        let fault = {
            let mut faults = self.faults.lock();
            let Faults {
                failing_reads,
                read_error,
                ..
            } = &mut *faults;
            take_fault(failing_reads, read_error.as_ref())
        };
        if let Some(error) = fault {
            warn!(%stream_id, %error, "injected read failure");
            return Err(error);
        }
        self.inner.read(stream_id, window).await
    }

    async fn append(
        &self,
        stream_id: &StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent<Self::Event>>,
    ) -> EventStoreResult<SequenceNumber> {
        if let Some(latency) = self.append_latency {
            tokio::time::sleep(latency).await;
        }

        match self.next_append_fault() {
            AppendFault::Fail(error) => {
                warn!(%stream_id, %error, "injected append failure");
                return Err(error);
            }
            AppendFault::Compete(payload) => {
                let current = self.inner.stream_version(stream_id).await?;
                self.inner
                    .append(stream_id, current, vec![NewEvent::new(payload)])
                    .await?;
                warn!(%stream_id, "injected competing write");
            }
            AppendFault::None => {}
        }

        self.inner.append(stream_id, expected_version, events).await
    }

    async fn stream_version(&self, stream_id: &StreamId) -> EventStoreResult<SequenceNumber> {
        self.inner.stream_version(stream_id).await
    }
}
