//! Command processing under optimistic concurrency.
//!
//! One command cycle is: load (or create) the aggregate, let the kind decide
//! which events the command produces, and append them with the version the
//! decision was made against. If another writer got there first the store
//! rejects the append and nothing is written; the caller, or
//! [`CommandProcessor::execute_with_retry`], runs the whole cycle again on
//! fresh state.

use crate::aggregate::AggregateKind;
use crate::config::{ProcessorConfig, RetryConfig, RetryPolicy};
use crate::errors::{CommandError, CommandResult};
use crate::event::{EventMetadata, NewEvent};
use crate::event_store::EventStore;
use crate::repository::AggregateRepository;
use crate::types::{SequenceNumber, StreamId};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Which aggregate a command is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    /// A new aggregate with a generated identifier.
    New,
    /// A new aggregate at a caller-chosen identifier. Fails with a
    /// concurrency conflict if the stream already has events.
    NewAt(StreamId),
    /// The current state of an existing aggregate.
    Existing(StreamId),
}

/// Context information for command execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Correlation ID for request tracing.
    pub correlation_id: String,
    /// User ID for auditing.
    pub user_id: Option<String>,
    /// Additional metadata for the execution.
    pub metadata: HashMap<String, String>,
}

impl ExecutionContext {
    /// Creates a context with the given correlation ID.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            user_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the user ID.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn event_metadata(&self) -> EventMetadata {
        EventMetadata {
            correlation_id: Some(self.correlation_id.clone()),
            user_id: self.user_id.clone(),
            custom: self.metadata.clone(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Uuid::now_v7().to_string())
    }
}

/// What a successful command cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// The stream the command was applied to
    pub stream_id: StreamId,
    /// Stream version the decision was made against
    pub previous_version: SequenceNumber,
    /// Stream version after the append
    pub new_version: SequenceNumber,
    /// Number of events written
    pub events_appended: usize,
}

impl ProcessOutcome {
    /// True when the command was accepted but produced no events.
    pub const fn is_noop(&self) -> bool {
        self.events_appended == 0
    }
}

/// Runs commands against aggregates of kind `K` stored in `S`.
///
/// The processor holds no locks and no per-aggregate state: every call
/// rebuilds its own aggregate, so any number of tasks may share one
/// processor.
///
/// # Example
///
/// ```rust,ignore
/// let processor = CommandProcessor::new(repository)
///     .with_retry_config(RetryConfig::fast()?);
///
/// let outcome = processor.process(OrderCommand::Create { customer }).await?;
/// processor
///     .process_existing(&outcome.stream_id, OrderCommand::AddItem { sku })
///     .await?;
/// ```
#[derive(Debug)]
pub struct CommandProcessor<K: AggregateKind, S> {
    repository: AggregateRepository<K, S>,
    config: ProcessorConfig,
}

impl<K, S> CommandProcessor<K, S>
where
    K: AggregateKind,
    S: EventStore<Event = K::Event>,
{
    /// Creates a processor with the default configuration.
    pub fn new(repository: AggregateRepository<K, S>) -> Self {
        Self {
            repository,
            config: ProcessorConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// The repository aggregates are loaded from.
    pub const fn repository(&self) -> &AggregateRepository<K, S> {
        &self.repository
    }

    /// The active configuration.
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Applies `command` to a new aggregate with a generated identifier.
    pub async fn process(&self, command: K::Command) -> CommandResult<ProcessOutcome> {
        self.execute(CommandTarget::New, command, ExecutionContext::default())
            .await
    }

    /// Applies `command` to a new aggregate at `stream_id`.
    pub async fn process_new_at(
        &self,
        stream_id: &StreamId,
        command: K::Command,
    ) -> CommandResult<ProcessOutcome> {
        self.execute(
            CommandTarget::NewAt(stream_id.clone()),
            command,
            ExecutionContext::default(),
        )
        .await
    }

    /// Applies `command` to the latest state of `stream_id`.
    pub async fn process_existing(
        &self,
        stream_id: &StreamId,
        command: K::Command,
    ) -> CommandResult<ProcessOutcome> {
        self.execute(
            CommandTarget::Existing(stream_id.clone()),
            command,
            ExecutionContext::default(),
        )
        .await
    }

    /// Runs one read-decide-append cycle.
    ///
    /// Every appended event carries the context's correlation ID, user ID
    /// and metadata. If the kind decides on no events, nothing is appended
    /// and the outcome reports the version unchanged.
    ///
    /// # Errors
    ///
    /// - Domain rejections from `decide` are returned as-is.
    /// - [`CommandError::ConcurrencyConflict`] if the stream moved on after
    ///   it was read. Nothing was written.
    /// - Replay, instantiation and store failures from loading.
    #[instrument(skip(self, command, context), fields(kind = K::KIND, correlation_id = %context.correlation_id))]
    pub async fn execute(
        &self,
        target: CommandTarget,
        command: K::Command,
        context: ExecutionContext,
    ) -> CommandResult<ProcessOutcome> {
        let aggregate = match target {
            CommandTarget::New => self.repository.build_new()?,
            CommandTarget::NewAt(stream_id) => self.repository.build_new_with_id(stream_id)?,
            CommandTarget::Existing(stream_id) => self.repository.build_latest(&stream_id).await?,
        };
        let stream_id = aggregate.aggregate_identifier().clone();
        let previous_version = aggregate.sequence_number();

        let payloads = K::decide(&aggregate, command)?;

        if payloads.is_empty() {
            debug!(%stream_id, version = %previous_version, "command produced no events");
            return Ok(ProcessOutcome {
                stream_id,
                previous_version,
                new_version: previous_version,
                events_appended: 0,
            });
        }

        let events_appended = payloads.len();
        let metadata = context.event_metadata();
        let events = payloads
            .into_iter()
            .map(|payload| NewEvent::with_metadata(payload, metadata.clone()))
            .collect();

        let new_version = self
            .repository
            .store()
            .append(&stream_id, previous_version, events)
            .await
            .map_err(|err| {
                let err = CommandError::from(err);
                if err.is_retryable() {
                    warn!(%stream_id, expected = %previous_version, "concurrency conflict on append");
                }
                err
            })?;

        let expected_version =
            previous_version.advance(u64::try_from(events_appended).unwrap_or(u64::MAX));
        if new_version != expected_version {
            return Err(CommandError::Internal(format!(
                "store reported version {new_version} for stream '{stream_id}', expected {expected_version}"
            )));
        }

        debug!(%stream_id, %previous_version, %new_version, events_appended, "events appended");
        Ok(ProcessOutcome {
            stream_id,
            previous_version,
            new_version,
            events_appended,
        })
    }

    /// Runs [`execute`](Self::execute), re-running the full cycle while the
    /// retry policy accepts the error and attempts remain.
    ///
    /// Delays between attempts follow the configured exponential backoff
    /// with jitter.
    pub async fn execute_with_retry(
        &self,
        target: CommandTarget,
        command: K::Command,
        context: ExecutionContext,
    ) -> CommandResult<ProcessOutcome>
    where
        K::Command: Clone,
    {
        let max_attempts = self.config.retry.attempts();
        let mut attempt = 0;

        loop {
            let result = self
                .execute(target.clone(), command.clone(), context.clone())
                .await;
            let error = match result {
                Ok(outcome) => return Ok(outcome),
                Err(error) => error,
            };

            attempt += 1;
            if attempt >= max_attempts || !self.config.policy.should_retry(&error) {
                return Err(error);
            }

            let delay = self.config.retry.delay_for(attempt - 1);
            warn!(
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying command"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
