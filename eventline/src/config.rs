//! Command processor configuration with type-safe validation.
//!
//! Every tunable is a `nutype` newtype so an out-of-range value is rejected
//! when the configuration is built or deserialized, never discovered
//! mid-retry. All types are `serde` (de)serializable so a host application
//! can load them from its own config files.

use crate::errors::CommandError;
use nutype::nutype;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Total number of attempts the processor makes for one command, the first
/// one included.
///
/// Validated to be between 1 and 10 so a conflict storm cannot loop forever.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct MaxRetryAttempts(u32);

/// Delay before the first retry, in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryBaseDelayMs(u64);

impl RetryBaseDelayMs {
    /// Convert to Duration for use with `tokio::time::sleep`.
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.into())
    }
}

/// Upper bound for any single retry delay, in milliseconds.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 300_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct RetryMaxDelayMs(u64);

/// Exponential backoff multiplier for retry delays.
#[nutype(
    validate(greater_or_equal = 1.0, less_or_equal = 4.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Into, Serialize, Deserialize)
)]
pub struct BackoffMultiplier(f64);

/// A configuration value was out of range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A single field failed validation.
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// The offending field
        field: &'static str,
        /// Validation failure details
        reason: String,
    },

    /// Two fields are individually valid but contradict each other.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

impl ConfigError {
    fn invalid(field: &'static str, err: impl std::fmt::Debug) -> Self {
        Self::Invalid {
            field,
            reason: format!("{err:?}"),
        }
    }
}

/// How a failed command cycle is retried.
///
/// Deserialization goes through [`RetryConfig::from_parts`], so a loaded
/// configuration is checked exactly like one built in code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryConfig")]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: MaxRetryAttempts,
    /// Delay before the first retry.
    pub base_delay: RetryBaseDelayMs,
    /// Cap applied to every delay.
    pub max_delay: RetryMaxDelayMs,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: BackoffMultiplier,
}

impl RetryConfig {
    /// Builds a configuration from raw values, validating each one.
    pub fn from_parts(
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
    ) -> Result<Self, ConfigError> {
        if base_delay_ms > max_delay_ms {
            return Err(ConfigError::Inconsistent(format!(
                "base delay {base_delay_ms}ms exceeds max delay {max_delay_ms}ms"
            )));
        }
        Ok(Self {
            max_attempts: MaxRetryAttempts::try_new(max_attempts)
                .map_err(|e| ConfigError::invalid("max_attempts", e))?,
            base_delay: RetryBaseDelayMs::try_new(base_delay_ms)
                .map_err(|e| ConfigError::invalid("base_delay", e))?,
            max_delay: RetryMaxDelayMs::try_new(max_delay_ms)
                .map_err(|e| ConfigError::invalid("max_delay", e))?,
            backoff_multiplier: BackoffMultiplier::try_new(backoff_multiplier)
                .map_err(|e| ConfigError::invalid("backoff_multiplier", e))?,
        })
    }

    /// Few attempts with short delays, for interactive callers that prefer
    /// failing fast.
    pub fn fast() -> Result<Self, ConfigError> {
        Self::from_parts(2, 10, 1_000, 1.5)
    }

    /// Many attempts with long delays, for background workers on hot streams.
    pub fn fault_tolerant() -> Result<Self, ConfigError> {
        Self::from_parts(10, 200, 120_000, 2.0)
    }

    /// Total attempts, the first one included.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.into_inner()
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Exponential backoff capped at `max_delay`, with ±25% jitter so racing
    /// writers do not retry in lockstep.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.into_inner() as f64;
        let max_ms = self.max_delay.into_inner() as f64;
        let multiplier = self.backoff_multiplier.into_inner();

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = (base_ms * multiplier.powi(exponent)).min(max_ms);

        let jitter = delay * 0.25 * rand::rng().random_range(-1.0..=1.0);
        let final_ms = (delay + jitter).clamp(0.0, max_ms);

        Duration::from_millis(final_ms.round() as u64)
    }
}

#[derive(Deserialize)]
struct RawRetryConfig {
    max_attempts: u32,
    base_delay: u64,
    max_delay: u64,
    backoff_multiplier: f64,
}

impl TryFrom<RawRetryConfig> for RetryConfig {
    type Error = ConfigError;

    fn try_from(raw: RawRetryConfig) -> Result<Self, Self::Error> {
        Self::from_parts(
            raw.max_attempts,
            raw.base_delay,
            raw.max_delay,
            raw.backoff_multiplier,
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_parts(3, 100, 30_000, 2.0)
            .expect("Default retry configuration should always be valid")
    }
}

/// Which command failures are worth another full read-decide-append cycle.
#[derive(Debug, Clone, Copy, Default)]
pub enum RetryPolicy {
    /// Only retry on concurrency conflicts.
    #[default]
    ConcurrencyConflictsOnly,
    /// Retry on concurrency conflicts and transient store failures.
    ConcurrencyAndTransient,
    /// Custom policy with user-defined predicate.
    Custom(fn(&CommandError) -> bool),
}

impl RetryPolicy {
    /// Determines if an error should trigger a retry.
    pub fn should_retry(&self, error: &CommandError) -> bool {
        match self {
            Self::ConcurrencyConflictsOnly => error.is_retryable(),
            Self::ConcurrencyAndTransient => {
                error.is_retryable()
                    || matches!(error, CommandError::EventStore(e) if e.is_transient())
            }
            Self::Custom(predicate) => predicate(error),
        }
    }
}

/// Everything the command processor can be tuned with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorConfig {
    /// Backoff settings for `execute_with_retry`.
    pub retry: RetryConfig,
    /// Which errors `execute_with_retry` retries.
    pub policy: RetryPolicy,
}
