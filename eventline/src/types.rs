//! Core value types for the `Eventline` library.
//!
//! All types use smart constructors so an instance is valid by construction.
//! Once a `StreamId` exists it never needs re-checking.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies an event stream, and therefore the aggregate instance that owns it.
///
/// `StreamId` values are trimmed, non-empty and at most 255 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

impl StreamId {
    /// Generates a fresh, globally unique stream identifier.
    ///
    /// The identifier is the hyphenated form of a `UUIDv7`, so identifiers
    /// generated later sort after earlier ones.
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().to_string())
            .expect("a hyphenated UUID is always a valid stream id")
    }
}

/// A globally unique event identifier in `UUIDv7` format.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of an event within its stream.
///
/// Events are numbered from 1. The value 0 means "nothing applied yet" and is
/// also the version of a stream that has no events. A stream's version is the
/// sequence number of its last event.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    From,
    Serialize,
    Deserialize
))]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// The version of an empty or not-yet-created stream.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// The sequence number of the first event in any stream.
    pub fn first() -> Self {
        Self::new(1)
    }

    /// Returns the sequence number directly after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner().saturating_add(1))
    }

    /// Returns the sequence number directly after this one, or `None` once
    /// the range is exhausted.
    pub fn checked_next(self) -> Option<Self> {
        self.into_inner().checked_add(1).map(Self::new)
    }

    /// Returns the sequence number `count` positions after this one.
    #[must_use]
    pub fn advance(self, count: u64) -> Self {
        Self::new(self.into_inner().saturating_add(count))
    }

    /// True when no event has been applied or appended yet.
    pub fn is_initial(self) -> bool {
        self.into_inner() == 0
    }
}

/// A point in time attached to an event when it was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
