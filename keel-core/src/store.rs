//! Persistence layer abstractions.
//!
//! This module describes the backend contract ([`EventStore`]), the wire
//! formats crossing it ([`PersistableEvent`], [`StoredEvent`]), pagination,
//! and the reference in-memory backend.
//!
//! Backends receive events already encoded; serialization and decoding belong
//! to the [`Journal`](crate::journal::Journal).
use std::future::Future;

use chrono::{DateTime, Utc};
pub use nonempty::NonEmpty;
use thiserror::Error;
use uuid::Uuid;

use crate::{concurrency::ConcurrencyConflict, error::ValidationError, metadata::EventMetadata};

pub mod inmemory;

/// An encoded event ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistableEvent {
    pub event_type: String,
    pub payload: Vec<u8>,
}

/// An event row as persisted, before payload decoding.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    /// 1-based position within the aggregate's stream.
    pub sequence_number: i64,
    pub payload: Vec<u8>,
    pub metadata: EventMetadata,
    /// Assigned by the store at write time.
    pub created_at: DateTime<Utc>,
}

/// A validated `LIMIT`/`OFFSET` window for cross-aggregate reads.
///
/// Results are ordered by `(created_at, event_id)`, so consecutive pages are
/// disjoint and their concatenation equals one larger page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    limit: u32,
    offset: u32,
}

impl Page {
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroLimit`] if `limit` is zero.
    pub const fn new(limit: u32, offset: u32) -> Result<Self, ValidationError> {
        if limit == 0 {
            return Err(ValidationError::ZeroLimit);
        }
        Ok(Self { limit, offset })
    }

    pub const fn limit(self) -> u32 {
        self.limit
    }

    pub const fn offset(self) -> u32 {
        self.offset
    }

    /// The page immediately following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

/// Result of a successful append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendResult {
    /// The aggregate's version after the append, i.e. the sequence number of
    /// the last event written.
    pub version: i64,
    /// Ids assigned to the written events, in batch order.
    pub event_ids: Vec<Uuid>,
}

/// Error from a backend append.
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error,
{
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Another writer changed the aggregate first.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error> AppendError<StoreError> {
    /// Create a store error variant.
    pub const fn store(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Convenience alias for append outcomes returned by event stores.
pub type AppendOutcome<Err> = Result<AppendResult, AppendError<Err>>;

/// Convenience alias for event batches read from a store.
pub type ReadResult<Err> = Result<Vec<StoredEvent>, Err>;

/// Abstraction over the append-only event log.
///
/// Implementations must guarantee, for each aggregate:
/// - the version check and the insert of a batch are one atomic unit;
/// - sequence numbers run `1..=version` with no gaps or duplicates;
/// - existing events are never updated or deleted.
pub trait EventStore: Send + Sync {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Current version of an aggregate, or
    /// [`NO_VERSION`](crate::concurrency::NO_VERSION) if it has never been
    /// written. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the lookup fails.
    fn current_version(
        &self,
        aggregate_id: Uuid,
    ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

    /// Append a batch to an aggregate if its version equals
    /// `expected_version`.
    ///
    /// Events receive consecutive sequence numbers starting at
    /// `expected_version + 1`, in batch order. An aggregate seen for the first
    /// time (`expected_version == -1`) is created at version 0 first.
    /// `metadata` applies to every event in the batch.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] on a version mismatch, including a
    /// lost insert race, [`AppendError::Invalid`] for malformed input, or
    /// [`AppendError::Store`] if persistence fails. Nothing is persisted in
    /// any error case.
    fn append<'a>(
        &'a self,
        aggregate_id: Uuid,
        aggregate_type: &'a str,
        expected_version: i64,
        events: NonEmpty<PersistableEvent>,
        metadata: &'a EventMetadata,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a;

    /// Events of one aggregate with `sequence_number >= from_sequence`,
    /// ascending by sequence number.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn read_stream(
        &self,
        aggregate_id: Uuid,
        from_sequence: i64,
    ) -> impl Future<Output = ReadResult<Self::Error>> + Send + '_;

    /// Events of one type across all aggregates, ordered by
    /// `(created_at, event_id)`.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn read_by_event_type<'a>(
        &'a self,
        event_type: &'a str,
        page: Page,
    ) -> impl Future<Output = ReadResult<Self::Error>> + Send + 'a;

    /// All events, ordered by `(created_at, event_id)`.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn read_global(&self, page: Page) -> impl Future<Output = ReadResult<Self::Error>> + Send + '_;

    /// All events recorded under one correlation id, ordered by
    /// `(created_at, event_id)`.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn read_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> impl Future<Output = ReadResult<Self::Error>> + Send + '_;
}

/// Input checks every backend applies before touching storage.
pub mod validate {
    use uuid::Uuid;

    use crate::{concurrency::NO_VERSION, error::ValidationError};

    /// # Errors
    ///
    /// Returns [`ValidationError::NilAggregateId`] for the nil UUID.
    pub fn aggregate_id(aggregate_id: Uuid) -> Result<(), ValidationError> {
        if aggregate_id.is_nil() {
            return Err(ValidationError::NilAggregateId);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the first violated precondition of an append.
    pub fn append(
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
    ) -> Result<(), ValidationError> {
        self::aggregate_id(aggregate_id)?;
        if aggregate_type.trim().is_empty() {
            return Err(ValidationError::BlankAggregateType);
        }
        if expected_version < NO_VERSION {
            return Err(ValidationError::InvalidExpectedVersion(expected_version));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::BlankEventType`] for blank discriminators.
    pub fn event_type(event_type: &str) -> Result<(), ValidationError> {
        if event_type.trim().is_empty() {
            return Err(ValidationError::BlankEventType);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::NegativeFromSequence`] below zero.
    pub const fn from_sequence(from_sequence: i64) -> Result<(), ValidationError> {
        if from_sequence < 0 {
            return Err(ValidationError::NegativeFromSequence(from_sequence));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_rejects_zero_limit() {
        assert_eq!(Page::new(0, 0), Err(ValidationError::ZeroLimit));
        assert_eq!(Page::new(0, 10), Err(ValidationError::ZeroLimit));
    }

    #[test]
    fn next_page_starts_where_previous_ended() {
        let page = Page::new(2, 0).unwrap().next();
        assert_eq!((page.limit(), page.offset()), (2, 2));
        assert_eq!(page.next().offset(), 4);
    }

    #[test]
    fn next_page_saturates() {
        let page = Page::new(10, u32::MAX - 3).unwrap().next();
        assert_eq!(page.offset(), u32::MAX);
    }

    #[test]
    fn append_validation_checks_id_type_and_version() {
        let id = Uuid::now_v7();
        assert_eq!(
            validate::append(Uuid::nil(), "Ruleset", -1),
            Err(ValidationError::NilAggregateId)
        );
        assert_eq!(
            validate::append(id, "  ", -1),
            Err(ValidationError::BlankAggregateType)
        );
        assert_eq!(
            validate::append(id, "Ruleset", -2),
            Err(ValidationError::InvalidExpectedVersion(-2))
        );
        assert_eq!(validate::append(id, "Ruleset", -1), Ok(()));
        assert_eq!(validate::append(id, "Ruleset", 12), Ok(()));
    }

    #[test]
    fn from_sequence_must_not_be_negative() {
        assert_eq!(
            validate::from_sequence(-1),
            Err(ValidationError::NegativeFromSequence(-1))
        );
        assert_eq!(validate::from_sequence(0), Ok(()));
    }

    #[test]
    fn event_type_must_not_be_blank() {
        assert_eq!(validate::event_type(""), Err(ValidationError::BlankEventType));
        assert_eq!(validate::event_type("RegattaCreated"), Ok(()));
    }
}
