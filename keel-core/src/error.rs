//! Error taxonomy shared by the engine and its backends.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::concurrency::ConcurrencyConflict;

/// Malformed input, rejected before any I/O. A caller bug; never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("aggregate id must not be nil")]
    NilAggregateId,
    #[error("aggregate type must not be blank")]
    BlankAggregateType,
    #[error("event type must not be blank")]
    BlankEventType,
    #[error("cannot append an empty event batch")]
    EmptyBatch,
    #[error("expected version must be >= -1, got {0}")]
    InvalidExpectedVersion(i64),
    #[error("from sequence must be >= 0, got {0}")]
    NegativeFromSequence(i64),
    #[error("limit must be > 0")]
    ZeroLimit,
}

/// The aggregate a caller required does not exist.
///
/// The engine itself reports absence as version `-1`; this is a signal for
/// collaborators that need the aggregate to exist already.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("aggregate not found: {aggregate_id}")]
pub struct AggregateNotFound {
    pub aggregate_id: Uuid,
}

/// The engine operation during which a backend failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Append,
    ReadStream,
    ReadByEventType,
    ReadGlobal,
    ReadByCorrelationId,
    CurrentVersion,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Append => "append",
            Self::ReadStream => "read_stream",
            Self::ReadByEventType => "read_by_event_type",
            Self::ReadGlobal => "read_global",
            Self::ReadByCorrelationId => "read_by_correlation_id",
            Self::CurrentVersion => "current_version",
        })
    }
}

/// Error returned by [`Journal`](crate::journal::Journal) operations.
#[derive(Debug, Error)]
pub enum Error<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[error("invalid argument: {0}")]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// An event could not be serialized; nothing was written.
    #[error("failed to encode event #{index} ({event_type})")]
    Encode {
        index: usize,
        event_type: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    /// Infrastructure failure in the backend. Not retried.
    #[error("{operation} failed")]
    Store {
        operation: Operation,
        #[source]
        source: StoreError,
    },
}

impl<StoreError: std::error::Error + 'static> Error<StoreError> {
    pub const fn store(operation: Operation, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    /// The conflict details, if this is a concurrency conflict.
    pub const fn as_conflict(&self) -> Option<&ConcurrencyConflict> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
