//! The typed engine callers use to append and read events.
//!
//! [`Journal`] sits in front of any [`EventStore`] backend. It validates
//! input before I/O, encodes events with the injected [`Codec`], decodes rows
//! through the [`EventRegistry`], and tags backend failures with the
//! operation that hit them. It never retries: on
//! [`Error::Conflict`](crate::error::Error::Conflict) the caller re-reads,
//! recomputes its batch, and appends again.
//!
//! # Example
//!
//! ```
//! use keel_core::{
//!     codec::JsonCodec,
//!     concurrency::NO_VERSION,
//!     event::{EventRegistry, RawEvent},
//!     journal::Journal,
//!     metadata::EventMetadata,
//!     store::inmemory,
//! };
//! use uuid::Uuid;
//!
//! # tokio_test::block_on(async {
//! let journal: Journal<_, _, RawEvent> =
//!     Journal::new(inmemory::Store::new(), JsonCodec, EventRegistry::new());
//! let id = Uuid::now_v7();
//!
//! journal
//!     .append(
//!         id,
//!         "Ruleset",
//!         NO_VERSION,
//!         [RawEvent::new("RulesetCreated", br#"{"name":"Masters"}"#.to_vec())],
//!         &EventMetadata::new(),
//!     )
//!     .await
//!     .unwrap();
//!
//! assert_eq!(journal.current_version(id).await.unwrap(), 1);
//! # });
//! ```

use std::sync::Arc;

use nonempty::NonEmpty;
use uuid::Uuid;

use crate::{
    codec::Codec,
    envelope::EventEnvelope,
    error::{Error, Operation, ValidationError},
    event::{EventRegistry, SerializableEvent},
    metadata::EventMetadata,
    store::{AppendError, AppendResult, EventStore, Page, PersistableEvent, StoredEvent, validate},
};

/// Result alias for journal operations over backend `S`.
pub type JournalResult<T, S> = Result<T, Error<<S as EventStore>::Error>>;

/// Typed append/read facade over an event store backend.
///
/// Stateless apart from its collaborators; cloning is cheap when the backend
/// is (the registry is shared).
pub struct Journal<S, C: Codec, E> {
    store: S,
    codec: C,
    registry: Arc<EventRegistry<C, E>>,
}

impl<S: Clone, C: Codec, E> Clone for Journal<S, C, E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            codec: self.codec.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S, C, E> Journal<S, C, E>
where
    S: EventStore,
    C: Codec,
    E: 'static,
{
    pub fn new(store: S, codec: C, registry: EventRegistry<C, E>) -> Self {
        Self {
            store,
            codec,
            registry: Arc::new(registry),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &EventRegistry<C, E> {
        &self.registry
    }

    /// Append `events` to an aggregate, in order, if its current version is
    /// `expected_version` ([`NO_VERSION`](crate::concurrency::NO_VERSION) to
    /// create it).
    ///
    /// All events are encoded before the backend is called; the batch is
    /// written all-or-nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::Invalid`] for a nil id, blank type, bad version or empty batch
    /// - [`Error::Encode`] if an event cannot be serialized
    /// - [`Error::Conflict`] if the stored version differs
    /// - [`Error::Store`] on backend failure
    #[tracing::instrument(
        skip(self, events, metadata),
        fields(
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            expected_version = expected_version
        )
    )]
    pub async fn append<I, T>(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: I,
        metadata: &EventMetadata,
    ) -> JournalResult<AppendResult, S>
    where
        I: IntoIterator<Item = T>,
        T: SerializableEvent,
    {
        validate::append(aggregate_id, aggregate_type, expected_version)?;
        let encoded = self.encode_batch(events)?;
        let Some(batch) = NonEmpty::from_vec(encoded) else {
            return Err(ValidationError::EmptyBatch.into());
        };
        tracing::debug!(event_count = batch.len(), "appending batch");

        self.store
            .append(aggregate_id, aggregate_type, expected_version, batch, metadata)
            .await
            .map_err(|e| match e {
                AppendError::Invalid(e) => Error::Invalid(e),
                AppendError::Conflict(conflict) => {
                    tracing::debug!(
                        actual_version = conflict.actual_version,
                        "append rejected by version check"
                    );
                    Error::Conflict(conflict)
                }
                AppendError::Store(e) => Error::store(Operation::Append, e),
            })
    }

    /// Every event of an aggregate, ascending by sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] for a nil id or [`Error::Store`] on backend
    /// failure.
    pub async fn read_stream(&self, aggregate_id: Uuid) -> JournalResult<Vec<EventEnvelope<E>>, S> {
        self.read_stream_from(aggregate_id, 0).await
    }

    /// Events of an aggregate with `sequence_number >= from_sequence`.
    ///
    /// An aggregate with no such events yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] for a nil id or negative `from_sequence`, or
    /// [`Error::Store`] on backend failure.
    pub async fn read_stream_from(
        &self,
        aggregate_id: Uuid,
        from_sequence: i64,
    ) -> JournalResult<Vec<EventEnvelope<E>>, S> {
        validate::aggregate_id(aggregate_id)?;
        validate::from_sequence(from_sequence)?;
        let rows = self
            .store
            .read_stream(aggregate_id, from_sequence)
            .await
            .map_err(|e| Error::store(Operation::ReadStream, e))?;
        Ok(self.decode_all(rows))
    }

    /// A page of events of one type across all aggregates, ordered by
    /// `(created_at, event_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] for a blank type or zero `limit`, or
    /// [`Error::Store`] on backend failure.
    pub async fn read_by_event_type(
        &self,
        event_type: &str,
        limit: u32,
        offset: u32,
    ) -> JournalResult<Vec<EventEnvelope<E>>, S> {
        validate::event_type(event_type)?;
        let page = Page::new(limit, offset)?;
        let rows = self
            .store
            .read_by_event_type(event_type, page)
            .await
            .map_err(|e| Error::store(Operation::ReadByEventType, e))?;
        Ok(self.decode_all(rows))
    }

    /// A page of all events, ordered by `(created_at, event_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] for a zero `limit` or [`Error::Store`] on
    /// backend failure.
    pub async fn read_global(
        &self,
        limit: u32,
        offset: u32,
    ) -> JournalResult<Vec<EventEnvelope<E>>, S> {
        let page = Page::new(limit, offset)?;
        let rows = self
            .store
            .read_global(page)
            .await
            .map_err(|e| Error::store(Operation::ReadGlobal, e))?;
        Ok(self.decode_all(rows))
    }

    /// Every event recorded under `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] on backend failure.
    pub async fn read_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> JournalResult<Vec<EventEnvelope<E>>, S> {
        let rows = self
            .store
            .read_by_correlation_id(correlation_id)
            .await
            .map_err(|e| Error::store(Operation::ReadByCorrelationId, e))?;
        Ok(self.decode_all(rows))
    }

    /// The aggregate's version, or `-1` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invalid`] for a nil id or [`Error::Store`] on backend
    /// failure. A missing aggregate is not an error.
    pub async fn current_version(&self, aggregate_id: Uuid) -> JournalResult<i64, S> {
        validate::aggregate_id(aggregate_id)?;
        self.store
            .current_version(aggregate_id)
            .await
            .map_err(|e| Error::store(Operation::CurrentVersion, e))
    }

    fn encode_batch<I, T>(&self, events: I) -> JournalResult<Vec<PersistableEvent>, S>
    where
        I: IntoIterator<Item = T>,
        T: SerializableEvent,
    {
        events
            .into_iter()
            .enumerate()
            .map(|(index, event)| -> JournalResult<PersistableEvent, S> {
                let event_type = event.event_type();
                validate::event_type(event_type)?;
                let payload = event.encode(&self.codec).map_err(|source| Error::Encode {
                    index,
                    event_type: event_type.to_owned(),
                    source: Box::new(source),
                })?;
                Ok(PersistableEvent {
                    event_type: event_type.to_owned(),
                    payload,
                })
            })
            .collect()
    }

    fn decode_all(&self, rows: Vec<StoredEvent>) -> Vec<EventEnvelope<E>> {
        rows.into_iter()
            .map(|row| EventEnvelope::decode(row, &self.codec, &self.registry))
            .collect()
    }
}
