//! In-memory event store implementation for testing.
//!
//! This module provides [`Store`], a thread-safe in-memory implementation of
//! [`EventStore`](super::EventStore) with the same contract as the database
//! backends: version sentinel `-1`, gap-free sequence numbers, and
//! `(created_at, event_id)` ordering for cross-aggregate reads.
//!
//! # Example
//!
//! ```
//! use keel_core::store::inmemory;
//!
//! let store = inmemory::Store::new();
//! ```

use std::{
    collections::HashMap,
    convert::Infallible,
    future::Future,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use nonempty::NonEmpty;
use uuid::Uuid;

use crate::{
    concurrency::{ConcurrencyConflict, NO_VERSION},
    metadata::EventMetadata,
    store::{
        AppendOutcome, AppendResult, EventStore, Page, PersistableEvent, ReadResult, StoredEvent,
        validate,
    },
};

/// In-memory event store keeping one append-only log for all aggregates.
///
/// Clones share the same underlying state.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    aggregates: HashMap<Uuid, AggregateRow>,
    /// Every event ever appended, in commit order.
    log: Vec<StoredEvent>,
    /// Indexes into `log` per aggregate, ascending by sequence number.
    streams: HashMap<Uuid, Vec<usize>>,
}

struct AggregateRow {
    aggregate_type: String,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events held, across all aggregates.
    pub fn len(&self) -> usize {
        self.inner.read().expect("in-memory store lock poisoned").log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the aggregate's version last changed.
    pub fn updated_at(&self, aggregate_id: Uuid) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        inner.aggregates.get(&aggregate_id).map(|a| a.updated_at)
    }

    fn select<P>(&self, page: Option<Page>, predicate: P) -> Vec<StoredEvent>
    where
        P: Fn(&StoredEvent) -> bool,
    {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        let mut matching: Vec<&StoredEvent> = inner.log.iter().filter(|&e| predicate(e)).collect();
        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        let (offset, limit) = page.map_or((0, usize::MAX), |p| {
            (p.offset() as usize, p.limit() as usize)
        });
        matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Inner {
    fn version_of(&self, aggregate_id: Uuid) -> i64 {
        self.aggregates
            .get(&aggregate_id)
            .map_or(NO_VERSION, |a| a.version)
    }
}

impl EventStore for Store {
    type Error = Infallible;

    #[tracing::instrument(skip(self))]
    fn current_version(
        &self,
        aggregate_id: Uuid,
    ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_ {
        let version = self
            .inner
            .read()
            .expect("in-memory store lock poisoned")
            .version_of(aggregate_id);
        tracing::trace!(version, "retrieved aggregate version");
        std::future::ready(Ok(version))
    }

    #[tracing::instrument(
        skip(self, events, metadata),
        fields(event_count = events.len())
    )]
    fn append<'a>(
        &'a self,
        aggregate_id: Uuid,
        aggregate_type: &'a str,
        expected_version: i64,
        events: NonEmpty<PersistableEvent>,
        metadata: &'a EventMetadata,
    ) -> impl Future<Output = AppendOutcome<Self::Error>> + Send + 'a {
        let result: AppendOutcome<Self::Error> = (|| {
            validate::append(aggregate_id, aggregate_type, expected_version)?;
            for event in events.iter() {
                validate::event_type(&event.event_type)?;
            }

            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            let current = inner.version_of(aggregate_id);
            if current != expected_version {
                return Err(
                    ConcurrencyConflict::new(aggregate_id, expected_version, current).into(),
                );
            }

            let now = Utc::now();
            let row = inner
                .aggregates
                .entry(aggregate_id)
                .or_insert_with(|| AggregateRow {
                    aggregate_type: aggregate_type.to_owned(),
                    version: 0,
                    updated_at: now,
                });
            if row.aggregate_type != aggregate_type {
                tracing::warn!(
                    stored = %row.aggregate_type,
                    requested = aggregate_type,
                    "append used a different aggregate type; keeping the stored one"
                );
            }
            let stored_type = row.aggregate_type.clone();

            let mut sequence_number = current.max(0);
            let mut event_ids = Vec::with_capacity(events.len());
            for event in events {
                sequence_number += 1;
                let event_id = Uuid::now_v7();
                event_ids.push(event_id);
                let index = inner.log.len();
                inner.log.push(StoredEvent {
                    event_id,
                    aggregate_id,
                    aggregate_type: stored_type.clone(),
                    event_type: event.event_type,
                    sequence_number,
                    payload: event.payload,
                    metadata: metadata.clone(),
                    created_at: now,
                });
                inner.streams.entry(aggregate_id).or_default().push(index);
            }

            if let Some(row) = inner.aggregates.get_mut(&aggregate_id) {
                row.version = sequence_number;
                row.updated_at = now;
            }
            drop(inner);

            tracing::debug!(version = sequence_number, "events appended to stream");
            Ok(AppendResult {
                version: sequence_number,
                event_ids,
            })
        })();

        std::future::ready(result)
    }

    #[tracing::instrument(skip(self))]
    fn read_stream(
        &self,
        aggregate_id: Uuid,
        from_sequence: i64,
    ) -> impl Future<Output = ReadResult<Self::Error>> + Send + '_ {
        let events: Vec<StoredEvent> = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner
                .streams
                .get(&aggregate_id)
                .map(|indexes| {
                    indexes
                        .iter()
                        .map(|&i| &inner.log[i])
                        .filter(|e| e.sequence_number >= from_sequence)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        tracing::trace!(events = events.len(), "read aggregate stream");
        std::future::ready(Ok(events))
    }

    #[tracing::instrument(skip(self))]
    fn read_by_event_type<'a>(
        &'a self,
        event_type: &'a str,
        page: Page,
    ) -> impl Future<Output = ReadResult<Self::Error>> + Send + 'a {
        std::future::ready(Ok(self.select(Some(page), |e| e.event_type == event_type)))
    }

    #[tracing::instrument(skip(self))]
    fn read_global(&self, page: Page) -> impl Future<Output = ReadResult<Self::Error>> + Send + '_ {
        std::future::ready(Ok(self.select(Some(page), |_| true)))
    }

    #[tracing::instrument(skip(self))]
    fn read_by_correlation_id(
        &self,
        correlation_id: Uuid,
    ) -> impl Future<Output = ReadResult<Self::Error>> + Send + '_ {
        std::future::ready(Ok(self.select(None, |e| {
            e.metadata.correlation_id() == Some(correlation_id)
        })))
    }
}

#[cfg(test)]
mod tests {
    use nonempty::nonempty;

    use super::*;
    use crate::store::AppendError;

    fn event(event_type: &str, payload: &str) -> PersistableEvent {
        PersistableEvent {
            event_type: event_type.to_owned(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    async fn append_one(store: &Store, id: Uuid, expected: i64, event_type: &str) -> AppendResult {
        store
            .append(
                id,
                "Ruleset",
                expected,
                NonEmpty::singleton(event(event_type, "{}")),
                &EventMetadata::new(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_aggregate_has_no_version() {
        let store = Store::new();
        let id = Uuid::now_v7();
        assert_eq!(store.current_version(id).await.unwrap(), NO_VERSION);
        assert_eq!(store.current_version(id).await.unwrap(), NO_VERSION);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn batch_gets_consecutive_sequence_numbers() {
        let store = Store::new();
        let id = Uuid::now_v7();
        let result = store
            .append(
                id,
                "Ruleset",
                NO_VERSION,
                nonempty![event("Event1", "1"), event("Event2", "2"), event("Event3", "3")],
                &EventMetadata::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.version, 3);
        assert_eq!(result.event_ids.len(), 3);

        let stream = store.read_stream(id, 0).await.unwrap();
        let sequences: Vec<i64> = stream.iter().map(|e| e.sequence_number).collect();
        let types: Vec<&str> = stream.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(types, vec!["Event1", "Event2", "Event3"]);
        assert_eq!(
            stream.iter().map(|e| e.event_id).collect::<Vec<_>>(),
            result.event_ids
        );
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_conflict_and_writes_nothing() {
        let store = Store::new();
        let id = Uuid::now_v7();
        append_one(&store, id, NO_VERSION, "Event1").await;
        append_one(&store, id, 1, "Event2").await;
        append_one(&store, id, 2, "Event3").await;

        let result = store
            .append(
                id,
                "Ruleset",
                0,
                NonEmpty::singleton(event("Event4", "{}")),
                &EventMetadata::new(),
            )
            .await;

        match result {
            Err(AppendError::Conflict(conflict)) => {
                assert_eq!(conflict, ConcurrencyConflict::new(id, 0, 3));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.read_stream(id, 0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn creating_an_existing_aggregate_conflicts() {
        let store = Store::new();
        let id = Uuid::now_v7();
        append_one(&store, id, NO_VERSION, "Event1").await;

        let result = store
            .append(
                id,
                "Ruleset",
                NO_VERSION,
                NonEmpty::singleton(event("Event1", "{}")),
                &EventMetadata::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(AppendError::Conflict(ConcurrencyConflict {
                expected_version: -1,
                actual_version: 1,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_writing() {
        let store = Store::new();
        let result = store
            .append(
                Uuid::now_v7(),
                "",
                NO_VERSION,
                NonEmpty::singleton(event("Event1", "{}")),
                &EventMetadata::new(),
            )
            .await;
        assert!(matches!(result, Err(AppendError::Invalid(_))));

        let result = store
            .append(
                Uuid::now_v7(),
                "Ruleset",
                NO_VERSION,
                NonEmpty::singleton(event(" ", "{}")),
                &EventMetadata::new(),
            )
            .await;
        assert!(matches!(result, Err(AppendError::Invalid(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn read_stream_honours_from_sequence() {
        let store = Store::new();
        let id = Uuid::now_v7();
        append_one(&store, id, NO_VERSION, "Tick").await;
        for expected in 1..5 {
            append_one(&store, id, expected, "Tick").await;
        }

        let tail = store.read_stream(id, 3).await.unwrap();
        assert_eq!(
            tail.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
        assert!(store.read_stream(id, 6).await.unwrap().is_empty());
        assert!(store.read_stream(Uuid::now_v7(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_bumps_updated_at() {
        let store = Store::new();
        let id = Uuid::now_v7();
        assert_eq!(store.updated_at(id), None);

        append_one(&store, id, NO_VERSION, "Created").await;
        let first = store.updated_at(id).unwrap();
        append_one(&store, id, 1, "Renamed").await;
        assert!(store.updated_at(id).unwrap() >= first);
    }

    #[tokio::test]
    async fn pages_of_one_event_type_are_disjoint_and_ordered() {
        let store = Store::new();
        for _ in 0..5 {
            let id = Uuid::now_v7();
            append_one(&store, id, NO_VERSION, "X").await;
            append_one(&store, id, 1, "Y").await;
        }

        let first = store
            .read_by_event_type("X", Page::new(2, 0).unwrap())
            .await
            .unwrap();
        let second = store
            .read_by_event_type("X", Page::new(2, 2).unwrap())
            .await
            .unwrap();
        let both = store
            .read_by_event_type("X", Page::new(4, 0).unwrap())
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        let joined: Vec<Uuid> = first.iter().chain(&second).map(|e| e.event_id).collect();
        assert_eq!(joined, both.iter().map(|e| e.event_id).collect::<Vec<_>>());
        assert!(both.iter().all(|e| e.event_type == "X"));
    }

    #[tokio::test]
    async fn global_read_spans_aggregates() {
        let store = Store::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        append_one(&store, a, NO_VERSION, "A1").await;
        append_one(&store, b, NO_VERSION, "B1").await;
        append_one(&store, a, 1, "A2").await;

        let all = store.read_global(Page::new(10, 0).unwrap()).await.unwrap();
        let types: Vec<&str> = all.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["A1", "B1", "A2"]);

        let tail = store.read_global(Page::new(10, 2).unwrap()).await.unwrap();
        assert_eq!(tail.len(), 1);
    }

    #[tokio::test]
    async fn correlation_lookup_matches_dedicated_id() {
        let store = Store::new();
        let correlation = Uuid::now_v7();
        let metadata = EventMetadata::new().with_correlation_id(correlation);
        store
            .append(
                Uuid::now_v7(),
                "OperatorToken",
                NO_VERSION,
                NonEmpty::singleton(event("TokenIssued", "{}")),
                &metadata,
            )
            .await
            .unwrap();
        append_one(&store, Uuid::now_v7(), NO_VERSION, "Unrelated").await;

        let correlated = store.read_by_correlation_id(correlation).await.unwrap();
        assert_eq!(correlated.len(), 1);
        assert_eq!(correlated[0].event_type, "TokenIssued");
        assert_eq!(correlated[0].aggregate_type, "OperatorToken");
    }

    #[tokio::test]
    async fn concurrent_writers_on_same_version_yield_one_winner() {
        let store = Store::new();
        let id = Uuid::now_v7();
        append_one(&store, id, NO_VERSION, "Created").await;
        let metadata = EventMetadata::new();

        let (left, right) = tokio::join!(
            store.append(
                id,
                "Ruleset",
                1,
                NonEmpty::singleton(event("Left", "{}")),
                &metadata,
            ),
            store.append(
                id,
                "Ruleset",
                1,
                NonEmpty::singleton(event("Right", "{}")),
                &metadata,
            ),
        );

        let outcomes = [left, right];
        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let conflict = outcomes
            .iter()
            .find_map(|r| match r {
                Err(AppendError::Conflict(c)) => Some(*c),
                _ => None,
            })
            .expect("loser reports a conflict");
        assert_eq!(conflict.actual_version, 2);
        assert_eq!(store.current_version(id).await.unwrap(), 2);
    }
}
