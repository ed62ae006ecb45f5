mod schema;

use std::collections::BTreeMap;

use keel_core::{
    concurrency::{ConcurrencyConflict, NO_VERSION},
    metadata::EventMetadata,
    store::{
        AppendError, AppendOutcome, AppendResult, EventStore, NonEmpty, Page, PersistableEvent,
        ReadResult, StoredEvent, validate,
    },
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::Error;

const UNIQUE_APPEND_CONSTRAINTS: [&str; 2] = ["pk_aggregates", "uq_event_store_aggregate_sequence"];

const SELECT_EVENTS: &str = r"
    SELECT e.id, e.aggregate_id, a.aggregate_type, e.event_type, e.sequence_number,
           e.payload, e.metadata, e.correlation_id, e.causation_id, e.created_at
    FROM event_store e
    JOIN aggregates a ON a.id = e.aggregate_id
";

/// A PostgreSQL-backed [`EventStore`].
///
/// - Aggregate versions live in `aggregates`; each append locks the row with
///   `SELECT ... FOR UPDATE` before checking the expected version.
/// - Payloads are stored as `bytea` exactly as the codec produced them.
/// - The metadata bag is stored as `jsonb`; correlation and causation ids
///   get their own indexed columns.
/// - `event_store` rejects `UPDATE`, `DELETE` and `TRUNCATE` with SQLSTATE
///   [`EV001`](crate::APPEND_ONLY_SQLSTATE).
#[derive(Clone, Debug)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema (idempotent).
    ///
    /// Tables and indexes use `IF NOT EXISTS`, functions and triggers are
    /// replaced, so this can run on every startup. Concurrent callers are
    /// serialized with an advisory lock.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if any of the schema statements fail.
    #[tracing::instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(schema::MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        for statement in schema::STATEMENTS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::debug!(statements = schema::STATEMENTS.len(), "schema applied");
        Ok(())
    }

    async fn append_in_tx(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        expected_version: i64,
        events: NonEmpty<PersistableEvent>,
        metadata: &EventMetadata,
    ) -> AppendOutcome<Error> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let current: Option<(i64, String)> = sqlx::query_as(
            r"
                SELECT version, aggregate_type
                FROM aggregates
                WHERE id = $1
                FOR UPDATE
                ",
        )
        .bind(aggregate_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;

        let current_version = current.as_ref().map_or(NO_VERSION, |(version, _)| *version);
        if current_version != expected_version {
            return Err(
                ConcurrencyConflict::new(aggregate_id, expected_version, current_version).into(),
            );
        }

        match &current {
            None => {
                sqlx::query(
                    "INSERT INTO aggregates (id, aggregate_type, version) VALUES ($1, $2, 0)",
                )
                .bind(aggregate_id)
                .bind(aggregate_type)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
            }
            Some((_, stored)) if stored != aggregate_type => {
                tracing::warn!(
                    stored = %stored,
                    requested = aggregate_type,
                    "append used a different aggregate type; keeping the stored one"
                );
            }
            Some(_) => {}
        }

        let mut version = current_version.max(0);
        let rows: Vec<(Uuid, i64, PersistableEvent)> = events
            .into_iter()
            .map(|event| {
                version += 1;
                (Uuid::now_v7(), version, event)
            })
            .collect();
        let event_ids = rows.iter().map(|(id, ..)| *id).collect();

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO event_store (id, aggregate_id, event_type, sequence_number, payload, \
             metadata, correlation_id, causation_id) ",
        );
        qb.push_values(rows, |mut b, (event_id, sequence_number, event)| {
            b.push_bind(event_id);
            b.push_bind(aggregate_id);
            b.push_bind(event.event_type);
            b.push_bind(sequence_number);
            b.push_bind(event.payload);
            b.push_bind(Json(metadata.data()));
            b.push_bind(metadata.correlation_id());
            b.push_bind(metadata.causation_id());
        });
        qb.build().execute(&mut *tx).await.map_err(db)?;

        sqlx::query("UPDATE aggregates SET version = $1, updated_at = now() WHERE id = $2")
            .bind(version)
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;

        tracing::debug!(version, "events appended to stream");
        Ok(AppendResult { version, event_ids })
    }

    async fn fetch(&self, mut qb: QueryBuilder<'_, Postgres>) -> ReadResult<Error> {
        let rows = qb.build().fetch_all(&self.pool).await?;
        let events = rows.iter().map(stored_event).collect::<Result<Vec<_>, _>>()?;
        tracing::trace!(events = events.len(), "loaded events");
        Ok(events)
    }
}

fn db(err: sqlx::Error) -> AppendError<Error> {
    AppendError::store(Error::from(err))
}

/// Whether `err` means a concurrent writer claimed the aggregate row or the
/// sequence number first.
fn is_lost_race(err: &Error) -> bool {
    let Error::Database(err) = err else {
        return false;
    };
    err.as_database_error().is_some_and(|db| {
        db.is_unique_violation()
            && db
                .constraint()
                .is_some_and(|name| UNIQUE_APPEND_CONSTRAINTS.contains(&name))
    })
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: Page) {
    qb.push(" ORDER BY e.created_at, e.id LIMIT ")
        .push_bind(i64::from(page.limit()))
        .push(" OFFSET ")
        .push_bind(i64::from(page.offset()));
}

fn stored_event(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    let data: Json<BTreeMap<String, serde_json::Value>> = row.try_get("metadata")?;
    Ok(StoredEvent {
        event_id: row.try_get("id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        aggregate_type: row.try_get("aggregate_type")?,
        event_type: row.try_get("event_type")?,
        sequence_number: row.try_get("sequence_number")?,
        payload: row.try_get("payload")?,
        metadata: EventMetadata::from_parts(
            row.try_get("correlation_id")?,
            row.try_get("causation_id")?,
            data.0,
        ),
        created_at: row.try_get("created_at")?,
    })
}

impl EventStore for Store {
    type Error = Error;

    #[tracing::instrument(skip(self), fields(aggregate_id = %aggregate_id))]
    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, Self::Error> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM aggregates WHERE id = $1")
                .bind(aggregate_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.unwrap_or(NO_VERSION))
    }

    #[tracing::instrument(
        skip(self, events, metadata),
        fields(
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            expected_version = expected_version,
            events_len = events.len()
        )
    )]
    async fn append<'a>(
        &'a self,
        aggregate_id: Uuid,
        aggregate_type: &'a str,
        expected_version: i64,
        events: NonEmpty<PersistableEvent>,
        metadata: &'a EventMetadata,
    ) -> AppendOutcome<Self::Error> {
        validate::append(aggregate_id, aggregate_type, expected_version)?;
        for event in events.iter() {
            validate::event_type(&event.event_type)?;
        }

        match self
            .append_in_tx(aggregate_id, aggregate_type, expected_version, events, metadata)
            .await
        {
            Err(AppendError::Store(err)) if is_lost_race(&err) => {
                let actual_version = self
                    .current_version(aggregate_id)
                    .await
                    .map_err(AppendError::store)?;
                tracing::debug!(actual_version, "lost insert race to a concurrent writer");
                Err(ConcurrencyConflict::new(aggregate_id, expected_version, actual_version).into())
            }
            other => other,
        }
    }

    #[tracing::instrument(skip(self), fields(aggregate_id = %aggregate_id))]
    async fn read_stream(&self, aggregate_id: Uuid, from_sequence: i64) -> ReadResult<Self::Error> {
        validate::aggregate_id(aggregate_id)?;
        validate::from_sequence(from_sequence)?;

        let mut qb = QueryBuilder::new(SELECT_EVENTS);
        qb.push(" WHERE e.aggregate_id = ")
            .push_bind(aggregate_id)
            .push(" AND e.sequence_number >= ")
            .push_bind(from_sequence)
            .push(" ORDER BY e.sequence_number");
        self.fetch(qb).await
    }

    #[tracing::instrument(skip(self))]
    async fn read_by_event_type<'a>(
        &'a self,
        event_type: &'a str,
        page: Page,
    ) -> ReadResult<Self::Error> {
        validate::event_type(event_type)?;

        let mut qb = QueryBuilder::new(SELECT_EVENTS);
        qb.push(" WHERE e.event_type = ").push_bind(event_type);
        push_page(&mut qb, page);
        self.fetch(qb).await
    }

    #[tracing::instrument(skip(self))]
    async fn read_global(&self, page: Page) -> ReadResult<Self::Error> {
        let mut qb = QueryBuilder::new(SELECT_EVENTS);
        push_page(&mut qb, page);
        self.fetch(qb).await
    }

    #[tracing::instrument(skip(self), fields(correlation_id = %correlation_id))]
    async fn read_by_correlation_id(&self, correlation_id: Uuid) -> ReadResult<Self::Error> {
        let mut qb = QueryBuilder::new(SELECT_EVENTS);
        qb.push(" WHERE e.correlation_id = ")
            .push_bind(correlation_id)
            .push(" ORDER BY e.created_at, e.id");
        self.fetch(qb).await
    }
}
