//! DDL applied by [`Store::migrate`](super::Store::migrate).

/// Serializes concurrent migrations against one database.
pub(super) const MIGRATION_LOCK_KEY: i64 = 0x6b65_656c_5f6d_6967;

pub(super) const STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS aggregates (
        id             UUID        NOT NULL,
        aggregate_type TEXT        NOT NULL,
        version        BIGINT      NOT NULL DEFAULT 0,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT pk_aggregates PRIMARY KEY (id),
        CONSTRAINT ck_aggregates_version CHECK (version >= 0)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS event_store (
        id              UUID        NOT NULL,
        aggregate_id    UUID        NOT NULL,
        event_type      TEXT        NOT NULL,
        sequence_number BIGINT      NOT NULL,
        payload         BYTEA       NOT NULL,
        metadata        JSONB       NOT NULL DEFAULT '{}'::jsonb,
        correlation_id  UUID        NULL,
        causation_id    UUID        NULL,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT pk_event_store PRIMARY KEY (id),
        CONSTRAINT fk_event_store_aggregate
            FOREIGN KEY (aggregate_id) REFERENCES aggregates (id),
        CONSTRAINT uq_event_store_aggregate_sequence UNIQUE (aggregate_id, sequence_number),
        CONSTRAINT ck_event_store_sequence CHECK (sequence_number >= 1)
    )
    ",
    r"CREATE INDEX IF NOT EXISTS idx_event_store_aggregate ON event_store (aggregate_id)",
    r"CREATE INDEX IF NOT EXISTS idx_event_store_type ON event_store (event_type, created_at, id)",
    r"CREATE INDEX IF NOT EXISTS idx_event_store_created ON event_store (created_at, id)",
    r"
    CREATE INDEX IF NOT EXISTS idx_event_store_correlation
        ON event_store (correlation_id) WHERE correlation_id IS NOT NULL
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_event_store_aggregate_sequence
        ON event_store (aggregate_id, sequence_number)
    ",
    r"
    CREATE OR REPLACE FUNCTION event_store_prevent_update() RETURNS trigger
    LANGUAGE plpgsql AS $$
    BEGIN
        RAISE EXCEPTION 'event_store is append-only: updates are not allowed'
            USING ERRCODE = 'EV001';
    END;
    $$
    ",
    r"
    CREATE OR REPLACE FUNCTION event_store_prevent_delete() RETURNS trigger
    LANGUAGE plpgsql AS $$
    BEGIN
        RAISE EXCEPTION 'event_store is immutable: deletes are not allowed'
            USING ERRCODE = 'EV001';
    END;
    $$
    ",
    r"
    CREATE OR REPLACE FUNCTION event_store_prevent_truncate() RETURNS trigger
    LANGUAGE plpgsql AS $$
    BEGIN
        RAISE EXCEPTION 'event_store is immutable: truncation is not allowed'
            USING ERRCODE = 'EV001';
    END;
    $$
    ",
    r"
    CREATE OR REPLACE FUNCTION aggregates_touch_updated_at() RETURNS trigger
    LANGUAGE plpgsql AS $$
    BEGIN
        NEW.updated_at = now();
        RETURN NEW;
    END;
    $$
    ",
    // Postgres 11 has no CREATE OR REPLACE TRIGGER.
    r"DROP TRIGGER IF EXISTS trg_event_store_prevent_update ON event_store",
    r"
    CREATE TRIGGER trg_event_store_prevent_update
        BEFORE UPDATE ON event_store
        FOR EACH ROW EXECUTE FUNCTION event_store_prevent_update()
    ",
    r"DROP TRIGGER IF EXISTS trg_event_store_prevent_delete ON event_store",
    r"
    CREATE TRIGGER trg_event_store_prevent_delete
        BEFORE DELETE ON event_store
        FOR EACH ROW EXECUTE FUNCTION event_store_prevent_delete()
    ",
    r"DROP TRIGGER IF EXISTS trg_event_store_prevent_truncate ON event_store",
    r"
    CREATE TRIGGER trg_event_store_prevent_truncate
        BEFORE TRUNCATE ON event_store
        FOR EACH STATEMENT EXECUTE FUNCTION event_store_prevent_truncate()
    ",
    r"DROP TRIGGER IF EXISTS trg_aggregates_updated_at ON aggregates",
    r"
    CREATE TRIGGER trg_aggregates_updated_at
        BEFORE UPDATE ON aggregates
        FOR EACH ROW EXECUTE FUNCTION aggregates_touch_updated_at()
    ",
];
