use keel_core::error::ValidationError;

/// SQLSTATE raised by the `event_store` triggers on `UPDATE`, `DELETE` or
/// `TRUNCATE`.
pub const APPEND_ONLY_SQLSTATE: &str = "EV001";

/// Error type for `PostgreSQL` event store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Query execution or transaction failure.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    /// Malformed input rejected before the query ran.
    #[error("invalid argument: {0}")]
    Invalid(#[from] ValidationError),
    /// A statement tried to modify or remove stored events.
    #[error("append-only violation: {0}")]
    AppendOnlyViolation(String),
    /// Connection settings could not be loaded or are inconsistent.
    #[error("configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if is_append_only_violation(&err)
            && let Some(db) = err.as_database_error()
        {
            return Self::AppendOnlyViolation(db.message().to_owned());
        }
        Self::Database(err)
    }
}

/// Whether `err` was raised by the append-only guard on `event_store`.
#[must_use]
pub fn is_append_only_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == APPEND_ONLY_SQLSTATE)
}
