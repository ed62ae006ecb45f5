//! Postgres-backed event store.
//!
//! This crate provides the `PostgreSQL` implementation of
//! [`keel_core::store::EventStore`]:
//!
//! - [`Store`] - append/read over the `aggregates` and `event_store` tables,
//!   plus [`Store::migrate`] to apply the schema and its append-only triggers
//! - [`Config`] - pool settings loaded from `KEEL__*` environment variables
//!
//! ```ignore
//! let pool = keel_postgres::Config::from_env()?.connect().await?;
//! let store = keel_postgres::Store::new(pool);
//! store.migrate().await?;
//! ```

pub mod config;
mod error;
mod store;

pub use self::config::Config;
pub use error::{APPEND_ONLY_SQLSTATE, Error, is_append_only_violation};
pub use store::Store;
