//! Connection settings for the `PostgreSQL` backend.
//!
//! Settings are read from `KEEL__`-prefixed environment variables:
//!
//! | variable                     | default |
//! |------------------------------|---------|
//! | `KEEL__DATABASE_URL`         | required |
//! | `KEEL__MAX_CONNECTIONS`      | 10      |
//! | `KEEL__MIN_CONNECTIONS`      | 0       |
//! | `KEEL__ACQUIRE_TIMEOUT_SECS` | 30      |

use std::time::Duration;

use serde::Deserialize;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::Error;

const ENV_PREFIX: &str = "KEEL";
const ENV_SEPARATOR: &str = "__";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_acquire_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Settings for `database_url` with default pool sizing.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }

    /// Load settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `KEEL__DATABASE_URL` is missing, a
    /// value does not parse, or the pool bounds are inconsistent.
    pub fn from_env() -> Result<Self, Error> {
        Self::load(environment())
    }

    fn load(source: config::Environment) -> Result<Self, Error> {
        let config: Self = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.database_url.trim().is_empty() {
            return Err(
                config::ConfigError::Message("database_url must not be blank".into()).into(),
            );
        }
        if self.max_connections == 0 {
            return Err(config::ConfigError::Message("max_connections must be > 0".into()).into());
        }
        if self.min_connections > self.max_connections {
            return Err(config::ConfigError::Message(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            ))
            .into());
        }
        Ok(())
    }

    /// Pool options derived from these settings.
    #[must_use]
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }

    /// Open a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for inconsistent settings or
    /// [`Error::Database`] if the database cannot be reached.
    #[tracing::instrument(skip(self), fields(max_connections = self.max_connections))]
    pub async fn connect(&self) -> Result<PgPool, Error> {
        self.validate()?;
        let pool = self.pool_options().connect(&self.database_url).await?;
        tracing::debug!("connection pool ready");
        Ok(pool)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
