use std::time::Duration;

use super::error::{PostgresDaoError, PostgresResult};

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration describing how to connect to PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection string.
    pub url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
}

impl PostgresConfig {
    /// Construct a configuration from an explicit connection string.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Build a configuration by reading `DATABASE_URL`.
    pub fn from_env() -> PostgresResult<Self> {
        let url = std::env::var("DATABASE_URL").map_err(|_| PostgresDaoError::MissingEnvVar {
            var: "DATABASE_URL",
        })?;
        Ok(Self::new(url))
    }
}
