//! Error types shared by the PostgreSQL storage implementation.

use thiserror::Error;
use uuid::Uuid;

/// Convenient result alias returning [`PostgresDaoError`] failures.
pub type PostgresResult<T> = Result<T, PostgresDaoError>;

/// Failures that can occur while interacting with PostgreSQL.
#[derive(Debug, Error)]
pub enum PostgresDaoError {
    /// Required environment variable is missing.
    #[error("missing PostgreSQL environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The connection pool could not be established.
    #[error("failed to connect to PostgreSQL")]
    Connect {
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },
    /// Creating one of the tables failed.
    #[error("failed to create table `{table}`")]
    CreateTable {
        /// Table being created.
        table: &'static str,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },
    /// A statement against `table` failed.
    #[error("failed to {operation} on `{table}`")]
    Query {
        /// Statement kind, e.g. `upsert`.
        operation: &'static str,
        /// Table the statement targeted.
        table: &'static str,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },
    /// A stored user carries a presentation mode this build does not know.
    #[error("user `{user_id}` has unknown presentation mode {value}")]
    InvalidPresentationMode {
        /// Owner of the record.
        user_id: Uuid,
        /// Stored integer value.
        value: i32,
    },
}

impl PostgresDaoError {
    pub(super) fn query(
        operation: &'static str,
        table: &'static str,
    ) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query {
            operation,
            table,
            source,
        }
    }
}
