//! PostgreSQL backend built on an `sqlx` connection pool.

mod config;
mod error;
mod queries;
mod store;

pub use config::PostgresConfig;
pub use error::PostgresDaoError;
pub use store::PostgresBadgeStore;

use crate::dao::storage::StorageError;

impl From<PostgresDaoError> for StorageError {
    fn from(err: PostgresDaoError) -> Self {
        match err {
            PostgresDaoError::InvalidPresentationMode { user_id, value } => StorageError::Decode {
                entity: "user",
                message: format!("user `{user_id}` has unknown presentation mode {value}"),
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
