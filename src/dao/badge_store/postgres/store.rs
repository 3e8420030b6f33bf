use futures::future::BoxFuture;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    badge_store::BadgeStore,
    models::{EventEntity, JoiningEntity, PresentationMode, UserEntity},
    storage::StorageResult,
};

use super::{
    config::PostgresConfig,
    error::{PostgresDaoError, PostgresResult},
    queries,
};

/// Rows per multi-row event upsert; keeps each statement well below the bind limit.
const EVENT_UPSERT_CHUNK: usize = 1_000;

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: Option<String>,
    presentation_mode: Option<i32>,
    fit: Option<i32>,
}

impl TryFrom<UserRow> for UserEntity {
    type Error = PostgresDaoError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let raw_mode = row.presentation_mode.unwrap_or(0);
        let presentation_mode = PresentationMode::try_from(raw_mode).map_err(|value| {
            PostgresDaoError::InvalidPresentationMode {
                user_id: row.id,
                value,
            }
        })?;
        Ok(Self {
            id: row.id,
            name: row.name.unwrap_or_default(),
            presentation_mode,
            fit_offset: row.fit.unwrap_or(0),
        })
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: String,
    name: Option<String>,
    timestamp: Option<OffsetDateTime>,
    badge_url: Option<String>,
}

impl From<EventRow> for EventEntity {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            name: row.name.unwrap_or_default(),
            timestamp: row.timestamp.unwrap_or(OffsetDateTime::UNIX_EPOCH),
            badge_url: row.badge_url.unwrap_or_default(),
        }
    }
}

#[derive(Debug, FromRow)]
struct JoiningRow {
    user_id: Uuid,
    event_id: String,
    timestamp: Option<OffsetDateTime>,
}

impl From<JoiningRow> for JoiningEntity {
    fn from(row: JoiningRow) -> Self {
        Self {
            user_id: row.user_id,
            event_id: row.event_id,
            timestamp: row.timestamp.unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

/// [`BadgeStore`] over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresBadgeStore {
    pool: PgPool,
}

impl PostgresBadgeStore {
    /// Open the connection pool. Tables are created lazily by [`BadgeStore::ensure_schema`].
    pub async fn connect(config: PostgresConfig) -> PostgresResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|source| PostgresDaoError::Connect { source })?;

        Ok(Self { pool })
    }

    async fn create_tables(&self) -> PostgresResult<()> {
        for (table, statement) in [
            ("Events", queries::CREATE_EVENTS_TABLE),
            ("Events", queries::CREATE_EVENTS_TIMESTAMP_INDEX),
            ("Users", queries::CREATE_USERS_TABLE),
            ("Joinings", queries::CREATE_JOININGS_TABLE),
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|source| PostgresDaoError::CreateTable { table, source })?;
        }
        Ok(())
    }

    async fn upsert_event_chunks(&self, events: Vec<EventEntity>) -> PostgresResult<u64> {
        let mut affected = 0;
        for chunk in events.chunks(EVENT_UPSERT_CHUNK) {
            let mut builder = QueryBuilder::<Postgres>::new(queries::UPSERT_EVENTS_PREFIX);
            builder.push_values(chunk.iter(), |mut row, event| {
                row.push_bind(event.id.clone())
                    .push_bind(event.name.clone())
                    .push_bind(event.timestamp)
                    .push_bind(event.badge_url.clone());
            });
            builder.push(queries::UPSERT_EVENTS_CONFLICT);

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(PostgresDaoError::query("upsert", "Events"))?;
            affected += result.rows_affected();
        }
        debug!(affected, "upserted events");
        Ok(affected)
    }
}

impl BadgeStore for PostgresBadgeStore {
    fn ensure_schema(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_tables().await.map_err(Into::into) })
    }

    fn has_events(&self) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let has_events = sqlx::query_scalar::<_, bool>(queries::HAS_EVENTS)
                .fetch_one(&store.pool)
                .await
                .map_err(PostgresDaoError::query("count", "Events"))?;
            Ok(has_events)
        })
    }

    fn upsert_events(&self, events: Vec<EventEntity>) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            if events.is_empty() {
                return Ok(0);
            }
            store.upsert_event_chunks(events).await.map_err(Into::into)
        })
    }

    fn recent_events(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = sqlx::query_as::<_, EventRow>(queries::GET_RECENT_EVENTS)
                .bind(limit as i64)
                .fetch_all(&store.pool)
                .await
                .map_err(PostgresDaoError::query("select", "Events"))?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(queries::GET_USER)
                .bind(id)
                .fetch_optional(&store.pool)
                .await
                .map_err(PostgresDaoError::query("select", "Users"))?;
            match row {
                Some(row) => Ok(Some(UserEntity::try_from(row)?)),
                None => Ok(None),
            }
        })
    }

    fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let result = sqlx::query(queries::UPSERT_USER)
                .bind(user.id)
                .bind(user.name)
                .bind(user.presentation_mode.as_i32())
                .bind(user.fit_offset)
                .execute(&store.pool)
                .await
                .map_err(PostgresDaoError::query("upsert", "Users"))?;
            Ok(result.rows_affected())
        })
    }

    fn delete_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let result = sqlx::query(queries::DELETE_USER)
                .bind(id)
                .execute(&store.pool)
                .await
                .map_err(PostgresDaoError::query("delete", "Users"))?;
            Ok(result.rows_affected())
        })
    }

    fn insert_joining(
        &self,
        user_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let result = sqlx::query(queries::ADD_JOINING)
                .bind(user_id)
                .bind(event_id)
                .execute(&store.pool)
                .await
                .map_err(PostgresDaoError::query("insert", "Joinings"))?;
            Ok(result.rows_affected())
        })
    }

    fn recent_joinings(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<JoiningEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = sqlx::query_as::<_, JoiningRow>(queries::GET_RECENT_JOININGS)
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(&store.pool)
                .await
                .map_err(PostgresDaoError::query("select", "Joinings"))?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&store.pool)
                .await
                .map_err(PostgresDaoError::query("ping", "database"))?;
            Ok(())
        })
    }
}
