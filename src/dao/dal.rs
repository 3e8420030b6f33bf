//! Data access layer: the only component allowed to read or write the badge
//! store, memoizing reads per key in front of it.

use std::{future::Future, sync::Arc, time::Duration};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dao::{
    badge_store::BadgeStore,
    cache::SingleFlightCache,
    event_feed::{EventFeed, FeedError},
    models::{EventCatalog, EventEntity, JoiningEntity, UserEntity},
    storage::StorageError,
};

/// Number of most recent events kept in the event catalog.
pub const EVENTS_CAP: usize = 100;
/// Number of most recent joinings loaded per user.
pub const JOININGS_CAP: usize = 100;

/// Errors surfaced by the data access layer. Cloneable so memoized reads can
/// hand the same failure to every waiting caller.
#[derive(Debug, Clone, Error)]
pub enum DalError {
    /// The store answered with an error.
    #[error("store operation failed: {0}")]
    Storage(#[source] Arc<StorageError>),
    /// Pulling events from the feed failed during initialization.
    #[error("event feed failed: {0}")]
    Feed(#[source] Arc<FeedError>),
    /// The store did not answer within the operation timeout. The operation
    /// may still have been applied.
    #[error("store operation `{operation}` timed out")]
    Timeout {
        /// Name of the bounded operation.
        operation: &'static str,
    },
    /// The one-time initialization was rejected; nothing will work until restart.
    #[error("data layer failed to initialize: {0}")]
    Uninitialized(#[source] Arc<DalError>),
}

impl From<StorageError> for DalError {
    fn from(err: StorageError) -> Self {
        DalError::Storage(Arc::new(err))
    }
}

impl From<FeedError> for DalError {
    fn from(err: FeedError) -> Self {
        DalError::Feed(Arc::new(err))
    }
}

type ReadyGate = Shared<BoxFuture<'static, Result<(), DalError>>>;

/// Tunables of the data access layer.
#[derive(Debug, Clone, Copy)]
pub struct DalOptions {
    /// Upper bound for any single store round-trip.
    pub operation_timeout: Duration,
}

impl Default for DalOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Gateway to the badge store, memoizing reads per key.
pub struct Dal {
    store: Arc<dyn BadgeStore>,
    ready: ReadyGate,
    operation_timeout: Duration,
    users: SingleFlightCache<Uuid, Option<UserEntity>, DalError>,
    joinings: SingleFlightCache<Uuid, Arc<Vec<JoiningEntity>>, DalError>,
    events: SingleFlightCache<(), Arc<EventCatalog>, DalError>,
}

impl Dal {
    /// Build the layer. Initialization is lazy: it starts with the first
    /// operation (or [`Dal::initialize`]) and runs exactly once.
    pub fn new(
        store: Arc<dyn BadgeStore>,
        feed: Arc<dyn EventFeed>,
        options: DalOptions,
    ) -> Self {
        let ready = initialize_store(store.clone(), feed, options.operation_timeout)
            .boxed()
            .shared();
        Self {
            store,
            ready,
            operation_timeout: options.operation_timeout,
            users: SingleFlightCache::new(),
            joinings: SingleFlightCache::new(),
            events: SingleFlightCache::new(),
        }
    }

    /// Await the initialization gate, starting it if nobody has yet.
    pub async fn initialize(&self) -> Result<(), DalError> {
        await_ready(self.ready.clone()).await
    }

    /// Whether initialization has finished and was rejected.
    pub fn initialization_failed(&self) -> bool {
        matches!(self.ready.peek(), Some(Err(_)))
    }

    /// Fetch a user record; `None` means the user has not opted in.
    pub async fn get_user(&self, id: Uuid) -> Result<Option<UserEntity>, DalError> {
        let store = self.store.clone();
        let ready = self.ready.clone();
        let limit = self.operation_timeout;
        self.users
            .get_or_fetch(id, move || async move {
                await_ready(ready).await?;
                bounded("find user", limit, store.find_user(id)).await
            })
            .await
    }

    /// Insert or replace a user. Returns `false` when the store reported no affected row.
    ///
    /// A failed or timed-out write may still have landed, so the user's memos
    /// are dropped and the next read goes back to the store.
    pub async fn update_user(&self, user: UserEntity) -> Result<bool, DalError> {
        self.initialize().await?;
        let affected = self
            .bounded("upsert user", self.store.upsert_user(user.clone()))
            .await
            .inspect_err(|_| self.forget_user(user.id))?;
        if affected == 0 {
            warn!(user_id = %user.id, "user upsert affected no rows");
            return Ok(false);
        }
        self.users.put(user.id, Some(user));
        Ok(true)
    }

    /// Delete a user and, through the store's cascade, all of their joinings.
    pub async fn delete_user(&self, id: Uuid) -> Result<bool, DalError> {
        self.initialize().await?;
        let affected = self
            .bounded("delete user", self.store.delete_user(id))
            .await
            .inspect_err(|_| self.forget_user(id))?;
        if affected == 0 {
            warn!(user_id = %id, "user delete affected no rows");
            return Ok(false);
        }
        self.forget_user(id);
        Ok(true)
    }

    /// The most recent events, fetched once per process.
    pub async fn get_events(&self) -> Result<Arc<EventCatalog>, DalError> {
        let store = self.store.clone();
        let ready = self.ready.clone();
        let limit = self.operation_timeout;
        self.events
            .get_or_fetch((), move || async move {
                await_ready(ready).await?;
                let events = bounded("load events", limit, store.recent_events(EVENTS_CAP)).await?;
                Ok(Arc::new(events.into_iter().collect::<EventCatalog>()))
            })
            .await
    }

    /// Bulk upsert; succeeds only when every input row was affected.
    pub async fn update_events(&self, events: Vec<EventEntity>) -> Result<bool, DalError> {
        self.initialize().await?;
        let expected = events.len() as u64;
        let affected = self
            .bounded("upsert events", self.store.upsert_events(events))
            .await?;
        if affected != expected {
            warn!(expected, affected, "event upsert affected an unexpected number of rows");
            return Ok(false);
        }
        Ok(true)
    }

    /// Record an attendance. Returns whether a new row was inserted.
    pub async fn add_joining(&self, user_id: Uuid, event_id: &str) -> Result<bool, DalError> {
        self.initialize().await?;
        let affected = self
            .bounded(
                "insert joining",
                self.store.insert_joining(user_id, event_id.to_string()),
            )
            .await
            .inspect_err(|_| self.joinings.evict(&user_id))?;
        if affected == 0 {
            return Ok(false);
        }
        self.joinings.evict(&user_id);
        Ok(true)
    }

    /// A user's most recent joinings, newest first.
    pub async fn get_joinings(&self, user_id: Uuid) -> Result<Arc<Vec<JoiningEntity>>, DalError> {
        let store = self.store.clone();
        let ready = self.ready.clone();
        let limit = self.operation_timeout;
        self.joinings
            .get_or_fetch(user_id, move || async move {
                await_ready(ready).await?;
                let joinings = bounded(
                    "load joinings",
                    limit,
                    store.recent_joinings(user_id, JOININGS_CAP),
                )
                .await?;
                Ok(Arc::new(joinings))
            })
            .await
    }

    /// Ping the store without triggering initialization.
    pub async fn health_check(&self) -> Result<(), DalError> {
        if let Some(Err(err)) = self.ready.peek() {
            return Err(DalError::Uninitialized(Arc::new(err.clone())));
        }
        self.bounded("health check", self.store.health_check()).await
    }

    fn forget_user(&self, id: Uuid) {
        self.users.evict(&id);
        self.joinings.evict(&id);
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, DalError> {
        bounded(operation, self.operation_timeout, work).await
    }
}

async fn await_ready(ready: ReadyGate) -> Result<(), DalError> {
    ready
        .await
        .map_err(|err| DalError::Uninitialized(Arc::new(err)))
}

async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    work: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, DalError> {
    match timeout(limit, work).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(DalError::Timeout { operation }),
    }
}

/// Create the tables, backfill history into an empty Events table, then apply
/// the current listing. Logs its own outcome; callers only see the result.
async fn initialize_store(
    store: Arc<dyn BadgeStore>,
    feed: Arc<dyn EventFeed>,
    limit: Duration,
) -> Result<(), DalError> {
    let outcome = async {
        bounded("create schema", limit, store.ensure_schema()).await?;

        if !bounded("check events", limit, store.has_events()).await? {
            let past = feed.past_events().await?;
            let expected = past.len();
            let affected = bounded("backfill events", limit, store.upsert_events(past)).await?;
            info!(expected, affected, "backfilled historical events");
        }

        let upcoming = feed.upcoming_events().await?;
        let expected = upcoming.len();
        let affected = bounded("apply upcoming events", limit, store.upsert_events(upcoming)).await?;
        info!(expected, affected, "applied upcoming events");
        Ok::<(), DalError>(())
    }
    .await;

    match &outcome {
        Ok(()) => info!("badge store updated and ready"),
        Err(err) => error!(error = %err, "badge store initialization failed"),
    }
    outcome
}
