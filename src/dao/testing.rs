//! Store and feed doubles shared by the unit tests.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use futures::future::BoxFuture;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::dao::{
    badge_store::{BadgeStore, memory::MemoryBadgeStore},
    event_feed::{EventFeed, FeedError, FeedResult},
    models::{EventEntity, JoiningEntity, UserEntity},
    storage::{StorageError, StorageResult},
};

/// Build an event whose timestamp is `days_ago` days in the past.
pub fn event(id: &str, name: &str, days_ago: i64) -> EventEntity {
    EventEntity {
        id: id.into(),
        name: name.into(),
        timestamp: OffsetDateTime::now_utc() - Duration::days(days_ago),
        badge_url: format!("https://example.org/badges/{id}.png"),
    }
}

/// In-memory store that counts reads and can be told to fail or under-report writes.
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: MemoryBadgeStore,
    /// `find_user` calls.
    pub find_user_calls: Arc<AtomicUsize>,
    /// `recent_joinings` calls.
    pub joinings_calls: Arc<AtomicUsize>,
    /// `recent_events` calls.
    pub events_calls: Arc<AtomicUsize>,
    /// `ensure_schema` calls.
    pub schema_calls: Arc<AtomicUsize>,
    /// Report one row less than written on event upserts.
    pub short_event_writes: Arc<AtomicBool>,
    /// Fail every user upsert and delete.
    pub reject_user_writes: Arc<AtomicBool>,
    user_ack_delay_ms: Arc<AtomicU64>,
}

impl CountingStore {
    /// Empty store with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a counter.
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Commit user writes immediately but hold the acknowledgement back for `delay`.
    pub fn delay_user_acks(&self, delay: std::time::Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.user_ack_delay_ms.store(millis, Ordering::SeqCst);
    }

    fn acknowledge(
        &self,
        write: BoxFuture<'static, StorageResult<u64>>,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let delay = self.user_ack_delay_ms.load(Ordering::SeqCst);
        Box::pin(async move {
            let affected = write.await?;
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            Ok(affected)
        })
    }
}

impl BadgeStore for CountingStore {
    fn ensure_schema(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.ensure_schema()
    }

    fn has_events(&self) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.has_events()
    }

    fn upsert_events(&self, events: Vec<EventEntity>) -> BoxFuture<'static, StorageResult<u64>> {
        let short = self.short_event_writes.load(Ordering::SeqCst);
        let upsert = self.inner.upsert_events(events);
        Box::pin(async move {
            let affected = upsert.await?;
            Ok(if short { affected.saturating_sub(1) } else { affected })
        })
    }

    fn recent_events(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        self.events_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.recent_events(limit)
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        self.find_user_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_user(id)
    }

    fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<u64>> {
        if self.reject_user_writes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StorageError::rejected("user writes disabled")) });
        }
        self.acknowledge(self.inner.upsert_user(user))
    }

    fn delete_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        if self.reject_user_writes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StorageError::rejected("user writes disabled")) });
        }
        self.acknowledge(self.inner.delete_user(id))
    }

    fn insert_joining(
        &self,
        user_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        self.inner.insert_joining(user_id, event_id)
    }

    fn recent_joinings(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<JoiningEntity>>> {
        self.joinings_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.recent_joinings(user_id, limit)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
}

/// Feed serving fixed listings, or failing every call.
#[derive(Clone, Default)]
pub struct StaticFeed {
    /// Served by `upcoming_events`.
    pub upcoming: Vec<EventEntity>,
    /// Served by `past_events`.
    pub past: Vec<EventEntity>,
    /// Fail every call instead.
    pub fail: bool,
    /// `upcoming_events` calls.
    pub upcoming_calls: Arc<AtomicUsize>,
    /// `past_events` calls.
    pub past_calls: Arc<AtomicUsize>,
}

impl StaticFeed {
    /// Feed serving the given listings.
    pub fn new(upcoming: Vec<EventEntity>, past: Vec<EventEntity>) -> Self {
        Self {
            upcoming,
            past,
            ..Self::default()
        }
    }

    /// Feed failing every call.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn respond(&self, events: Vec<EventEntity>) -> BoxFuture<'static, FeedResult<Vec<EventEntity>>> {
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                return Err(FeedError::InvalidStartTime {
                    event_id: "unreachable".into(),
                    value: "offline".into(),
                    source: OffsetDateTime::parse(
                        "offline",
                        &time::format_description::well_known::Rfc3339,
                    )
                    .expect_err("`offline` is not a timestamp"),
                });
            }
            Ok(events)
        })
    }
}

impl EventFeed for StaticFeed {
    fn upcoming_events(&self) -> BoxFuture<'static, FeedResult<Vec<EventEntity>>> {
        self.upcoming_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(self.upcoming.clone())
    }

    fn past_events(&self) -> BoxFuture<'static, FeedResult<Vec<EventEntity>>> {
        self.past_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(self.past.clone())
    }
}
