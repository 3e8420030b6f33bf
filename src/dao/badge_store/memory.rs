//! In-process [`BadgeStore`] used when no database is configured.
//!
//! Mirrors the relational contract: foreign keys are enforced, deleting a user
//! cascades its joinings and reads come back newest first.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    badge_store::BadgeStore,
    models::{EventEntity, JoiningEntity, UserEntity},
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserEntity>,
    events: HashMap<String, EventEntity>,
    joinings: IndexMap<(Uuid, String), OffsetDateTime>,
}

/// Store keeping every table in process memory. Enforces the same keys and
/// cascades as the relational schema.
#[derive(Clone, Default)]
pub struct MemoryBadgeStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBadgeStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BadgeStore for MemoryBadgeStore {
    fn ensure_schema(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn has_events(&self) -> BoxFuture<'static, StorageResult<bool>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(!tables.read().await.events.is_empty()) })
    }

    fn upsert_events(&self, events: Vec<EventEntity>) -> BoxFuture<'static, StorageResult<u64>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            let mut affected = 0;
            for event in events {
                guard.events.insert(event.id.clone(), event);
                affected += 1;
            }
            Ok(affected)
        })
    }

    fn recent_events(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            let mut events = guard.events.values().cloned().collect::<Vec<_>>();
            events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
            events.truncate(limit);
            Ok(events)
        })
    }

    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(tables.read().await.users.get(&id).cloned()) })
    }

    fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            tables.write().await.users.insert(user.id, user);
            Ok(1)
        })
    }

    fn delete_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            if guard.users.remove(&id).is_none() {
                return Ok(0);
            }
            guard.joinings.retain(|(user_id, _), _| *user_id != id);
            Ok(1)
        })
    }

    fn insert_joining(
        &self,
        user_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            if !guard.users.contains_key(&user_id) {
                return Err(StorageError::rejected(format!(
                    "joining references unknown user `{user_id}`"
                )));
            }
            if !guard.events.contains_key(&event_id) {
                return Err(StorageError::rejected(format!(
                    "joining references unknown event `{event_id}`"
                )));
            }

            let key = (user_id, event_id);
            if guard.joinings.contains_key(&key) {
                return Ok(0);
            }
            guard.joinings.insert(key, OffsetDateTime::now_utc());
            Ok(1)
        })
    }

    fn recent_joinings(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<JoiningEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            // Latest insertions first so equal timestamps keep newest-first order.
            let mut joinings = guard
                .joinings
                .iter()
                .rev()
                .filter(|((owner, _), _)| *owner == user_id)
                .map(|((owner, event_id), timestamp)| JoiningEntity {
                    user_id: *owner,
                    event_id: event_id.clone(),
                    timestamp: *timestamp,
                })
                .collect::<Vec<_>>();
            joinings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            joinings.truncate(limit);
            Ok(joinings)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn event(id: &str, timestamp: OffsetDateTime) -> EventEntity {
        EventEntity {
            id: id.into(),
            name: format!("Rocket Party: {id}"),
            timestamp,
            badge_url: format!("https://example.org/{id}.png"),
        }
    }

    #[tokio::test]
    async fn duplicate_joining_is_ignored() {
        let store = MemoryBadgeStore::new();
        let user = UserEntity::opted_in(Uuid::new_v4(), "Ada");
        store.upsert_user(user.clone()).await.unwrap();
        store
            .upsert_events(vec![event("e1", datetime!(2023-01-01 0:00 UTC))])
            .await
            .unwrap();

        assert_eq!(store.insert_joining(user.id, "e1".into()).await.unwrap(), 1);
        assert_eq!(store.insert_joining(user.id, "e1".into()).await.unwrap(), 0);
        assert_eq!(store.recent_joinings(user.id, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn joining_requires_existing_user_and_event() {
        let store = MemoryBadgeStore::new();
        let user = UserEntity::opted_in(Uuid::new_v4(), "Ada");

        assert!(store.insert_joining(user.id, "e1".into()).await.is_err());

        store.upsert_user(user.clone()).await.unwrap();
        assert!(store.insert_joining(user.id, "e1".into()).await.is_err());
    }

    #[tokio::test]
    async fn deleting_user_cascades_joinings() {
        let store = MemoryBadgeStore::new();
        let user = UserEntity::opted_in(Uuid::new_v4(), "Ada");
        store.upsert_user(user.clone()).await.unwrap();
        store
            .upsert_events(vec![event("e1", datetime!(2023-01-01 0:00 UTC))])
            .await
            .unwrap();
        store.insert_joining(user.id, "e1".into()).await.unwrap();

        assert_eq!(store.delete_user(user.id).await.unwrap(), 1);
        assert_eq!(store.delete_user(user.id).await.unwrap(), 0);
        assert!(store.recent_joinings(user.id, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_events_are_newest_first_and_capped() {
        let store = MemoryBadgeStore::new();
        store
            .upsert_events(vec![
                event("old", datetime!(2021-01-01 0:00 UTC)),
                event("new", datetime!(2023-01-01 0:00 UTC)),
                event("mid", datetime!(2022-01-01 0:00 UTC)),
            ])
            .await
            .unwrap();

        let events = store.recent_events(2).await.unwrap();
        let ids = events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["new", "mid"]);
    }
}
