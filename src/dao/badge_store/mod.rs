/// In-process backend used without a database.
pub mod memory;
/// PostgreSQL backend.
#[cfg(feature = "postgres-store")]
pub mod postgres;

use crate::dao::models::{EventEntity, JoiningEntity, UserEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the relational store holding users, events and joinings.
///
/// Write methods report the number of affected rows so callers can detect
/// writes that silently touched nothing.
pub trait BadgeStore: Send + Sync {
    /// Create the tables and indexes when missing.
    fn ensure_schema(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Whether the Events table holds at least one row.
    fn has_events(&self) -> BoxFuture<'static, StorageResult<bool>>;
    /// Insert or update events keyed by id.
    fn upsert_events(&self, events: Vec<EventEntity>) -> BoxFuture<'static, StorageResult<u64>>;
    /// Up to `limit` events, newest first.
    fn recent_events(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<EventEntity>>>;
    /// The user's record, if they opted in.
    fn find_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// Insert or replace a user record.
    fn upsert_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<u64>>;
    /// Delete a user; their joinings go with them.
    fn delete_user(&self, id: Uuid) -> BoxFuture<'static, StorageResult<u64>>;
    /// Record an attendance; a duplicate pair affects no row.
    fn insert_joining(
        &self,
        user_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Up to `limit` of the user's joinings, newest first.
    fn recent_joinings(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<JoiningEntity>>>;
    /// Cheap round-trip proving the store answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
