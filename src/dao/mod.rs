/// Relational store backends.
pub mod badge_store;
/// Single-flight memoization used by the data access layer.
pub mod cache;
/// Data access layer with cached reads and the initialization gate.
pub mod dal;
/// Remote event listings.
pub mod event_feed;
/// Domain records persisted by the badge store.
pub mod models;
/// Backend-agnostic storage errors.
pub mod storage;

/// Store and feed doubles for unit tests.
#[cfg(test)]
pub mod testing;
