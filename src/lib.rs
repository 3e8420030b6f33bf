//! Library crate for attendance-badges, exposing modules for binaries and integration tests.

/// Runtime configuration loading.
pub mod config;
/// Storage, event feed and the data access layer.
pub mod dao;
mod dto;
mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Business logic behind the routes and sessions.
pub mod services;
/// Shared application state and per-user sessions.
pub mod state;
