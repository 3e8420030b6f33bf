/// Badge layout computed from a user's joinings.
pub mod badge_engine;
/// OpenAPI documentation generation.
pub mod documentation;
/// Read access to the event catalog.
pub mod events_service;
/// Health check service.
pub mod health_service;
/// Per-user preference interactions and session workers.
pub mod preference_service;
/// Boundary towards the presentation host.
pub mod presenter;
/// WebSocket connection and message handling service.
pub mod websocket_service;
