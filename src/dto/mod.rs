/// Event catalog payloads.
pub mod events;
/// Health check payload.
pub mod health;
/// Badge render plans.
pub mod render;
/// Presentation host WebSocket protocol.
pub mod ws;
