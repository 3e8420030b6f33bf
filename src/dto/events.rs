use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::dao::models::EventEntity;

/// Event as exposed by the `/events` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    /// External identifier.
    pub id: String,
    /// Full event name.
    pub name: String,
    /// Name without the party prefixes.
    pub short_name: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    /// Start time.
    pub timestamp: OffsetDateTime,
    /// Badge graphic.
    pub badge_url: String,
}

impl From<&EventEntity> for EventSummary {
    fn from(event: &EventEntity) -> Self {
        Self {
            id: event.id.clone(),
            name: event.name.clone(),
            short_name: event.short_name().to_string(),
            timestamp: event.timestamp,
            badge_url: event.badge_url.clone(),
        }
    }
}

/// Known events, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    /// Events in catalog order.
    pub events: Vec<EventSummary>,
}
