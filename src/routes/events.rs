use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::events::EventsResponse, error::AppError, services::events_service, state::SharedState,
};

/// Read-only event catalog endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/events", get(list_events))
}

#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses(
        (status = 200, description = "Cached events, newest first", body = EventsResponse),
        (status = 503, description = "Badge store unavailable")
    )
)]
/// Return the events badges can be earned for.
pub async fn list_events(State(state): State<SharedState>) -> Result<Json<EventsResponse>, AppError> {
    let payload = events_service::list_events(&state).await?;
    Ok(Json(payload))
}
