//! Read-only projection of the cached event collection.

use crate::{
    dto::events::{EventSummary, EventsResponse},
    error::ServiceError,
    state::SharedState,
};

/// Return the cached events, newest first.
pub async fn list_events(state: &SharedState) -> Result<EventsResponse, ServiceError> {
    let catalog = state.dal().get_events().await?;
    let events = catalog.iter().map(EventSummary::from).collect();
    Ok(EventsResponse { events })
}
