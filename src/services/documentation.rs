use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the attendance badges service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::events::list_events,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::events::EventSummary,
            crate::dto::events::EventsResponse,
            crate::dto::ws::HostInboundMessage,
            crate::dto::ws::HostOutboundMessage,
            crate::dto::ws::MenuAction,
            crate::dto::render::RenderPlan,
            crate::dto::render::BadgeCell,
            crate::dao::models::PresentationMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "events", description = "Event catalog"),
        (name = "host", description = "WebSocket protocol of the presentation host"),
    )
)]
pub struct ApiDoc;
