use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the paddle relay.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::ConfirmationRequest,
            crate::dto::ws::PaddleMoveRequest,
            crate::dto::ws::OutboundMessage,
            crate::state::engine::GameSnapshot,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "WebSocket game protocol"),
    )
)]
pub struct ApiDoc;
