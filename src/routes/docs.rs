use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const UI_PATH: &str = "/docs";
const SPEC_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI for the health endpoint and the WebSocket message schemas.
pub fn router() -> Router<SharedState> {
    SwaggerUi::new(UI_PATH)
        .url(SPEC_PATH, ApiDoc::openapi())
        .into()
}
