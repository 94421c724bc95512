use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" while the process serves requests.
    pub status: String,
    /// Registered connections.
    pub connections: usize,
    /// Connections holding a player slot.
    pub players: usize,
    /// Confirmed spectators.
    pub spectators: usize,
    /// Whether a match is in progress.
    pub running: bool,
}
