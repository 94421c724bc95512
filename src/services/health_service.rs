use crate::{dto::health::HealthResponse, state::SharedState, state::registry::Role};

/// Summarize registry membership and match state.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let registry = state.registry();
    let running = state.engine().lock().await.is_running();

    HealthResponse {
        status: "ok".to_string(),
        connections: registry.len(),
        players: registry.player_count(),
        spectators: registry.count(|conn| conn.role == Role::Spectator),
        running,
    }
}
