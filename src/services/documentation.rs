use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the word derby backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::game::get_game,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::GameView,
            crate::dto::game::PlayerView,
            crate::dto::ws::PlayerMessage,
            crate::dto::ws::OutboundMessage,
            crate::state::state_machine::GameState,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "players", description = "WebSocket protocol spoken by player clients"),
        (name = "game", description = "Game inspection"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        assert!(paths.contains(&"/healthcheck".to_string()));
        assert!(paths.contains(&"/ws".to_string()));
        assert!(paths.contains(&"/games/{id}".to_string()));
    }
}
