use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{dto::game::GameView, error::AppError, state::SharedState};

/// Read-only game inspection routes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/games/{id}", get(get_game))
}

/// Snapshot of one game and its roster.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "game",
    params(("id" = String, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game found", body = GameView),
        (status = 404, description = "Unknown game"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameView>, AppError> {
    let view = state.game_service().await?.game_view(id).await?;
    Ok(Json(view))
}
