//! Read-only views served by the operator REST routes.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{GameEntity, PlayerEntity},
    dto::format_system_time,
    state::{game::Roster, state_machine::GameState},
};

/// Snapshot of one game and its full roster.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameView {
    pub id: Uuid,
    pub state: GameState,
    pub round: u32,
    pub awaiting_answers: bool,
    pub target_score: u32,
    pub options_per_question: u32,
    pub seconds_per_question: u32,
    pub max_player_count: u32,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    pub round_started_at: Option<String>,
    pub expires_at: Option<String>,
    pub players: Vec<PlayerView>,
}

/// One roster entry. The connection identity is not exposed.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerView {
    pub name: String,
    pub icon: String,
    pub points: u32,
    pub active: bool,
    pub responded: bool,
}

impl From<&PlayerEntity> for PlayerView {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            name: player.name.clone(),
            icon: player.icon.clone(),
            points: player.points,
            active: player.active,
            responded: player.responded,
        }
    }
}

impl GameView {
    pub fn new(game: &GameEntity, roster: &Roster) -> Self {
        Self {
            id: game.id,
            state: game.state,
            round: game.round,
            awaiting_answers: game.awaiting_answers,
            target_score: game.target_score,
            options_per_question: game.options_per_question,
            seconds_per_question: game.seconds_per_question,
            max_player_count: game.max_player_count,
            created_at: format_system_time(game.created_at),
            round_started_at: game.round_start_time.map(format_system_time),
            expires_at: game.expires_at.map(format_system_time),
            players: roster.players().iter().map(PlayerView::from).collect(),
        }
    }
}
