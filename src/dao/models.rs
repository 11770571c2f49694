use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::{config::GameSettings, state::state_machine::GameState};

/// Authoritative record of one trivia game, persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key of the game.
    pub id: Uuid,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: u64,
    /// Current lifecycle state.
    pub state: GameState,
    /// Score that ends the game once reached by the leading player.
    pub target_score: u32,
    /// Number of candidate definitions shown per question.
    pub options_per_question: u32,
    /// Time allowed to answer a question.
    pub seconds_per_question: u32,
    /// Roster size that starts the game without waiting for the autostart timer.
    pub max_player_count: u32,
    /// Index of the correct definition for the open round.
    pub correct_answer_index: Option<u32>,
    /// When the clock of the current round started.
    pub round_start_time: Option<SystemTime>,
    /// Number of the open (or last concluded) round, zero before the first round.
    pub round: u32,
    /// Whether a round is open and answers are accepted.
    pub awaiting_answers: bool,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Reclamation hint for the store; unset while the game is pending.
    pub expires_at: Option<SystemTime>,
}

impl GameEntity {
    /// Build a fresh pending game from the configured defaults.
    pub fn new_pending(settings: &GameSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: 0,
            state: GameState::Pending,
            target_score: settings.target_score,
            options_per_question: settings.options_per_question,
            seconds_per_question: settings.seconds_per_question,
            max_player_count: settings.max_player_count,
            correct_answer_index: None,
            round_start_time: None,
            round: 0,
            awaiting_answers: false,
            created_at: SystemTime::now(),
            expires_at: None,
        }
    }

    /// Time left before the autostart timer fires, measured from creation.
    pub fn time_until_autostart(&self, grace: Duration, now: SystemTime) -> Duration {
        let deadline = self.created_at + grace;
        deadline.duration_since(now).unwrap_or(Duration::ZERO)
    }
}

/// Membership of one connection in one game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Identity of the live connection; primary key.
    pub connection_id: String,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: u64,
    /// Game this player belongs to.
    pub game_id: Uuid,
    /// Whether the connection is still part of the game.
    pub active: bool,
    /// Whether the player answered the round identified by [`PlayerEntity::round`].
    pub responded: bool,
    /// Round the `responded` flag refers to.
    pub round: u32,
    /// Display name.
    pub name: String,
    /// Client-specific icon.
    pub icon: String,
    /// Accumulated points.
    pub points: u32,
    /// Milliseconds between game creation and this player joining.
    pub join_offset_ms: u64,
    /// Reclamation hint for the store.
    pub expires_at: Option<SystemTime>,
}

impl PlayerEntity {
    /// Build the record for a connection joining `game`.
    pub fn joining(
        connection_id: String,
        game: &GameEntity,
        name: String,
        icon: String,
        ttl: Duration,
    ) -> Self {
        let now = SystemTime::now();
        let join_offset_ms = now
            .duration_since(game.created_at)
            .map(|offset| offset.as_millis() as u64)
            .unwrap_or(0);

        Self {
            connection_id,
            version: 0,
            game_id: game.id,
            active: true,
            responded: false,
            round: game.round,
            name,
            icon,
            points: 0,
            join_offset_ms,
            expires_at: Some(now + ttl),
        }
    }

    /// Whether this player answered `round`.
    pub fn has_responded_to(&self, round: u32) -> bool {
        self.responded && self.round == round
    }
}

/// Well-known record pointing at the single pending game.
///
/// It carries the full initial game so the game record can be re-created from
/// it if the process stopped between claiming the slot and writing the game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingSlotEntity {
    /// The game new joiners are routed into.
    pub game: GameEntity,
    /// When the slot was claimed.
    pub claimed_at: SystemTime,
}

impl PendingSlotEntity {
    /// Identifier of the pending game this slot points at.
    pub fn game_id(&self) -> Uuid {
        self.game.id
    }
}
