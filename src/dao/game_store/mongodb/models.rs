use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::models::{GameEntity, PendingSlotEntity, PlayerEntity},
    state::state_machine::GameState,
};

use super::error::MongoDaoError;

/// `_id` of the single document in the `pending` collection.
pub const PENDING_SLOT_ID: &str = "current";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
    pub state: GameState,
    pub target_score: u32,
    pub options_per_question: u32,
    pub seconds_per_question: u32,
    pub max_player_count: u32,
    pub correct_answer_index: Option<u32>,
    pub round_start_time: Option<DateTime>,
    pub round: u32,
    pub awaiting_answers: bool,
    pub created_at: DateTime,
    /// Watched by a TTL index.
    pub expires_at: Option<DateTime>,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id.to_string(),
            version: value.version as i64,
            state: value.state,
            target_score: value.target_score,
            options_per_question: value.options_per_question,
            seconds_per_question: value.seconds_per_question,
            max_player_count: value.max_player_count,
            correct_answer_index: value.correct_answer_index,
            round_start_time: value.round_start_time.map(DateTime::from_system_time),
            round: value.round,
            awaiting_answers: value.awaiting_answers,
            created_at: DateTime::from_system_time(value.created_at),
            expires_at: value.expires_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGameDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            version: value.version.max(0) as u64,
            state: value.state,
            target_score: value.target_score,
            options_per_question: value.options_per_question,
            seconds_per_question: value.seconds_per_question,
            max_player_count: value.max_player_count,
            correct_answer_index: value.correct_answer_index,
            round_start_time: value.round_start_time.map(DateTime::to_system_time),
            round: value.round,
            awaiting_answers: value.awaiting_answers,
            created_at: value.created_at.to_system_time(),
            expires_at: value.expires_at.map(DateTime::to_system_time),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    /// Connection identity.
    #[serde(rename = "_id")]
    pub id: String,
    pub version: i64,
    pub game_id: String,
    pub active: bool,
    pub responded: bool,
    pub round: u32,
    pub name: String,
    pub icon: String,
    pub points: u32,
    pub join_offset_ms: i64,
    pub expires_at: Option<DateTime>,
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.connection_id,
            version: value.version as i64,
            game_id: value.game_id.to_string(),
            active: value.active,
            responded: value.responded,
            round: value.round,
            name: value.name,
            icon: value.icon,
            points: value.points,
            join_offset_ms: value.join_offset_ms as i64,
            expires_at: value.expires_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            connection_id: value.id,
            version: value.version.max(0) as u64,
            game_id: parse_uuid(&value.game_id)?,
            active: value.active,
            responded: value.responded,
            round: value.round,
            name: value.name,
            icon: value.icon,
            points: value.points,
            join_offset_ms: value.join_offset_ms.max(0) as u64,
            expires_at: value.expires_at.map(DateTime::to_system_time),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPendingDocument {
    #[serde(rename = "_id")]
    pub id: String,
    /// Duplicated from `game` so the conditional release can filter on it.
    pub game_id: String,
    pub claimed_at: DateTime,
    pub game: MongoGameDocument,
}

impl From<PendingSlotEntity> for MongoPendingDocument {
    fn from(value: PendingSlotEntity) -> Self {
        Self {
            id: PENDING_SLOT_ID.to_owned(),
            game_id: value.game_id().to_string(),
            claimed_at: DateTime::from_system_time(value.claimed_at),
            game: value.game.into(),
        }
    }
}

impl TryFrom<MongoPendingDocument> for PendingSlotEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPendingDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            game: value.game.try_into()?,
            claimed_at: value.claimed_at.to_system_time(),
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(value).map_err(|source| MongoDaoError::InvalidId {
        value: value.to_owned(),
        source,
    })
}
