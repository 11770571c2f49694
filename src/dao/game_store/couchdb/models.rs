use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::dao::models::{GameEntity, PendingSlotEntity, PlayerEntity};

pub const GAME_PREFIX: &str = "game::";
pub const PLAYER_PREFIX: &str = "player::";
pub const PENDING_DOC_ID: &str = "pending::current";

pub const GAME_KIND: &str = "game";
pub const PLAYER_KIND: &str = "player";
pub const PENDING_KIND: &str = "pending";

/// Envelope shared by every document: CouchDB metadata around an entity body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub kind: String,
    /// Epoch milliseconds, queried by the expiry sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    #[serde(flatten)]
    pub body: T,
}

pub type CouchGameDocument = CouchDocument<GameEntity>;
pub type CouchPlayerDocument = CouchDocument<PlayerEntity>;
pub type CouchPendingDocument = CouchDocument<PendingSlotEntity>;

impl CouchGameDocument {
    pub fn from_entity(game: GameEntity, rev: Option<String>) -> Self {
        Self {
            id: game_doc_id(game.id),
            rev,
            kind: GAME_KIND.into(),
            expires_at_ms: game.expires_at.map(epoch_millis),
            body: game,
        }
    }
}

impl CouchPlayerDocument {
    pub fn from_entity(player: PlayerEntity, rev: Option<String>) -> Self {
        Self {
            id: player_doc_id(&player.connection_id),
            rev,
            kind: PLAYER_KIND.into(),
            expires_at_ms: player.expires_at.map(epoch_millis),
            body: player,
        }
    }
}

impl CouchPendingDocument {
    pub fn from_entity(slot: PendingSlotEntity) -> Self {
        Self {
            id: PENDING_DOC_ID.into(),
            rev: None,
            kind: PENDING_KIND.into(),
            expires_at_ms: None,
            body: slot,
        }
    }
}

/// Response of `_find`.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

/// Minimal metadata returned for expired documents.
#[derive(Debug, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
}

/// Revision header of any document.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

pub fn game_doc_id(id: Uuid) -> String {
    format!("{GAME_PREFIX}{id}")
}

pub fn player_doc_id(connection_id: &str) -> String {
    format!("{PLAYER_PREFIX}{connection_id}")
}

pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Mango selector for every player of a game.
pub fn players_of_game_selector(game_id: Uuid) -> Value {
    json!({ "kind": PLAYER_KIND, "game_id": game_id.to_string() })
}

/// Mango selector for documents whose expiry lies before `now`.
pub fn expired_selector(now: SystemTime) -> Value {
    json!({ "expires_at_ms": { "$lt": epoch_millis(now) } })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::GameSettings;

    #[test]
    fn player_document_is_flat_and_queryable() {
        let game = GameEntity::new_pending(&GameSettings::default());
        let player = PlayerEntity::joining(
            "abc".into(),
            &game,
            "Ada".into(),
            "horse1".into(),
            Duration::from_secs(60),
        );

        let doc = CouchPlayerDocument::from_entity(player.clone(), None);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["_id"], "player::abc");
        assert_eq!(value["kind"], "player");
        assert_eq!(value["game_id"], game.id.to_string());
        assert!(value.get("_rev").is_none());
        assert!(value["expires_at_ms"].as_u64().is_some());

        let parsed: CouchPlayerDocument = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.body, player);
    }

    #[test]
    fn game_document_keeps_revision() {
        let game = GameEntity::new_pending(&GameSettings::default());
        let doc = CouchGameDocument::from_entity(game.clone(), Some("3-abc".into()));
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["_id"], format!("game::{}", game.id));
        assert_eq!(value["_rev"], "3-abc");
        assert_eq!(value["state"], "pending");
        assert!(value.get("expires_at_ms").is_none());
    }
}
