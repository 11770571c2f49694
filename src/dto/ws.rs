//! Wire payloads exchanged with player WebSocket clients.
//!
//! Field names are PascalCase to match the browser client.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::validate_display_text;

/// Raw envelope accepted from a player.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerMessage {
    pub message_type: MessageType,
    #[serde(default)]
    pub new_player: Option<NewPlayer>,
    #[serde(default)]
    pub player_response: Option<PlayerResponse>,
}

/// Discriminator of [`PlayerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    NewPlayer,
    PlayerResponse,
}

/// Sent once by a player who wants to join the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct NewPlayer {
    #[validate(length(min = 1, max = 32), custom(function = "validate_display_text"))]
    pub name: String,
    #[validate(length(min = 1, max = 64), custom(function = "validate_display_text"))]
    pub icon: String,
}

/// A player's answer to the open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerResponse {
    pub response: u32,
}

/// Validated inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    NewPlayer(NewPlayer),
    PlayerResponse(PlayerResponse),
}

/// Reasons an inbound frame is rejected.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("`{0}` message without its body")]
    MissingBody(&'static str),
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl InboundMessage {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, MessageError> {
        let envelope: PlayerMessage = serde_json::from_str(text)?;
        match envelope.message_type {
            MessageType::NewPlayer => {
                let body = envelope
                    .new_player
                    .ok_or(MessageError::MissingBody("newplayer"))?;
                let body = NewPlayer {
                    name: body.name.trim().to_string(),
                    icon: body.icon.trim().to_string(),
                };
                body.validate()?;
                Ok(Self::NewPlayer(body))
            }
            MessageType::PlayerResponse => envelope
                .player_response
                .map(Self::PlayerResponse)
                .ok_or(MessageError::MissingBody("playerresponse")),
        }
    }
}

/// Every message pushed to a player. Serialized as `{"<Variant>": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum OutboundMessage {
    Welcome(Welcome),
    AboutToStart(AboutToStart),
    PresentQuestion(PresentQuestion),
    PlayerResult(PlayerResult),
    RoundSummary(RoundSummary),
    Summary(Summary),
    Error(ErrorNotice),
}

impl OutboundMessage {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome(_) => "welcome",
            Self::AboutToStart(_) => "about_to_start",
            Self::PresentQuestion(_) => "present_question",
            Self::PlayerResult(_) => "player_result",
            Self::RoundSummary(_) => "round_summary",
            Self::Summary(_) => "summary",
            Self::Error(_) => "error",
        }
    }
}

/// Greeting sent to a player right after joining the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Welcome {
    pub target_score: u32,
    pub seconds_till_start: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct AboutToStart {
    pub seconds: u64,
}

/// The question of a round. The correct index is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PresentQuestion {
    pub word_to_guess: String,
    pub definitions: Vec<String>,
    pub seconds_allowed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerResult {
    pub correct: bool,
    pub correct_answer: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct RoundSummary {
    pub player_states: Vec<PlayerState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub score: u32,
    pub active: bool,
}

/// Final announcement of a finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Summary {
    pub winner: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorNotice {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_player() {
        let message = InboundMessage::from_json_str(
            r#"{"MessageType":"newplayer","NewPlayer":{"Name":" Ada ","Icon":"horse3"}}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            InboundMessage::NewPlayer(NewPlayer {
                name: "Ada".into(),
                icon: "horse3".into(),
            })
        );
    }

    #[test]
    fn parses_player_response() {
        let message = InboundMessage::from_json_str(
            r#"{"MessageType":"playerresponse","PlayerResponse":{"Response":2}}"#,
        )
        .unwrap();
        assert_eq!(
            message,
            InboundMessage::PlayerResponse(PlayerResponse { response: 2 })
        );
    }

    #[test]
    fn rejects_missing_body() {
        let err = InboundMessage::from_json_str(r#"{"MessageType":"playerresponse"}"#)
            .unwrap_err();
        assert!(matches!(err, MessageError::MissingBody("playerresponse")));
    }

    #[test]
    fn rejects_blank_names() {
        let err = InboundMessage::from_json_str(
            r#"{"MessageType":"newplayer","NewPlayer":{"Name":"   ","Icon":"horse3"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MessageError::Invalid(_)));
    }

    #[test]
    fn rejects_overlong_and_control_names() {
        let long = "x".repeat(33);
        let err = InboundMessage::from_json_str(&format!(
            r#"{{"MessageType":"newplayer","NewPlayer":{{"Name":"{long}","Icon":"horse3"}}}}"#
        ))
        .unwrap_err();
        assert!(matches!(err, MessageError::Invalid(_)));

        let err = InboundMessage::from_json_str(
            r#"{"MessageType":"newplayer","NewPlayer":{"Name":"Ad\u0007a","Icon":"horse3"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MessageError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_types_and_garbage() {
        assert!(matches!(
            InboundMessage::from_json_str(r#"{"MessageType":"dance"}"#),
            Err(MessageError::Malformed(_))
        ));
        assert!(matches!(
            InboundMessage::from_json_str("not json"),
            Err(MessageError::Malformed(_))
        ));
        assert!(matches!(
            InboundMessage::from_json_str(
                r#"{"MessageType":"playerresponse","PlayerResponse":{"Response":-1}}"#
            ),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn outbound_messages_are_externally_tagged() {
        let welcome = OutboundMessage::Welcome(Welcome {
            target_score: 500,
            seconds_till_start: 12,
        });
        assert_eq!(
            serde_json::to_string(&welcome).unwrap(),
            r#"{"Welcome":{"TargetScore":500,"SecondsTillStart":12}}"#
        );

        let summary = OutboundMessage::RoundSummary(RoundSummary {
            player_states: vec![PlayerState {
                id: "c1".into(),
                name: "Ada".into(),
                icon: "horse1".into(),
                score: 140,
                active: true,
            }],
        });
        assert_eq!(
            serde_json::to_string(&summary).unwrap(),
            r#"{"RoundSummary":{"PlayerStates":[{"Id":"c1","Name":"Ada","Icon":"horse1","Score":140,"Active":true}]}}"#
        );
    }
}
