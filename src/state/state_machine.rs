use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle states of a game. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    /// Lobby accepting new players.
    Pending,
    /// Rounds are being played.
    InProgress,
    /// Terminal state; a winner has been announced.
    Finished,
}

/// Events that can be applied to a game's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Roster filled up or the autostart grace period elapsed.
    Start,
    /// A player reached the target score, or nobody is left to play.
    Finish,
}

/// Error returned when an event cannot be applied from the current state.
///
/// Handlers treat this as an idempotent no-op: duplicate triggers are expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The state the game was in when the event was received.
    pub from: GameState,
    /// The event that cannot be applied from this state.
    pub event: GameEvent,
}

impl GameState {
    /// Compute the state reached by applying `event`, if the transition is legal.
    pub fn transition(self, event: GameEvent) -> Result<GameState, InvalidTransition> {
        match (self, event) {
            (GameState::Pending, GameEvent::Start) => Ok(GameState::InProgress),
            (GameState::InProgress, GameEvent::Finish) => Ok(GameState::Finished),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Whether rounds may be opened, answered or concluded in this state.
    pub fn is_playing(self) -> bool {
        matches!(self, GameState::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path_through_game() {
        let state = GameState::Pending;
        let state = state.transition(GameEvent::Start).unwrap();
        assert_eq!(state, GameState::InProgress);
        let state = state.transition(GameEvent::Finish).unwrap();
        assert_eq!(state, GameState::Finished);
    }

    #[test]
    fn start_is_rejected_once_started() {
        let err = GameState::InProgress
            .transition(GameEvent::Start)
            .unwrap_err();
        assert_eq!(err.from, GameState::InProgress);
        assert_eq!(err.event, GameEvent::Start);
    }

    #[test]
    fn finished_is_terminal() {
        assert!(GameState::Finished.transition(GameEvent::Start).is_err());
        assert!(GameState::Finished.transition(GameEvent::Finish).is_err());
    }

    #[test]
    fn pending_cannot_finish() {
        let err = GameState::Pending
            .transition(GameEvent::Finish)
            .unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: GameState::Pending,
                event: GameEvent::Finish,
            }
        );
    }

    #[test]
    fn only_in_progress_is_playing() {
        assert!(!GameState::Pending.is_playing());
        assert!(GameState::InProgress.is_playing());
        assert!(!GameState::Finished.is_playing());
    }
}
