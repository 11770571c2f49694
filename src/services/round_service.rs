//! Round lifecycle: opening a round, recording answers, concluding.

use std::time::SystemTime;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::{GameEntity, PlayerEntity},
    dto::ws::{OutboundMessage, PlayerResult, PresentQuestion},
    error::ServiceError,
    services::{
        dispatcher::Task,
        game_service::GameService,
        question::draw_question,
        scoring::{elapsed_since, score_answer},
    },
    state::state_machine::GameState,
};

impl GameService {
    /// Open the next round of an in-progress game and present its question.
    ///
    /// No-op when the game is not running or a round is still open, which makes
    /// a redelivered task harmless.
    pub async fn do_round(&self, game_id: Uuid) -> Result<(), ServiceError> {
        let Some(game) = self.store.find_game(game_id).await? else {
            debug!(%game_id, "round ignored: game not found");
            return Ok(());
        };
        if game.state != GameState::InProgress || game.awaiting_answers {
            debug!(
                %game_id,
                state = ?game.state,
                awaiting = game.awaiting_answers,
                "round ignored: game is not between rounds"
            );
            return Ok(());
        }
        let previous = game.round;
        let next = previous + 1;

        let roster = self.roster(game_id).await?;
        if roster.all_inactive() {
            return self.finish_abandoned(game_id).await;
        }

        for player in roster.active().filter(|player| player.round < next) {
            self.update_player_with(&player.connection_id, |current| {
                (current.round < next).then(|| PlayerEntity {
                    responded: false,
                    round: next,
                    ..current.clone()
                })
            })
            .await?;
        }

        let question = {
            let mut rng = rand::rng();
            draw_question(&self.dictionary, game.options_per_question, &mut rng)
        }
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no word category holds {} entries",
                game.options_per_question
            ))
        })?;

        let opened = self
            .update_game_with(game_id, |current| {
                let between_rounds = current.state == GameState::InProgress
                    && !current.awaiting_answers
                    && current.round == previous;
                between_rounds.then(|| GameEntity {
                    round: next,
                    awaiting_answers: true,
                    correct_answer_index: Some(question.correct_index),
                    round_start_time: Some(SystemTime::now()),
                    ..current.clone()
                })
            })
            .await?;
        let Some(opened) = opened else {
            debug!(%game_id, round = next, "round ignored: opened concurrently");
            return Ok(());
        };
        info!(%game_id, round = opened.round, "round opened");

        let roster = self.roster(game_id).await?;
        self.notifier
            .broadcast(
                roster.active(),
                &OutboundMessage::PresentQuestion(PresentQuestion {
                    word_to_guess: question.word,
                    definitions: question.definitions,
                    seconds_allowed: opened.seconds_per_question,
                }),
            )
            .await;
        Ok(())
    }

    /// Score a player's answer to the open round, at most once per round.
    pub async fn record_response(
        &self,
        connection_id: &str,
        response: u32,
        received: SystemTime,
    ) -> Result<(), ServiceError> {
        let Some(player) = self.store.find_player(connection_id.to_string()).await? else {
            return Err(ServiceError::NotFound(
                "connection has not joined a game".into(),
            ));
        };
        let Some(game) = self.store.find_game(player.game_id).await? else {
            return Err(ServiceError::NotFound(format!(
                "game `{}` not found",
                player.game_id
            )));
        };

        let round = game.round;
        let open = game.state == GameState::InProgress && game.awaiting_answers;
        let (Some(correct_index), Some(round_start)) =
            (game.correct_answer_index, game.round_start_time)
        else {
            debug!(connection_id, game_id = %game.id, "response ignored: no question asked yet");
            return Ok(());
        };
        if !open || !player.active || player.round != round || player.responded {
            debug!(connection_id, game_id = %game.id, round, "response ignored: not awaited");
            return Ok(());
        }
        if response >= game.options_per_question {
            return Err(ServiceError::InvalidInput(format!(
                "response {response} is out of range (0..{})",
                game.options_per_question
            )));
        }

        let points = score_answer(
            response,
            correct_index,
            elapsed_since(round_start, received),
            game.seconds_per_question,
        );
        let recorded = self
            .update_player_with(connection_id, |current| {
                let awaited = current.active && current.round == round && !current.responded;
                awaited.then(|| PlayerEntity {
                    responded: true,
                    points: current.points + points,
                    ..current.clone()
                })
            })
            .await?;
        let Some(recorded) = recorded else {
            debug!(connection_id, round, "response ignored: already recorded");
            return Ok(());
        };
        info!(
            connection_id,
            game_id = %game.id,
            round,
            points,
            total = recorded.points,
            "response recorded"
        );

        let _ = self
            .notifier
            .send_to(
                connection_id,
                &OutboundMessage::PlayerResult(PlayerResult {
                    correct: response == correct_index,
                    correct_answer: correct_index,
                }),
            )
            .await;

        let roster = self.roster(game.id).await?;
        if roster.all_active_responded(round) {
            self.conclude_round(game.id, round).await?;
        }
        Ok(())
    }

    /// Close `round`, announce the scoreboard, then finish or schedule the next round.
    ///
    /// Only the caller whose conditional write closes the round proceeds.
    pub(super) async fn conclude_round(&self, game_id: Uuid, round: u32) -> Result<(), ServiceError> {
        let closed = self
            .update_game_with(game_id, |current| {
                let open = current.state == GameState::InProgress
                    && current.awaiting_answers
                    && current.round == round;
                open.then(|| GameEntity {
                    awaiting_answers: false,
                    ..current.clone()
                })
            })
            .await?;
        let Some(closed) = closed else {
            debug!(%game_id, round, "round already concluded");
            return Ok(());
        };
        info!(%game_id, round, "round concluded");

        let roster = self.roster(game_id).await?;
        self.broadcast_round_summary(&roster).await;

        match roster.leader() {
            Some(leader) if leader.points >= closed.target_score => {
                self.finish_game(&closed, &roster).await
            }
            Some(_) => self.schedule(Task::DoRound(game_id), self.config.timings.round_pause),
            None => self.finish_abandoned(game_id).await,
        }
    }
}
