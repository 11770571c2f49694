//! Orchestration handlers shared by the lobby and round flows.
//!
//! Every handler re-reads the records it decides on and writes through
//! conditional updates, so a trigger delivered twice or racing another trigger
//! for the same game leaves the game in the same state as a single delivery.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        game_store::GameStore,
        models::{GameEntity, PlayerEntity},
        storage::Conditional,
        words::WordDictionary,
    },
    dto::{
        game::GameView,
        ws::{AboutToStart, OutboundMessage, RoundSummary, Summary},
    },
    error::ServiceError,
    services::{
        dispatcher::{Task, TaskDispatcher},
        notifier::Notifier,
    },
    state::{
        game::Roster,
        state_machine::{GameEvent, GameState},
    },
};

/// Attempts at a read-decide-write cycle before reporting a conflict.
const MAX_WRITE_ATTEMPTS: u32 = 8;

/// Handlers for every orchestration trigger, wired with their collaborators.
pub struct GameService {
    pub(super) store: Arc<dyn GameStore>,
    pub(super) notifier: Notifier,
    pub(super) dispatcher: Arc<dyn TaskDispatcher>,
    pub(super) dictionary: Arc<WordDictionary>,
    pub(super) config: Arc<AppConfig>,
}

impl GameService {
    pub fn new(
        store: Arc<dyn GameStore>,
        notifier: Notifier,
        dispatcher: Arc<dyn TaskDispatcher>,
        dictionary: Arc<WordDictionary>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            notifier,
            dispatcher,
            dictionary,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Execute a scheduled continuation.
    pub async fn handle_task(&self, task: Task) -> Result<(), ServiceError> {
        match task {
            Task::StartGame(game_id) => self.start_game(game_id).await,
            Task::DoRound(game_id) => self.do_round(game_id).await,
        }
    }

    /// Snapshot of a game and its roster for the operator routes.
    pub async fn game_view(&self, game_id: Uuid) -> Result<GameView, ServiceError> {
        let game = self
            .store
            .find_game(game_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))?;
        let roster = self.roster(game_id).await?;
        Ok(GameView::new(&game, &roster))
    }

    /// Pending -> InProgress, at most once per game.
    ///
    /// No-op unless the game exists, is still pending and has someone to play.
    pub async fn start_game(&self, game_id: Uuid) -> Result<(), ServiceError> {
        let Some(game) = self.store.find_game(game_id).await? else {
            debug!(%game_id, "start ignored: game not found");
            return Ok(());
        };
        if game.state != GameState::Pending {
            debug!(%game_id, state = ?game.state, "start ignored: game is not pending");
            return Ok(());
        }
        if self.roster(game_id).await?.all_inactive() {
            debug!(%game_id, "start ignored: lobby is empty");
            return Ok(());
        }

        let game_ttl = self.config.timings.game_ttl;
        let started = self
            .update_game_with(game_id, |current| {
                let state = current.state.transition(GameEvent::Start).ok()?;
                Some(GameEntity {
                    state,
                    expires_at: Some(SystemTime::now() + game_ttl),
                    ..current.clone()
                })
            })
            .await?;
        let Some(started) = started else {
            debug!(%game_id, "start ignored: another trigger started the game");
            return Ok(());
        };
        info!(game_id = %started.id, "game started");

        self.release_pending_slot(game_id).await?;

        let countdown = self.config.timings.countdown;
        let roster = self.roster(game_id).await?;
        self.notifier
            .broadcast(
                roster.active(),
                &OutboundMessage::AboutToStart(AboutToStart {
                    seconds: countdown.as_secs(),
                }),
            )
            .await;

        self.schedule(Task::DoRound(game_id), countdown)
    }

    /// Announce the winner, then persist the game as finished.
    pub(super) async fn finish_game(
        &self,
        game: &GameEntity,
        roster: &Roster,
    ) -> Result<(), ServiceError> {
        if let Some(winner) = roster.leader() {
            info!(
                game_id = %game.id,
                winner = %winner.name,
                points = winner.points,
                "game won"
            );
            self.notifier
                .broadcast(
                    roster.active(),
                    &OutboundMessage::Summary(Summary {
                        winner: winner.name.clone(),
                        icon: winner.icon.clone(),
                    }),
                )
                .await;
        }
        self.persist_finished(game.id).await
    }

    /// Finish a game nobody is playing anymore, without broadcasts.
    pub(super) async fn finish_abandoned(&self, game_id: Uuid) -> Result<(), ServiceError> {
        info!(%game_id, "no active players left; finishing game");
        self.persist_finished(game_id).await
    }

    async fn persist_finished(&self, game_id: Uuid) -> Result<(), ServiceError> {
        let finished = self
            .update_game_with(game_id, |current| {
                let state = current.state.transition(GameEvent::Finish).ok()?;
                Some(GameEntity {
                    state,
                    awaiting_answers: false,
                    ..current.clone()
                })
            })
            .await?;
        if finished.is_some() {
            info!(%game_id, "game finished");
        }
        Ok(())
    }

    /// Fresh consistent read of every player in a game.
    pub(super) async fn roster(&self, game_id: Uuid) -> Result<Roster, ServiceError> {
        let players = self.store.list_players(game_id).await?;
        Ok(Roster::new(players))
    }

    /// Push the per-player scoreboard to every active player.
    pub(super) async fn broadcast_round_summary(&self, roster: &Roster) {
        self.notifier
            .broadcast(
                roster.active(),
                &OutboundMessage::RoundSummary(RoundSummary {
                    player_states: roster.player_states(),
                }),
            )
            .await;
    }

    pub(super) fn schedule(&self, task: Task, delay: Duration) -> Result<(), ServiceError> {
        self.dispatcher.dispatch(task, delay)?;
        Ok(())
    }

    pub(super) async fn release_pending_slot(&self, game_id: Uuid) -> Result<(), ServiceError> {
        match self.store.release_pending_slot(game_id).await? {
            Conditional::Applied(()) => debug!(%game_id, "released pending slot"),
            Conditional::ConditionFailed => {
                debug!(%game_id, "pending slot already points elsewhere")
            }
        }
        Ok(())
    }

    /// Read-decide-write loop on one game record.
    ///
    /// `decide` sees the freshest stored copy and returns the record to write, or
    /// `None` to leave it alone. Returns the stored record when a write happened.
    pub(super) async fn update_game_with<F>(
        &self,
        game_id: Uuid,
        mut decide: F,
    ) -> Result<Option<GameEntity>, ServiceError>
    where
        F: FnMut(&GameEntity) -> Option<GameEntity>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(current) = self.store.find_game(game_id).await? else {
                return Ok(None);
            };
            let Some(next) = decide(&current) else {
                return Ok(None);
            };
            match self.store.update_game(next).await? {
                Conditional::Applied(stored) => return Ok(Some(stored)),
                Conditional::ConditionFailed => {
                    debug!(%game_id, attempt, "game changed concurrently; re-reading");
                }
            }
        }
        warn!(%game_id, "gave up updating game after repeated conflicts");
        Err(ServiceError::Conflict(format!(
            "game `{game_id}` kept changing concurrently"
        )))
    }

    /// Read-decide-write loop on one player record. See [`Self::update_game_with`].
    pub(super) async fn update_player_with<F>(
        &self,
        connection_id: &str,
        mut decide: F,
    ) -> Result<Option<PlayerEntity>, ServiceError>
    where
        F: FnMut(&PlayerEntity) -> Option<PlayerEntity>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(current) = self.store.find_player(connection_id.to_string()).await? else {
                return Ok(None);
            };
            let Some(next) = decide(&current) else {
                return Ok(None);
            };
            match self.store.update_player(next).await? {
                Conditional::Applied(stored) => return Ok(Some(stored)),
                Conditional::ConditionFailed => {
                    debug!(connection_id, attempt, "player changed concurrently; re-reading");
                }
            }
        }
        warn!(connection_id, "gave up updating player after repeated conflicts");
        Err(ServiceError::Conflict(format!(
            "player `{connection_id}` kept changing concurrently"
        )))
    }
}
