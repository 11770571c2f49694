//! Join and disconnect handlers.

use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{GameEntity, PendingSlotEntity, PlayerEntity},
        storage::Conditional,
    },
    dto::ws::{NewPlayer, OutboundMessage, Welcome},
    error::ServiceError,
    services::{dispatcher::Task, game_service::GameService},
    state::state_machine::GameState,
};

/// Attempts at locating (or creating) the pending game and joining it.
const MAX_JOIN_ATTEMPTS: u32 = 8;

/// The pending game a joiner is routed into.
struct Lobby {
    game: GameEntity,
    /// Whether this caller created the game.
    created: bool,
}

impl GameService {
    /// Add a connection to the pending game, creating one when needed.
    ///
    /// A connection that already has a player record is left untouched, so a
    /// redelivered join neither duplicates the player nor restarts anything.
    pub async fn join(&self, connection_id: &str, new_player: NewPlayer) -> Result<(), ServiceError> {
        if self
            .store
            .find_player(connection_id.to_string())
            .await?
            .is_some()
        {
            debug!(connection_id, "join ignored: connection already joined");
            return Ok(());
        }

        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            let Lobby { game, created } = self.pending_game().await?;
            let player = PlayerEntity::joining(
                connection_id.to_string(),
                &game,
                new_player.name.clone(),
                new_player.icon.clone(),
                self.config.timings.player_ttl,
            );
            let Conditional::Applied(player) = self.store.insert_player(player).await? else {
                debug!(connection_id, "join ignored: connection joined concurrently");
                return Ok(());
            };

            // The game may have started (or been dropped) between the read and the insert.
            let still_pending = self
                .store
                .find_game(game.id)
                .await?
                .filter(|current| current.state == GameState::Pending);
            let Some(game) = still_pending else {
                debug!(connection_id, game_id = %game.id, attempt, "lobby closed while joining; retrying");
                self.store.delete_player(connection_id.to_string()).await?;
                continue;
            };

            info!(
                connection_id,
                game_id = %game.id,
                name = %player.name,
                "player joined"
            );
            return self.welcome(&game, &player, created).await;
        }

        warn!(connection_id, "could not join a pending game");
        Err(ServiceError::Conflict(
            "could not join a pending game".into(),
        ))
    }

    async fn welcome(
        &self,
        game: &GameEntity,
        player: &PlayerEntity,
        created: bool,
    ) -> Result<(), ServiceError> {
        let until_autostart = game.time_until_autostart(self.config.timings.autostart, SystemTime::now());
        let _ = self
            .notifier
            .send_to(
                &player.connection_id,
                &OutboundMessage::Welcome(Welcome {
                    target_score: game.target_score,
                    seconds_till_start: until_autostart.as_secs(),
                }),
            )
            .await;

        let roster = self.roster(game.id).await?;
        self.broadcast_round_summary(&roster).await;

        if roster.len() == 1 || created {
            self.schedule(Task::StartGame(game.id), until_autostart)?;
        }
        if roster.len() >= game.max_player_count as usize {
            info!(game_id = %game.id, players = roster.len(), "lobby is full");
            self.start_game(game.id).await?;
        }
        Ok(())
    }

    /// Find the single pending game through the pending slot, creating it when absent.
    async fn pending_game(&self) -> Result<Lobby, ServiceError> {
        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            let Some(slot) = self.store.find_pending_slot().await? else {
                if let Some(lobby) = self.create_pending_game().await? {
                    return Ok(lobby);
                }
                debug!(attempt, "lost the race to create the pending game");
                continue;
            };

            match self.store.find_game(slot.game_id()).await? {
                Some(game) if game.state == GameState::Pending => {
                    return Ok(Lobby {
                        game,
                        created: false,
                    });
                }
                Some(game) => {
                    debug!(game_id = %game.id, state = ?game.state, "releasing stale pending slot");
                    self.release_pending_slot(game.id).await?;
                }
                None => {
                    // Slot claimed but the game write never landed.
                    if let Conditional::Applied(game) = self.store.insert_game(slot.game).await? {
                        info!(game_id = %game.id, "restored pending game from slot");
                        return Ok(Lobby {
                            game,
                            created: false,
                        });
                    }
                }
            }
        }

        Err(ServiceError::Conflict(
            "could not settle on a pending game".into(),
        ))
    }

    async fn create_pending_game(&self) -> Result<Option<Lobby>, ServiceError> {
        let game = GameEntity::new_pending(&self.config.game);
        let slot = PendingSlotEntity {
            game: game.clone(),
            claimed_at: SystemTime::now(),
        };
        if !self.store.claim_pending_slot(slot).await?.is_applied() {
            return Ok(None);
        }

        match self.store.insert_game(game).await? {
            Conditional::Applied(game) => {
                info!(game_id = %game.id, "created pending game");
                Ok(Some(Lobby {
                    game,
                    created: true,
                }))
            }
            // A concurrent joiner restored it from the slot first.
            Conditional::ConditionFailed => Ok(None),
        }
    }

    /// Remove a connection from its game.
    ///
    /// Lobby members are forgotten; players of a running game are kept inactive
    /// so their points stay on the scoreboard.
    pub async fn disconnect(&self, connection_id: &str) -> Result<(), ServiceError> {
        let Some(player) = self.store.find_player(connection_id.to_string()).await? else {
            debug!(connection_id, "disconnect ignored: no player for connection");
            return Ok(());
        };
        let game_id = player.game_id;
        let Some(game) = self.store.find_game(game_id).await? else {
            debug!(connection_id, %game_id, "game is gone; dropping player");
            self.store.delete_player(connection_id.to_string()).await?;
            return Ok(());
        };

        match game.state {
            GameState::Finished => {
                debug!(connection_id, %game_id, "disconnect ignored: game finished");
                return Ok(());
            }
            GameState::Pending => {
                self.store.delete_player(connection_id.to_string()).await?;
                info!(connection_id, %game_id, "player left the lobby");
            }
            GameState::InProgress => {
                self.update_player_with(connection_id, |current| {
                    current.active.then(|| PlayerEntity {
                        active: false,
                        ..current.clone()
                    })
                })
                .await?;
                info!(connection_id, %game_id, "player left the game");
            }
        }

        let roster = self.roster(game_id).await?;
        self.broadcast_round_summary(&roster).await;

        match game.state {
            GameState::Pending if roster.all_inactive() => self.abandon_lobby(game_id).await,
            GameState::InProgress if roster.all_inactive() => self.finish_abandoned(game_id).await,
            GameState::InProgress => {
                // The leaver may have been the last one the open round was waiting for.
                let Some(current) = self.store.find_game(game_id).await? else {
                    return Ok(());
                };
                if current.state == GameState::InProgress
                    && current.awaiting_answers
                    && roster.all_active_responded(current.round)
                {
                    self.conclude_round(game_id, current.round).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Drop an empty lobby so the next joiner starts a fresh game.
    async fn abandon_lobby(&self, game_id: Uuid) -> Result<(), ServiceError> {
        self.release_pending_slot(game_id).await?;

        // Someone may have joined between the roster read and the release.
        if !self.roster(game_id).await?.is_empty() {
            return self.reopen_lobby(game_id).await;
        }
        self.store.delete_game(game_id).await?;
        info!(%game_id, "deleted abandoned lobby");
        Ok(())
    }

    /// Point the pending slot back at a lobby that refilled after its slot was released.
    ///
    /// When another lobby took the slot meanwhile, this one is started so it
    /// never sits in Pending unreachable by joiners.
    async fn reopen_lobby(&self, game_id: Uuid) -> Result<(), ServiceError> {
        let Some(game) = self
            .store
            .find_game(game_id)
            .await?
            .filter(|game| game.state == GameState::Pending)
        else {
            return Ok(());
        };

        let until_autostart = game.time_until_autostart(self.config.timings.autostart, SystemTime::now());
        let slot = PendingSlotEntity {
            game,
            claimed_at: SystemTime::now(),
        };
        if self.store.claim_pending_slot(slot).await?.is_applied() {
            debug!(%game_id, "lobby refilled; pending slot reclaimed");
            return self.schedule(Task::StartGame(game_id), until_autostart);
        }

        info!(%game_id, "lobby refilled after another took the pending slot; starting it");
        self.start_game(game_id).await
    }
}
