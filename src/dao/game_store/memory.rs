//! Process-local store used for single-node deployments and tests.

use std::{sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{GameEntity, PendingSlotEntity, PlayerEntity},
    storage::{Conditional, StorageResult},
};
use crate::state::state_machine::GameState;

const PENDING_SLOT_KEY: &str = "current";

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    games: DashMap<Uuid, GameEntity>,
    players: DashMap<String, PlayerEntity>,
    pending: DashMap<&'static str, PendingSlotEntity>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored games currently in `state`.
    pub fn count_games_in_state(&self, state: GameState) -> usize {
        self.inner
            .games
            .iter()
            .filter(|entry| entry.state == state)
            .count()
    }

    fn put_game_if_absent(&self, game: GameEntity) -> Conditional<GameEntity> {
        match self.inner.games.entry(game.id) {
            Entry::Occupied(_) => Conditional::ConditionFailed,
            Entry::Vacant(slot) => {
                slot.insert(game.clone());
                Conditional::Applied(game)
            }
        }
    }

    fn put_game_if_current(&self, mut game: GameEntity) -> Conditional<GameEntity> {
        match self.inner.games.entry(game.id) {
            Entry::Occupied(mut stored) if stored.get().version == game.version => {
                game.version += 1;
                stored.insert(game.clone());
                Conditional::Applied(game)
            }
            _ => Conditional::ConditionFailed,
        }
    }

    fn put_player_if_absent(&self, player: PlayerEntity) -> Conditional<PlayerEntity> {
        match self.inner.players.entry(player.connection_id.clone()) {
            Entry::Occupied(_) => Conditional::ConditionFailed,
            Entry::Vacant(slot) => {
                slot.insert(player.clone());
                Conditional::Applied(player)
            }
        }
    }

    fn put_player_if_current(&self, mut player: PlayerEntity) -> Conditional<PlayerEntity> {
        match self.inner.players.entry(player.connection_id.clone()) {
            Entry::Occupied(mut stored) if stored.get().version == player.version => {
                player.version += 1;
                stored.insert(player.clone());
                Conditional::Applied(player)
            }
            _ => Conditional::ConditionFailed,
        }
    }

    fn put_slot_if_absent(&self, slot: PendingSlotEntity) -> Conditional<PendingSlotEntity> {
        match self.inner.pending.entry(PENDING_SLOT_KEY) {
            Entry::Occupied(_) => Conditional::ConditionFailed,
            Entry::Vacant(vacant) => {
                vacant.insert(slot.clone());
                Conditional::Applied(slot)
            }
        }
    }

    fn remove_slot_if_owned(&self, game_id: Uuid) -> Conditional<()> {
        match self
            .inner
            .pending
            .remove_if(PENDING_SLOT_KEY, |_, slot| slot.game_id() == game_id)
        {
            Some(_) => Conditional::Applied(()),
            None => Conditional::ConditionFailed,
        }
    }

    fn retain_live(&self, now: SystemTime) -> usize {
        let is_live = |expires_at: Option<SystemTime>| expires_at.is_none_or(|at| at > now);

        let games_before = self.inner.games.len();
        self.inner.games.retain(|_, game| is_live(game.expires_at));
        let players_before = self.inner.players.len();
        self.inner
            .players
            .retain(|_, player| is_live(player.expires_at));

        (games_before - self.inner.games.len()) + (players_before - self.inner.players.len())
    }
}

impl GameStore for MemoryGameStore {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let game = self.inner.games.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(game) })
    }

    fn insert_game(
        &self,
        game: GameEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>> {
        let outcome = self.put_game_if_absent(game);
        Box::pin(async move { Ok(outcome) })
    }

    fn update_game(
        &self,
        game: GameEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>> {
        let outcome = self.put_game_if_current(game);
        Box::pin(async move { Ok(outcome) })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.games.remove(&id);
        Box::pin(async { Ok(()) })
    }

    fn find_player(
        &self,
        connection_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let player = self
            .inner
            .players
            .get(&connection_id)
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(player) })
    }

    fn insert_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>> {
        let outcome = self.put_player_if_absent(player);
        Box::pin(async move { Ok(outcome) })
    }

    fn update_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>> {
        let outcome = self.put_player_if_current(player);
        Box::pin(async move { Ok(outcome) })
    }

    fn delete_player(&self, connection_id: String) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.players.remove(&connection_id);
        Box::pin(async { Ok(()) })
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let players = self
            .inner
            .players
            .iter()
            .filter(|entry| entry.game_id == game_id)
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        Box::pin(async move { Ok(players) })
    }

    fn find_pending_slot(&self) -> BoxFuture<'static, StorageResult<Option<PendingSlotEntity>>> {
        let slot = self
            .inner
            .pending
            .get(PENDING_SLOT_KEY)
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(slot) })
    }

    fn claim_pending_slot(
        &self,
        slot: PendingSlotEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PendingSlotEntity>>> {
        let outcome = self.put_slot_if_absent(slot);
        Box::pin(async move { Ok(outcome) })
    }

    fn release_pending_slot(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Conditional<()>>> {
        let outcome = self.remove_slot_if_owned(game_id);
        Box::pin(async move { Ok(outcome) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn purge_expired(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<usize>> {
        let removed = self.retain_live(now);
        Box::pin(async move { Ok(removed) })
    }
}
