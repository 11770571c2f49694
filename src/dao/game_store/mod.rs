#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use crate::dao::models::{GameEntity, PendingSlotEntity, PlayerEntity};
use crate::dao::storage::{Conditional, StorageResult};
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the durable record store holding games, players and the
/// pending-game slot.
///
/// Writes are atomic per record only. `update_*` succeeds when the stored
/// `version` equals the one carried by the argument and returns the record with
/// its version bumped; `insert_*` and `claim_pending_slot` only create absent
/// records. Reads are consistent.
pub trait GameStore: Send + Sync {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    fn insert_game(&self, game: GameEntity)
    -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>>;
    fn update_game(&self, game: GameEntity)
    -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>>;
    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>>;

    fn find_player(
        &self,
        connection_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn insert_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>>;
    fn update_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>>;
    fn delete_player(&self, connection_id: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Consistent scan of every player (active or not) belonging to `game_id`.
    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;

    fn find_pending_slot(&self) -> BoxFuture<'static, StorageResult<Option<PendingSlotEntity>>>;
    fn claim_pending_slot(
        &self,
        slot: PendingSlotEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PendingSlotEntity>>>;
    /// Remove the slot, but only while it still points at `game_id`.
    fn release_pending_slot(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Conditional<()>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Drop records whose `expires_at` lies before `now`, returning how many were removed.
    ///
    /// Backends with native expiry leave this to the database.
    fn purge_expired(&self, _now: SystemTime) -> BoxFuture<'static, StorageResult<usize>> {
        Box::pin(async { Ok(0) })
    }
}
