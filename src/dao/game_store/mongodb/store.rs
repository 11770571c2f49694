use std::{sync::Arc, time::Duration};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoGameDocument, MongoPendingDocument, MongoPlayerDocument, PENDING_SLOT_ID},
};
use crate::dao::{
    game_store::GameStore,
    models::{GameEntity, PendingSlotEntity, PlayerEntity},
    storage::{Conditional, StorageResult},
};

const GAME_COLLECTION_NAME: &str = "games";
const PLAYER_COLLECTION_NAME: &str = "players";
const PENDING_COLLECTION_NAME: &str = "pending";

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Expiry indexes on games and players, plus the roster lookup index.
    async fn ensure_indexes(&self) -> MongoResult<()> {
        let expiry = || {
            IndexModel::builder()
                .keys(doc! { "expires_at": 1 })
                .options(
                    IndexOptions::builder()
                        .name(Some("expires_at_ttl".to_owned()))
                        .expire_after(Some(Duration::ZERO))
                        .build(),
                )
                .build()
        };

        self.games()
            .await
            .create_index(expiry())
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_COLLECTION_NAME,
                index: "expires_at",
                source,
            })?;

        let players = self.players().await;
        players
            .create_index(expiry())
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "expires_at",
                source,
            })?;

        let roster = IndexModel::builder()
            .keys(doc! { "game_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("player_game_idx".to_owned()))
                    .build(),
            )
            .build();
        players
            .create_index(roster)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "game_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn games(&self) -> Collection<MongoGameDocument> {
        self.database().await.collection(GAME_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database().await.collection(PLAYER_COLLECTION_NAME)
    }

    async fn pending(&self) -> Collection<MongoPendingDocument> {
        self.database().await.collection(PENDING_COLLECTION_NAME)
    }

    async fn load_game(&self, id: Uuid) -> MongoResult<Option<GameEntity>> {
        let key = id.to_string();
        let document = self
            .games()
            .await
            .find_one(doc! { "_id": key.as_str() })
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: GAME_COLLECTION_NAME,
                key,
                source,
            })?;
        document.map(GameEntity::try_from).transpose()
    }

    async fn create_game(&self, game: GameEntity) -> MongoResult<Conditional<GameEntity>> {
        let key = game.id.to_string();
        let outcome = self
            .games()
            .await
            .insert_one(MongoGameDocument::from(game.clone()))
            .await;
        insert_outcome(outcome, game, GAME_COLLECTION_NAME, key)
    }

    async fn replace_game(&self, game: GameEntity) -> MongoResult<Conditional<GameEntity>> {
        let key = game.id.to_string();
        let expected = game.version as i64;
        let stored = GameEntity {
            version: game.version + 1,
            ..game
        };
        let result = self
            .games()
            .await
            .replace_one(
                doc! { "_id": key.as_str(), "version": expected },
                MongoGameDocument::from(stored.clone()),
            )
            .await
            .map_err(|source| MongoDaoError::Save {
                collection: GAME_COLLECTION_NAME,
                key,
                source,
            })?;
        Ok(if result.matched_count == 0 {
            Conditional::ConditionFailed
        } else {
            Conditional::Applied(stored)
        })
    }

    async fn remove_game(&self, id: Uuid) -> MongoResult<()> {
        let key = id.to_string();
        self.games()
            .await
            .delete_one(doc! { "_id": key.as_str() })
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: GAME_COLLECTION_NAME,
                key,
                source,
            })?;
        Ok(())
    }

    async fn load_player(&self, connection_id: String) -> MongoResult<Option<PlayerEntity>> {
        let document = self
            .players()
            .await
            .find_one(doc! { "_id": connection_id.as_str() })
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: PLAYER_COLLECTION_NAME,
                key: connection_id,
                source,
            })?;
        document.map(PlayerEntity::try_from).transpose()
    }

    async fn create_player(&self, player: PlayerEntity) -> MongoResult<Conditional<PlayerEntity>> {
        let key = player.connection_id.clone();
        let outcome = self
            .players()
            .await
            .insert_one(MongoPlayerDocument::from(player.clone()))
            .await;
        insert_outcome(outcome, player, PLAYER_COLLECTION_NAME, key)
    }

    async fn replace_player(&self, player: PlayerEntity) -> MongoResult<Conditional<PlayerEntity>> {
        let key = player.connection_id.clone();
        let expected = player.version as i64;
        let stored = PlayerEntity {
            version: player.version + 1,
            ..player
        };
        let result = self
            .players()
            .await
            .replace_one(
                doc! { "_id": key.as_str(), "version": expected },
                MongoPlayerDocument::from(stored.clone()),
            )
            .await
            .map_err(|source| MongoDaoError::Save {
                collection: PLAYER_COLLECTION_NAME,
                key,
                source,
            })?;
        Ok(if result.matched_count == 0 {
            Conditional::ConditionFailed
        } else {
            Conditional::Applied(stored)
        })
    }

    async fn remove_player(&self, connection_id: String) -> MongoResult<()> {
        self.players()
            .await
            .delete_one(doc! { "_id": connection_id.as_str() })
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: PLAYER_COLLECTION_NAME,
                key: connection_id,
                source,
            })?;
        Ok(())
    }

    async fn load_roster(&self, game_id: Uuid) -> MongoResult<Vec<PlayerEntity>> {
        let key = game_id.to_string();
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(doc! { "game_id": key.as_str() })
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: PLAYER_COLLECTION_NAME,
                key: key.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: PLAYER_COLLECTION_NAME,
                key,
                source,
            })?;
        documents.into_iter().map(PlayerEntity::try_from).collect()
    }

    async fn load_pending_slot(&self) -> MongoResult<Option<PendingSlotEntity>> {
        let document = self
            .pending()
            .await
            .find_one(doc! { "_id": PENDING_SLOT_ID })
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: PENDING_COLLECTION_NAME,
                key: PENDING_SLOT_ID.to_owned(),
                source,
            })?;
        document.map(PendingSlotEntity::try_from).transpose()
    }

    async fn create_pending_slot(
        &self,
        slot: PendingSlotEntity,
    ) -> MongoResult<Conditional<PendingSlotEntity>> {
        let outcome = self
            .pending()
            .await
            .insert_one(MongoPendingDocument::from(slot.clone()))
            .await;
        insert_outcome(
            outcome,
            slot,
            PENDING_COLLECTION_NAME,
            PENDING_SLOT_ID.to_owned(),
        )
    }

    async fn remove_pending_slot(&self, game_id: Uuid) -> MongoResult<Conditional<()>> {
        let result = self
            .pending()
            .await
            .delete_one(doc! { "_id": PENDING_SLOT_ID, "game_id": game_id.to_string() })
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: PENDING_COLLECTION_NAME,
                key: PENDING_SLOT_ID.to_owned(),
                source,
            })?;
        Ok(if result.deleted_count == 0 {
            Conditional::ConditionFailed
        } else {
            Conditional::Applied(())
        })
    }
}

/// Map an `insert_one` result, treating a duplicate `_id` as a failed condition.
fn insert_outcome<T, R>(
    outcome: Result<R, MongoError>,
    record: T,
    collection: &'static str,
    key: String,
) -> MongoResult<Conditional<T>> {
    match outcome {
        Ok(_) => Ok(Conditional::Applied(record)),
        Err(err) if is_duplicate_key(&err) => Ok(Conditional::ConditionFailed),
        Err(source) => Err(MongoDaoError::Save {
            collection,
            key,
            source,
        }),
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

impl GameStore for MongoGameStore {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_game(id).await.map_err(Into::into) })
    }

    fn insert_game(
        &self,
        game: GameEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.create_game(game).await.map_err(Into::into) })
    }

    fn update_game(
        &self,
        game: GameEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.replace_game(game).await.map_err(Into::into) })
    }

    fn delete_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.remove_game(id).await.map_err(Into::into) })
    }

    fn find_player(
        &self,
        connection_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_player(connection_id).await.map_err(Into::into) })
    }

    fn insert_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.create_player(player).await.map_err(Into::into) })
    }

    fn update_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.replace_player(player).await.map_err(Into::into) })
    }

    fn delete_player(&self, connection_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.remove_player(connection_id).await.map_err(Into::into) })
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_roster(game_id).await.map_err(Into::into) })
    }

    fn find_pending_slot(&self) -> BoxFuture<'static, StorageResult<Option<PendingSlotEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_pending_slot().await.map_err(Into::into) })
    }

    fn claim_pending_slot(
        &self,
        slot: PendingSlotEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PendingSlotEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.create_pending_slot(slot).await.map_err(Into::into) })
    }

    fn release_pending_slot(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Conditional<()>>> {
        let store = self.clone();
        Box::pin(async move { store.remove_pending_slot(game_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
