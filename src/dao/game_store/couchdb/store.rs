use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, json};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{GameEntity, PendingSlotEntity, PlayerEntity},
    storage::{Conditional, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchGameDocument, CouchPendingDocument, CouchPlayerDocument, DocumentRef, FindResponse,
        PENDING_DOC_ID, RevisionOnly, expired_selector, game_doc_id, player_doc_id,
        players_of_game_selector,
    },
};

const FIND: &str = "_find";
const FIND_PAGE_SIZE: usize = 500;
const DELETE_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct CouchGameStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

/// Outcome of a write that CouchDB may reject with `409 Conflict`.
enum WriteOutcome {
    Written,
    Conflict,
}

impl CouchGameStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::Client { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .credentials
            .map(|creds| (Arc::<str>::from(creds.username), Arc::<str>::from(creds.password)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Bootstrap {
                database: database.clone(),
                step: "lookup",
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::Bootstrap {
                        database: database.clone(),
                        step: "creation",
                        source,
                    })?;
                // 412: created concurrently by another instance.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::BootstrapStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::BootstrapStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                target: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::UnreadableBody {
                        target: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::UnexpectedStatus {
                target: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document. Without `_rev` this only creates; with `_rev` it only
    /// replaces that exact revision.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<WriteOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                target: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            status if status.is_success() => Ok(WriteOutcome::Written),
            other => Err(CouchDaoError::UnexpectedStatus {
                target: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn delete_revision(&self, doc_id: &str, rev: &str) -> CouchResult<WriteOutcome> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::Unreachable {
                target: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::NOT_FOUND => Ok(WriteOutcome::Conflict),
            status if status.is_success() => Ok(WriteOutcome::Written),
            other => Err(CouchDaoError::UnexpectedStatus {
                target: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Delete whatever revision is current; absent documents are fine.
    async fn delete_document(&self, doc_id: &str) -> CouchResult<()> {
        for _ in 0..DELETE_ATTEMPTS {
            let Some(current) = self.get_document::<RevisionOnly>(doc_id).await? else {
                return Ok(());
            };
            if let WriteOutcome::Written = self.delete_revision(doc_id, &current.rev).await? {
                return Ok(());
            }
        }
        Err(CouchDaoError::DeleteContended {
            target: doc_id.to_string(),
        })
    }

    /// Create-if-absent.
    async fn insert<T>(&self, doc_id: &str, document: &T) -> CouchResult<bool>
    where
        T: Serialize,
    {
        Ok(matches!(
            self.put_document(doc_id, document).await?,
            WriteOutcome::Written
        ))
    }

    /// Run a Mango query, following bookmarks until every match is read.
    async fn find_documents<T>(&self, selector: Value) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut documents = Vec::new();
        let mut bookmark: Option<String> = None;

        loop {
            let mut body = json!({ "selector": selector, "limit": FIND_PAGE_SIZE });
            if let Some(ref mark) = bookmark {
                body["bookmark"] = Value::String(mark.clone());
            }

            let response = self
                .request(Method::POST, FIND)
                .json(&body)
                .send()
                .await
                .map_err(|source| CouchDaoError::Unreachable {
                    target: FIND.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(CouchDaoError::UnexpectedStatus {
                    target: FIND.to_string(),
                    status: response.status(),
                });
            }
            let page = response.json::<FindResponse>().await.map_err(|source| {
                CouchDaoError::UnreadableBody {
                    target: FIND.to_string(),
                    source,
                }
            })?;

            let page_len = page.docs.len();
            for doc in page.docs {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::UnexpectedDocument {
                    target: FIND.to_string(),
                    source,
                })?;
                documents.push(parsed);
            }

            if page_len < FIND_PAGE_SIZE || page.bookmark.is_none() {
                return Ok(documents);
            }
            bookmark = page.bookmark;
        }
    }

    async fn replace_game(&self, mut game: GameEntity) -> CouchResult<Conditional<GameEntity>> {
        let doc_id = game_doc_id(game.id);
        let Some(stored) = self.get_document::<CouchGameDocument>(&doc_id).await? else {
            return Ok(Conditional::ConditionFailed);
        };
        if stored.body.version != game.version {
            return Ok(Conditional::ConditionFailed);
        }

        game.version += 1;
        let document = CouchGameDocument::from_entity(game.clone(), stored.rev);
        Ok(match self.put_document(&doc_id, &document).await? {
            WriteOutcome::Written => Conditional::Applied(game),
            WriteOutcome::Conflict => Conditional::ConditionFailed,
        })
    }

    async fn replace_player(
        &self,
        mut player: PlayerEntity,
    ) -> CouchResult<Conditional<PlayerEntity>> {
        let doc_id = player_doc_id(&player.connection_id);
        let Some(stored) = self.get_document::<CouchPlayerDocument>(&doc_id).await? else {
            return Ok(Conditional::ConditionFailed);
        };
        if stored.body.version != player.version {
            return Ok(Conditional::ConditionFailed);
        }

        player.version += 1;
        let document = CouchPlayerDocument::from_entity(player.clone(), stored.rev);
        Ok(match self.put_document(&doc_id, &document).await? {
            WriteOutcome::Written => Conditional::Applied(player),
            WriteOutcome::Conflict => Conditional::ConditionFailed,
        })
    }

    async fn remove_pending_slot(&self, game_id: Uuid) -> CouchResult<Conditional<()>> {
        let Some(slot) = self
            .get_document::<CouchPendingDocument>(PENDING_DOC_ID)
            .await?
        else {
            return Ok(Conditional::ConditionFailed);
        };
        let Some(rev) = slot.rev.filter(|_| slot.body.game_id() == game_id) else {
            return Ok(Conditional::ConditionFailed);
        };

        Ok(match self.delete_revision(PENDING_DOC_ID, &rev).await? {
            WriteOutcome::Written => Conditional::Applied(()),
            WriteOutcome::Conflict => Conditional::ConditionFailed,
        })
    }

    async fn purge_expired_documents(&self, now: SystemTime) -> CouchResult<usize> {
        let expired = self
            .find_documents::<DocumentRef>(expired_selector(now))
            .await?;
        let mut removed = 0;
        for doc in expired {
            if let WriteOutcome::Written = self.delete_revision(&doc.id, &doc.rev).await? {
                removed += 1;
            } else {
                debug!(doc_id = %doc.id, "expired document changed before removal");
            }
        }
        Ok(removed)
    }
}

impl GameStore for CouchGameStore {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchGameDocument>(&game_doc_id(id))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn insert_game(
        &self,
        game: GameEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = game_doc_id(game.id);
            let document = CouchGameDocument::from_entity(game.clone(), None);
            Ok(if store.insert(&doc_id, &document).await? {
                Conditional::Applied(game)
            } else {
                Conditional::ConditionFailed
            })
        })
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
        Box::pin(async move {
            store
                .delete_document(&game_doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_player(
        &self,
        connection_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchPlayerDocument>(&player_doc_id(&connection_id))
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn insert_player(
        &self,
        player: PlayerEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = player_doc_id(&player.connection_id);
            let document = CouchPlayerDocument::from_entity(player.clone(), None);
            Ok(if store.insert(&doc_id, &document).await? {
                Conditional::Applied(player)
            } else {
                Conditional::ConditionFailed
            })
        })
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
        Box::pin(async move {
            store
                .delete_document(&player_doc_id(&connection_id))
                .await
                .map_err(Into::into)
        })
    }

    fn list_players(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .find_documents::<CouchPlayerDocument>(players_of_game_selector(game_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.body).collect())
        })
    }

    fn find_pending_slot(&self) -> BoxFuture<'static, StorageResult<Option<PendingSlotEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchPendingDocument>(PENDING_DOC_ID)
                .await?;
            Ok(doc.map(|doc| doc.body))
        })
    }

    fn claim_pending_slot(
        &self,
        slot: PendingSlotEntity,
    ) -> BoxFuture<'static, StorageResult<Conditional<PendingSlotEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchPendingDocument::from_entity(slot.clone());
            Ok(if store.insert(PENDING_DOC_ID, &document).await? {
                Conditional::Applied(slot)
            } else {
                Conditional::ConditionFailed
            })
        })
    }

    fn release_pending_slot(
        &self,
        game_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Conditional<()>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .remove_pending_slot(game_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::Unreachable {
                    target: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::UnexpectedStatus {
                    target: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }

    fn purge_expired(&self, now: SystemTime) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.purge_expired_documents(now).await.map_err(Into::into) })
    }
}
