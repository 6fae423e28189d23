use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MOVABLE_FACTIONS_DOC_ID, MongoMovableFactionsDocument, MongoTokenDocument},
};
use crate::dao::{
    models::{FactionStatsEntity, MovableFactionEntity, MoveProposalEntity, TokenEntity},
    record_store::RecordStore,
    storage::StorageResult,
};

const TOKENS: &str = "tokens";
const FACTION_STATS: &str = "faction_stats";
const MOVE_PROPOSALS: &str = "move_proposals";
const MOVABLE_FACTIONS: &str = "movable_factions";

/// MongoDB-backed [`RecordStore`], one collection per board collection.
#[derive(Clone)]
pub struct MongoRecordStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    /// Owns the connection pool; swapped together with `database` on reconnect.
    _client: Client,
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
        guard._client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRecordStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState {
                _client: client,
                database,
            }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        self.ensure_unique_index(TOKENS, "id", "token_id_idx").await?;
        self.ensure_unique_index(FACTION_STATS, "faction_name", "faction_name_idx")
            .await?;
        // One live proposal per token, enforced by the store as well.
        self.ensure_unique_index(MOVE_PROPOSALS, "token_id", "proposal_token_idx")
            .await
    }

    async fn ensure_unique_index(
        &self,
        collection: &'static str,
        key: &'static str,
        name: &str,
    ) -> MongoResult<()> {
        let mut keys = Document::new();
        keys.insert(key, 1);
        let index = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(Some(name.to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        self.collection::<Document>(collection)
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection,
                index: key,
                source,
            })?;
        Ok(())
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<T>(name)
    }

    async fn upsert<T>(
        &self,
        collection: &'static str,
        filter: Document,
        key: String,
        document: T,
    ) -> MongoResult<()>
    where
        T: Serialize + Send + Sync,
    {
        self.collection::<T>(collection)
            .await
            .replace_one(filter, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection,
                key,
                source,
            })?;
        Ok(())
    }

    async fn delete_many(
        &self,
        collection: &'static str,
        filter: Document,
        key: String,
    ) -> MongoResult<()> {
        self.collection::<Document>(collection)
            .await
            .delete_many(filter)
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection,
                key,
                source,
            })?;
        Ok(())
    }

    async fn list<T>(&self, collection: &'static str) -> MongoResult<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync + Unpin,
    {
        self.collection::<T>(collection)
            .await
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::List { collection, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::List { collection, source })
    }
}

impl RecordStore for MongoRecordStore {
    fn save_token(&self, token: TokenEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = token.id;
            let document = MongoTokenDocument::from(token);
            store
                .upsert(TOKENS, doc! { "id": id }, id.to_string(), document)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_token(&self, id: i64) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_many(TOKENS, doc! { "id": id }, id.to_string())
                .await
                .map_err(Into::into)
        })
    }

    fn list_tokens(&self) -> BoxFuture<'static, StorageResult<Vec<TokenEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let documents = store.list::<MongoTokenDocument>(TOKENS).await?;
            let mut tokens: Vec<TokenEntity> = documents.into_iter().map(Into::into).collect();
            tokens.sort_by_key(|token| token.id);
            Ok(tokens)
        })
    }

    fn save_faction_stats(
        &self,
        stats: FactionStatsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let name = stats.faction_name.clone();
            store
                .upsert(
                    FACTION_STATS,
                    doc! { "faction_name": name.as_str() },
                    name.clone(),
                    stats,
                )
                .await
                .map_err(Into::into)
        })
    }

    fn delete_faction_stats(&self, faction_name: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_many(
                    FACTION_STATS,
                    doc! { "faction_name": faction_name.as_str() },
                    faction_name.clone(),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_faction_stats(&self) -> BoxFuture<'static, StorageResult<Vec<FactionStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut stats = store.list::<FactionStatsEntity>(FACTION_STATS).await?;
            stats.sort_by_key(|stats| stats.id);
            Ok(stats)
        })
    }

    fn save_move_proposal(
        &self,
        proposal: MoveProposalEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let token_id = proposal.token_id;
            store
                .upsert(
                    MOVE_PROPOSALS,
                    doc! { "token_id": token_id },
                    token_id.to_string(),
                    proposal,
                )
                .await
                .map_err(Into::into)
        })
    }

    fn delete_move_proposal(&self, token_id: i64) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_many(
                    MOVE_PROPOSALS,
                    doc! { "token_id": token_id },
                    token_id.to_string(),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn clear_move_proposals(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_many(MOVE_PROPOSALS, doc! {}, "*".into())
                .await
                .map_err(Into::into)
        })
    }

    fn list_move_proposals(&self) -> BoxFuture<'static, StorageResult<Vec<MoveProposalEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut proposals = store.list::<MoveProposalEntity>(MOVE_PROPOSALS).await?;
            proposals.sort_by_key(|proposal| proposal.id);
            Ok(proposals)
        })
    }

    fn replace_movable_factions(
        &self,
        factions: Vec<MovableFactionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = MongoMovableFactionsDocument {
                id: MOVABLE_FACTIONS_DOC_ID.to_owned(),
                factions,
            };
            store
                .upsert(
                    MOVABLE_FACTIONS,
                    doc! { "_id": MOVABLE_FACTIONS_DOC_ID },
                    MOVABLE_FACTIONS_DOC_ID.to_owned(),
                    document,
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_movable_factions(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<MovableFactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .collection::<MongoMovableFactionsDocument>(MOVABLE_FACTIONS)
                .await
                .find_one(doc! { "_id": MOVABLE_FACTIONS_DOC_ID })
                .await
                .map_err(|source| MongoDaoError::List {
                    collection: MOVABLE_FACTIONS,
                    source,
                })?;
            Ok(document.map(|doc| doc.factions).unwrap_or_default())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
