/// CouchDB backend, one database with prefixed document ids.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// Process-local backend.
pub mod memory;
/// MongoDB backend, one collection per kind.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::{
    models::{
        FactionStatsEntity, MovableFactionEntity, MoveProposalEntity, StoredBoard, TokenEntity,
    },
    storage::StorageResult,
};

/// Durable mirror of the board collections, used for restart recovery.
///
/// Every write is an upsert or delete keyed on the collection's natural key,
/// so replaying the same operation is harmless.
pub trait RecordStore: Send + Sync {
    /// Upsert a token keyed on its id.
    fn save_token(&self, token: TokenEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a token; a missing id is not an error.
    fn delete_token(&self, id: i64) -> BoxFuture<'static, StorageResult<()>>;
    /// Every stored token, ordered by id.
    fn list_tokens(&self) -> BoxFuture<'static, StorageResult<Vec<TokenEntity>>>;

    /// Upsert faction stats keyed on the faction name.
    fn save_faction_stats(&self, stats: FactionStatsEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Delete faction stats by name.
    fn delete_faction_stats(&self, faction_name: String) -> BoxFuture<'static, StorageResult<()>>;
    /// Every stored faction, ordered by id.
    fn list_faction_stats(&self) -> BoxFuture<'static, StorageResult<Vec<FactionStatsEntity>>>;

    /// Upsert keyed on `token_id`: at most one proposal per token.
    fn save_move_proposal(
        &self,
        proposal: MoveProposalEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete the proposal attached to `token_id`.
    fn delete_move_proposal(&self, token_id: i64) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop every stored proposal.
    fn clear_move_proposals(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Every stored proposal, ordered by id.
    fn list_move_proposals(&self) -> BoxFuture<'static, StorageResult<Vec<MoveProposalEntity>>>;

    /// Overwrite the whole movable factions list.
    fn replace_movable_factions(
        &self,
        factions: Vec<MovableFactionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Stored movable factions list, empty when never written.
    fn list_movable_factions(&self)
    -> BoxFuture<'static, StorageResult<Vec<MovableFactionEntity>>>;

    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Read every collection, failing on the first backend error.
pub async fn load_board(store: &dyn RecordStore) -> StorageResult<StoredBoard> {
    Ok(StoredBoard {
        tokens: store.list_tokens().await?,
        faction_stats: store.list_faction_stats().await?,
        move_proposals: store.list_move_proposals().await?,
        movable_factions: store.list_movable_factions().await?,
    })
}
