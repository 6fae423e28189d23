//! Process-local record store used for local runs and tests.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::dao::{
    models::{FactionStatsEntity, MovableFactionEntity, MoveProposalEntity, TokenEntity},
    record_store::RecordStore,
    storage::{StorageError, StorageResult},
};

/// In-memory [`RecordStore`]. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    tokens: DashMap<i64, TokenEntity>,
    faction_stats: DashMap<String, FactionStatsEntity>,
    move_proposals: DashMap<i64, MoveProposalEntity>,
    movable_factions: RwLock<Vec<MovableFactionEntity>>,
    offline: AtomicBool,
}

impl MemoryRecordStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                "memory store is offline".into(),
                io::Error::from(io::ErrorKind::NotConnected),
            ))
        } else {
            Ok(())
        }
    }

    fn run<T, F>(&self, work: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryTables) -> T + Send + 'static,
    {
        let store = self.clone();
        Box::pin(async move {
            store.check()?;
            Ok(work(&store.inner))
        })
    }
}

impl RecordStore for MemoryRecordStore {
    fn save_token(&self, token: TokenEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables.tokens.insert(token.id, token);
        })
    }

    fn delete_token(&self, id: i64) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables.tokens.remove(&id);
        })
    }

    fn list_tokens(&self) -> BoxFuture<'static, StorageResult<Vec<TokenEntity>>> {
        self.run(|tables| {
            let mut tokens: Vec<_> = tables
                .tokens
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            tokens.sort_by_key(|token| token.id);
            tokens
        })
    }

    fn save_faction_stats(
        &self,
        stats: FactionStatsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables
                .faction_stats
                .insert(stats.faction_name.clone(), stats);
        })
    }

    fn delete_faction_stats(&self, faction_name: String) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables.faction_stats.remove(&faction_name);
        })
    }

    fn list_faction_stats(&self) -> BoxFuture<'static, StorageResult<Vec<FactionStatsEntity>>> {
        self.run(|tables| {
            let mut stats: Vec<_> = tables
                .faction_stats
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            stats.sort_by_key(|stats| stats.id);
            stats
        })
    }

    fn save_move_proposal(
        &self,
        proposal: MoveProposalEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables.move_proposals.insert(proposal.token_id, proposal);
        })
    }

    fn delete_move_proposal(&self, token_id: i64) -> BoxFuture<'static, StorageResult<()>> {
        self.run(move |tables| {
            tables.move_proposals.remove(&token_id);
        })
    }

    fn clear_move_proposals(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.run(|tables| tables.move_proposals.clear())
    }

    fn list_move_proposals(&self) -> BoxFuture<'static, StorageResult<Vec<MoveProposalEntity>>> {
        self.run(|tables| {
            let mut proposals: Vec<_> = tables
                .move_proposals
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            proposals.sort_by_key(|proposal| proposal.id);
            proposals
        })
    }

    fn replace_movable_factions(
        &self,
        factions: Vec<MovableFactionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check()?;
            *store.inner.movable_factions.write().await = factions;
            Ok(())
        })
    }

    fn list_movable_factions(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<MovableFactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check()?;
            Ok(store.inner.movable_factions.read().await.clone())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.run(|_| ())
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.run(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(id: i64, token_id: i64) -> MoveProposalEntity {
        MoveProposalEntity {
            id,
            token_id,
            original_x: 0,
            original_y: 0,
            proposed_x: 1,
            proposed_y: 1,
            proposed_by: None,
        }
    }

    #[tokio::test]
    async fn one_proposal_row_per_token() {
        let store = MemoryRecordStore::new();
        store.save_move_proposal(proposal(1, 5)).await.unwrap();
        store.save_move_proposal(proposal(2, 5)).await.unwrap();
        store.save_move_proposal(proposal(3, 6)).await.unwrap();

        let rows = store.list_move_proposals().await.unwrap();
        assert_eq!(rows.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);

        store.delete_move_proposal(5).await.unwrap();
        assert_eq!(store.list_move_proposals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryRecordStore::new();
        store.set_offline(true);
        assert!(store.health_check().await.is_err());
        assert!(store.clear_move_proposals().await.is_err());
        assert!(store.list_movable_factions().await.is_err());

        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
