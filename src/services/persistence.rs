//! Ordered, fire-and-forget mirroring of board mutations into the record store.

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, warn};

use crate::dao::{
    models::{FactionStatsEntity, MovableFactionEntity, MoveProposalEntity, TokenEntity},
    record_store::RecordStore,
    storage::StorageResult,
};

/// Slot holding the installed backend; `None` while degraded.
pub type StoreSlot = Arc<RwLock<Option<Arc<dyn RecordStore>>>>;

/// One write against the record store.
#[derive(Debug)]
pub enum PersistOp {
    /// Upsert a token.
    SaveToken(TokenEntity),
    /// Delete a token by id.
    DeleteToken(i64),
    /// Upsert faction stats.
    SaveFactionStats(FactionStatsEntity),
    /// Delete faction stats by name.
    DeleteFactionStats(String),
    /// Upsert the proposal of a token.
    SaveMoveProposal(MoveProposalEntity),
    /// Keyed on the proposal's token id.
    DeleteMoveProposal(i64),
    /// Drop every proposal.
    ClearMoveProposals,
    /// Overwrite the movable factions list.
    ReplaceMovableFactions(Vec<MovableFactionEntity>),
    /// Resolves once every earlier op has been attempted.
    Flush(oneshot::Sender<()>),
}

impl PersistOp {
    fn label(&self) -> &'static str {
        match self {
            PersistOp::SaveToken(_) => "save_token",
            PersistOp::DeleteToken(_) => "delete_token",
            PersistOp::SaveFactionStats(_) => "save_faction_stats",
            PersistOp::DeleteFactionStats(_) => "delete_faction_stats",
            PersistOp::SaveMoveProposal(_) => "save_move_proposal",
            PersistOp::DeleteMoveProposal(_) => "delete_move_proposal",
            PersistOp::ClearMoveProposals => "clear_move_proposals",
            PersistOp::ReplaceMovableFactions(_) => "replace_movable_factions",
            PersistOp::Flush(_) => "flush",
        }
    }
}

/// Sending half of the queue. Enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistenceQueue {
    /// Create the queue and spawn its worker on the current runtime.
    pub fn spawn(slot: StoreSlot) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, slot));
        Self { tx }
    }

    /// Enqueue a write.
    pub fn push(&self, op: PersistOp) {
        if let Err(err) = self.tx.send(op) {
            warn!(op = err.0.label(), "persistence worker gone; dropping write");
        }
    }

    /// Wait until every write queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.push(PersistOp::Flush(done_tx));
        let _ = done_rx.await;
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<PersistOp>, slot: StoreSlot) {
    while let Some(op) = rx.recv().await {
        if let PersistOp::Flush(done) = op {
            let _ = done.send(());
            continue;
        }

        let store = slot.read().await.clone();
        let Some(store) = store else {
            debug!(op = op.label(), "no record store installed; skipping write");
            continue;
        };

        let label = op.label();
        if let Err(err) = apply(store.as_ref(), op).await {
            warn!(op = label, error = %err, "record store write failed");
        }
    }
}

async fn apply(store: &dyn RecordStore, op: PersistOp) -> StorageResult<()> {
    match op {
        PersistOp::SaveToken(token) => store.save_token(token).await,
        PersistOp::DeleteToken(id) => store.delete_token(id).await,
        PersistOp::SaveFactionStats(stats) => store.save_faction_stats(stats).await,
        PersistOp::DeleteFactionStats(name) => store.delete_faction_stats(name).await,
        PersistOp::SaveMoveProposal(proposal) => store.save_move_proposal(proposal).await,
        PersistOp::DeleteMoveProposal(token_id) => store.delete_move_proposal(token_id).await,
        PersistOp::ClearMoveProposals => store.clear_move_proposals().await,
        PersistOp::ReplaceMovableFactions(list) => store.replace_movable_factions(list).await,
        PersistOp::Flush(done) => {
            let _ = done.send(());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::record_store::memory::MemoryRecordStore;

    fn faction(name: &str) -> FactionStatsEntity {
        FactionStatsEntity {
            id: 1,
            faction_name: name.into(),
            current_hp: 3,
            max_hp: 5,
            force_stat: 1,
            wealth_stat: 1,
            cunning_stat: 1,
            treasure_stat: 0,
            magic_stat: "None".into(),
            is_visible: true,
        }
    }

    #[tokio::test]
    async fn writes_apply_in_order() {
        let memory = MemoryRecordStore::new();
        let slot: StoreSlot = Arc::new(RwLock::new(Some(Arc::new(memory.clone()))));
        let queue = PersistenceQueue::spawn(slot);

        queue.push(PersistOp::SaveFactionStats(faction("Crows")));
        queue.push(PersistOp::DeleteFactionStats("Crows".into()));
        queue.push(PersistOp::SaveFactionStats(faction("Wolves")));
        queue.flush().await;

        let names: Vec<_> = memory
            .list_faction_stats()
            .await
            .unwrap()
            .into_iter()
            .map(|stats| stats.faction_name)
            .collect();
        assert_eq!(names, vec!["Wolves".to_string()]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_worker() {
        let memory = MemoryRecordStore::new();
        let slot: StoreSlot = Arc::new(RwLock::new(Some(Arc::new(memory.clone()))));
        let queue = PersistenceQueue::spawn(slot);

        memory.set_offline(true);
        queue.push(PersistOp::SaveFactionStats(faction("Lost")));
        queue.flush().await;

        memory.set_offline(false);
        queue.push(PersistOp::SaveFactionStats(faction("Kept")));
        queue.flush().await;

        let stats = memory.list_faction_stats().await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].faction_name, "Kept");
    }

    #[tokio::test]
    async fn writes_without_a_store_are_dropped() {
        let slot: StoreSlot = Arc::new(RwLock::new(None));
        let queue = PersistenceQueue::spawn(slot.clone());
        queue.push(PersistOp::ClearMoveProposals);
        queue.flush().await;

        let memory = MemoryRecordStore::new();
        *slot.write().await = Some(Arc::new(memory.clone()));
        queue.push(PersistOp::DeleteToken(1));
        queue.flush().await;
        assert!(memory.list_tokens().await.unwrap().is_empty());
    }
}
