use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{
        models::StoredBoard,
        record_store::{RecordStore, load_board},
        storage::StorageError,
    },
    services::persistence::PersistOp,
    state::{SharedState, repository::Repository},
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the record store, restore the board once, then keep the shared
/// state in degraded mode whenever the backend is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RecordStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;
    let mut restored = false;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_record_store(store.clone()).await;
                info!("record store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                if !restored {
                    restore_board(&state, store.as_ref()).await;
                    restored = true;
                }

                if !supervise(&state, store.as_ref()).await {
                    warn!("exhausted record store reconnect attempts; staying in degraded mode");
                    state.clear_record_store().await;
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "record store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Load every collection and seed the repository if nothing happened yet.
pub async fn restore_board(state: &SharedState, store: &dyn RecordStore) {
    match load_board(store).await {
        Ok(stored) => {
            let mut repo = state.repository().lock().await;
            if repo.is_pristine() {
                info!(
                    tokens = stored.tokens.len(),
                    faction_stats = stored.faction_stats.len(),
                    move_proposals = stored.move_proposals.len(),
                    "restored board from record store"
                );
                repo.restore(stored);
            } else {
                warn!(
                    "board changed before the record store answered; \
                     keeping the live board and rewriting the store from it"
                );
                repo.reserve_ids(&stored);
                // Queued under the repository lock so later mutations land after.
                for op in resync_ops(&repo, &stored) {
                    state.persist(op);
                }
            }
        }
        Err(err) => warn!(error = %err, "failed to load board from record store"),
    }
}

/// Writes that turn the stored rows into a mirror of the live board.
fn resync_ops(repo: &Repository, stored: &StoredBoard) -> Vec<PersistOp> {
    let mut ops = Vec::new();

    ops.extend(
        stored
            .tokens
            .iter()
            .filter(|token| repo.token(token.id).is_none())
            .map(|token| PersistOp::DeleteToken(token.id)),
    );
    ops.extend(
        repo.tokens()
            .map(|token| PersistOp::SaveToken(token.clone().into())),
    );

    ops.extend(
        stored
            .faction_stats
            .iter()
            .filter(|stats| repo.faction(&stats.faction_name).is_none())
            .map(|stats| PersistOp::DeleteFactionStats(stats.faction_name.clone())),
    );
    ops.extend(
        repo.faction_stats()
            .map(|stats| PersistOp::SaveFactionStats(stats.clone().into())),
    );

    ops.push(PersistOp::ClearMoveProposals);
    ops.extend(
        repo.move_proposals()
            .map(|proposal| PersistOp::SaveMoveProposal(proposal.clone().into())),
    );

    ops.push(PersistOp::ReplaceMovableFactions(
        repo.movable_factions()
            .iter()
            .cloned()
            .map(Into::into)
            .collect(),
    ));
    ops
}

/// Poll health until reconnection gives up. Returns `false` once it does.
async fn supervise(state: &SharedState, store: &dyn RecordStore) -> bool {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("record store healthy again; leaving degraded mode");
                    state.set_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "record store health check failed");
                if !reconnect(state, store).await {
                    return false;
                }
                state.set_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn RecordStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "record store reconnection succeeded");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "record store reconnect first attempt failed; entering degraded mode"
                    );
                    state.set_degraded(true);
                } else {
                    warn!(attempt, error = %err, "record store reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}
