//! Authoritative in-memory store for every board collection.
//!
//! The repository is a plain synchronous value; [`AppState`](super::AppState)
//! wraps it in a mutex so mutations are applied one at a time in arrival order.

use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::StoredBoard,
    services::visibility::{visible_factions, visible_tokens},
    state::{
        board::{
            FactionStats, FactionStatsPatch, MovableFaction, MoveProposal, MoveProposalDraft,
            ProposalId, Token, TokenDraft, TokenId, TokenPatch,
        },
        session::Role,
    },
};

/// Failures surfaced by proposal operations. Token moves and updates on
/// unknown ids are silent no-ops instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No proposal carries the given id.
    #[error("move proposal `{0}` not found")]
    ProposalNotFound(ProposalId),
    /// No live proposal exists for the token.
    #[error("no pending move proposal for token `{0}`")]
    NoProposalForToken(TokenId),
}

/// Result of a token update, carrying the visibility before the merge so the
/// broadcast layer can detect visible → hidden transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    /// Token after the merge.
    pub token: Token,
    /// `visible_to_players` before the merge.
    pub was_visible: bool,
}

/// Result of a faction stats upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactionUpsert {
    /// Record after the upsert.
    pub stats: FactionStats,
    /// `is_visible` before the merge, `None` when the record was created.
    pub was_visible: Option<bool>,
}

/// Result of creating a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalCreated {
    /// The new live proposal.
    pub proposal: MoveProposal,
    /// Proposal for the same token that the new one replaced.
    pub superseded: Option<MoveProposal>,
}

/// Result of approving a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalApproved {
    /// The proposal that was consumed.
    pub proposal: MoveProposal,
    /// The moved token, `None` when it was removed before approval.
    pub token: Option<Token>,
}

/// Role-filtered copy of the whole board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    /// Visible tokens in placement order.
    pub tokens: Vec<Token>,
    /// Visible faction stats.
    pub faction_stats: Vec<FactionStats>,
    /// Every pending proposal.
    pub move_proposals: Vec<MoveProposal>,
    /// Movable factions list.
    pub movable_factions: Vec<MovableFaction>,
}

/// Owner of the tokens, faction stats, move proposals and movable factions.
#[derive(Debug)]
pub struct Repository {
    tokens: IndexMap<TokenId, Token>,
    factions: IndexMap<String, FactionStats>,
    proposals: IndexMap<ProposalId, MoveProposal>,
    movable_factions: Vec<MovableFaction>,
    next_token_id: TokenId,
    next_faction_id: i64,
    next_proposal_id: ProposalId,
    touched: bool,
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository {
    /// Empty repository; the first token gets id 1.
    pub fn new() -> Self {
        Self {
            tokens: IndexMap::new(),
            factions: IndexMap::new(),
            proposals: IndexMap::new(),
            movable_factions: Vec::new(),
            next_token_id: 1,
            next_faction_id: 1,
            next_proposal_id: 1,
            touched: false,
        }
    }

    /// True until the first mutation (or restore) is applied.
    pub fn is_pristine(&self) -> bool {
        !self.touched
    }

    /// Replace the whole content with what the record store holds. Counters
    /// resume after the highest persisted ids so ids are never reused.
    pub fn restore(&mut self, stored: StoredBoard) {
        self.tokens = stored
            .tokens
            .into_iter()
            .map(|entity| (entity.id, Token::from(entity)))
            .collect();
        self.factions = stored
            .faction_stats
            .into_iter()
            .map(|entity| (entity.faction_name.clone(), FactionStats::from(entity)))
            .collect();

        self.proposals = IndexMap::new();
        for proposal in stored.move_proposals.into_iter().map(MoveProposal::from) {
            // Enforce one proposal per token even if the store did not.
            self.proposals
                .retain(|_, existing| existing.token_id != proposal.token_id);
            self.proposals.insert(proposal.id, proposal);
        }

        self.movable_factions = stored
            .movable_factions
            .into_iter()
            .map(Into::into)
            .collect();

        self.next_token_id = self.tokens.keys().max().map_or(1, |max| max + 1);
        self.next_faction_id = self
            .factions
            .values()
            .map(|stats| stats.id)
            .max()
            .map_or(1, |max| max + 1);
        self.next_proposal_id = self.proposals.keys().max().map_or(1, |max| max + 1);
        self.touched = true;
    }

    /// Move every counter past the highest id in `stored` without touching
    /// the live content. Used when the board changed before a restore.
    pub fn reserve_ids(&mut self, stored: &StoredBoard) {
        if let Some(max) = stored.tokens.iter().map(|token| token.id).max() {
            self.next_token_id = self.next_token_id.max(max + 1);
        }
        if let Some(max) = stored.faction_stats.iter().map(|stats| stats.id).max() {
            self.next_faction_id = self.next_faction_id.max(max + 1);
        }
        if let Some(max) = stored.move_proposals.iter().map(|proposal| proposal.id).max() {
            self.next_proposal_id = self.next_proposal_id.max(max + 1);
        }
    }

    /// All tokens in placement order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    /// Look up a token.
    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(&id)
    }

    /// All faction stats in creation order.
    pub fn faction_stats(&self) -> impl Iterator<Item = &FactionStats> {
        self.factions.values()
    }

    /// Look up faction stats by name.
    pub fn faction(&self, name: &str) -> Option<&FactionStats> {
        self.factions.get(name)
    }

    /// All live proposals in creation order.
    pub fn move_proposals(&self) -> impl Iterator<Item = &MoveProposal> {
        self.proposals.values()
    }

    /// Live proposal for a token, if any.
    pub fn proposal_for_token(&self, token_id: TokenId) -> Option<&MoveProposal> {
        self.proposals
            .values()
            .find(|proposal| proposal.token_id == token_id)
    }

    /// Current movable factions configuration.
    pub fn movable_factions(&self) -> &[MovableFaction] {
        &self.movable_factions
    }

    /// Copy of the board as a session with `role` may see it.
    pub fn snapshot(&self, role: Role) -> BoardSnapshot {
        BoardSnapshot {
            tokens: visible_tokens(role, self.tokens.values()),
            faction_stats: visible_factions(role, self.factions.values()),
            move_proposals: self.proposals.values().cloned().collect(),
            movable_factions: self.movable_factions.clone(),
        }
    }

    /// Place a new token with the next id, defaulting every absent field.
    pub fn place_token(&mut self, draft: TokenDraft, owner: Option<Uuid>) -> Token {
        self.touched = true;
        let id = self.next_token_id;
        self.next_token_id += 1;

        let token = Token::from_draft(id, draft, owner);
        self.tokens.insert(id, token.clone());
        token
    }

    /// Move a token; `None` when the id is unknown.
    pub fn move_token(&mut self, id: TokenId, x: i64, y: i64) -> Option<Token> {
        let token = self.tokens.get_mut(&id)?;
        self.touched = true;
        token.x = x;
        token.y = y;
        Some(token.clone())
    }

    /// Merge a partial update over a token; `None` when the id is unknown.
    pub fn update_token(&mut self, id: TokenId, patch: TokenPatch) -> Option<TokenUpdate> {
        let token = self.tokens.get_mut(&id)?;
        self.touched = true;
        let was_visible = token.visible_to_players;
        token.apply_patch(patch);
        Some(TokenUpdate {
            token: token.clone(),
            was_visible,
        })
    }

    /// Remove a token. Removing an unknown id is not an error.
    pub fn remove_token(&mut self, id: TokenId) -> Option<Token> {
        self.touched = true;
        self.tokens.shift_remove(&id)
    }

    /// Insert or merge faction stats keyed on `faction_name`.
    pub fn upsert_faction_stats(&mut self, patch: FactionStatsPatch) -> FactionUpsert {
        self.touched = true;
        if let Some(existing) = self.factions.get_mut(&patch.faction_name) {
            let was_visible = existing.is_visible;
            existing.apply_patch(patch);
            return FactionUpsert {
                stats: existing.clone(),
                was_visible: Some(was_visible),
            };
        }

        let id = self.next_faction_id;
        self.next_faction_id += 1;
        let stats = FactionStats::from_patch(id, patch);
        self.factions
            .insert(stats.faction_name.clone(), stats.clone());
        FactionUpsert {
            stats,
            was_visible: None,
        }
    }

    /// Remove faction stats by name. Removing an unknown name is not an error.
    pub fn delete_faction_stats(&mut self, name: &str) -> Option<FactionStats> {
        self.touched = true;
        self.factions.shift_remove(name)
    }

    /// Create a proposal, superseding any live proposal for the same token.
    pub fn create_move_proposal(
        &mut self,
        draft: MoveProposalDraft,
        proposed_by: Option<Uuid>,
    ) -> ProposalCreated {
        self.touched = true;
        let superseded = self
            .proposals
            .iter()
            .find(|(_, proposal)| proposal.token_id == draft.token_id)
            .map(|(id, _)| *id)
            .and_then(|id| self.proposals.shift_remove(&id));

        let id = self.next_proposal_id;
        self.next_proposal_id += 1;
        let proposal = MoveProposal {
            id,
            token_id: draft.token_id,
            original_x: draft.original_x,
            original_y: draft.original_y,
            proposed_x: draft.proposed_x,
            proposed_y: draft.proposed_y,
            proposed_by,
        };
        self.proposals.insert(id, proposal.clone());

        ProposalCreated {
            proposal,
            superseded,
        }
    }

    /// Retarget the live proposal for a token.
    pub fn update_move_proposal(
        &mut self,
        token_id: TokenId,
        proposed_x: i64,
        proposed_y: i64,
    ) -> Result<MoveProposal, RepositoryError> {
        let proposal = self
            .proposals
            .values_mut()
            .find(|proposal| proposal.token_id == token_id)
            .ok_or(RepositoryError::NoProposalForToken(token_id))?;
        self.touched = true;
        proposal.proposed_x = proposed_x;
        proposal.proposed_y = proposed_y;
        Ok(proposal.clone())
    }

    /// Apply a proposal to its token (if the token still exists) and consume it.
    pub fn approve_move_proposal(
        &mut self,
        id: ProposalId,
    ) -> Result<ProposalApproved, RepositoryError> {
        let proposal = self
            .proposals
            .shift_remove(&id)
            .ok_or(RepositoryError::ProposalNotFound(id))?;
        self.touched = true;

        let token = self.tokens.get_mut(&proposal.token_id).map(|token| {
            token.x = proposal.proposed_x;
            token.y = proposal.proposed_y;
            token.clone()
        });

        Ok(ProposalApproved { proposal, token })
    }

    /// Drop a proposal without touching its token.
    pub fn reject_move_proposal(&mut self, id: ProposalId) -> Result<MoveProposal, RepositoryError> {
        let proposal = self
            .proposals
            .shift_remove(&id)
            .ok_or(RepositoryError::ProposalNotFound(id))?;
        self.touched = true;
        Ok(proposal)
    }

    /// Same effect as [`Self::reject_move_proposal`], invoked by players.
    pub fn cancel_move_proposal(&mut self, id: ProposalId) -> Result<MoveProposal, RepositoryError> {
        self.reject_move_proposal(id)
    }

    /// Drop every proposal, returning how many were live.
    pub fn clear_all_proposals(&mut self) -> usize {
        self.touched = true;
        let count = self.proposals.len();
        self.proposals.clear();
        count
    }

    /// Replace the movable factions configuration wholesale.
    pub fn replace_movable_factions(&mut self, list: Vec<MovableFaction>) -> Vec<MovableFaction> {
        self.touched = true;
        self.movable_factions = list;
        self.movable_factions.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{MoveProposalEntity, TokenEntity};

    fn named(name: &str) -> TokenDraft {
        TokenDraft {
            name: Some(name.into()),
            ..TokenDraft::default()
        }
    }

    fn proposal(token_id: TokenId, x: i64, y: i64) -> MoveProposalDraft {
        MoveProposalDraft {
            token_id,
            original_x: 0,
            original_y: 0,
            proposed_x: x,
            proposed_y: y,
        }
    }

    fn faction(name: &str) -> FactionStatsPatch {
        FactionStatsPatch {
            faction_name: name.into(),
            ..FactionStatsPatch::default()
        }
    }

    #[test]
    fn token_ids_are_never_reused() {
        let mut repo = Repository::new();
        let first = repo.place_token(named("a"), None);
        let second = repo.place_token(named("b"), None);
        repo.remove_token(second.id);
        let third = repo.place_token(named("c"), None);

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(third.id, 3);
    }

    #[test]
    fn move_and_update_on_unknown_token_are_noops() {
        let mut repo = Repository::new();
        assert!(repo.move_token(9, 1, 1).is_none());
        assert!(repo.update_token(9, TokenPatch::default()).is_none());
        assert_eq!(repo.tokens().count(), 0);
    }

    #[test]
    fn update_reports_previous_visibility() {
        let mut repo = Repository::new();
        let token = repo.place_token(named("Orc"), None);
        let update = repo
            .update_token(
                token.id,
                TokenPatch {
                    visible_to_players: Some(false),
                    ..TokenPatch::default()
                },
            )
            .unwrap();
        assert!(update.was_visible);
        assert!(!update.token.visible_to_players);
        assert_eq!(update.token.name, "Orc");
    }

    #[test]
    fn remove_is_idempotent() {
        let mut repo = Repository::new();
        let token = repo.place_token(named("a"), None);
        assert!(repo.remove_token(token.id).is_some());
        assert!(repo.remove_token(token.id).is_none());
    }

    #[test]
    fn faction_upsert_merges_by_name() {
        let mut repo = Repository::new();
        let created = repo.upsert_faction_stats(FactionStatsPatch {
            force_stat: Some(3),
            ..faction("Crows")
        });
        assert_eq!(created.was_visible, None);
        assert!(!created.stats.is_visible);

        let merged = repo.upsert_faction_stats(FactionStatsPatch {
            wealth_stat: Some(5),
            is_visible: Some(true),
            ..faction("Crows")
        });
        assert_eq!(merged.was_visible, Some(false));
        assert_eq!(merged.stats.id, created.stats.id);
        assert_eq!(merged.stats.force_stat, 3);
        assert_eq!(merged.stats.wealth_stat, 5);
        assert_eq!(repo.faction_stats().count(), 1);

        assert!(repo.delete_faction_stats("Crows").is_some());
        assert!(repo.delete_faction_stats("Crows").is_none());
    }

    #[test]
    fn second_proposal_supersedes_first() {
        let mut repo = Repository::new();
        let first = repo.create_move_proposal(proposal(5, 10, 10), None);
        let second = repo.create_move_proposal(proposal(5, 40, 60), None);

        assert_eq!(second.superseded, Some(first.proposal.clone()));
        let live: Vec<_> = repo
            .move_proposals()
            .filter(|proposal| proposal.token_id == 5)
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!((live[0].proposed_x, live[0].proposed_y), (40, 60));
        assert_ne!(live[0].id, first.proposal.id);
    }

    #[test]
    fn update_proposal_requires_live_proposal() {
        let mut repo = Repository::new();
        assert_eq!(
            repo.update_move_proposal(1, 5, 5),
            Err(RepositoryError::NoProposalForToken(1))
        );

        repo.create_move_proposal(proposal(1, 2, 2), None);
        let updated = repo.update_move_proposal(1, 7, 8).unwrap();
        assert_eq!((updated.proposed_x, updated.proposed_y), (7, 8));
    }

    #[test]
    fn approval_moves_token_and_consumes_proposal() {
        let mut repo = Repository::new();
        let token = repo.place_token(named("Orc"), None);
        let created = repo.create_move_proposal(proposal(token.id, 50, 70), None);

        let approved = repo.approve_move_proposal(created.proposal.id).unwrap();
        let moved = approved.token.unwrap();
        assert_eq!((moved.x, moved.y), (50, 70));
        assert_eq!(repo.token(token.id).map(|t| (t.x, t.y)), Some((50, 70)));
        assert_eq!(repo.move_proposals().count(), 0);
    }

    #[test]
    fn approval_of_orphaned_proposal_still_consumes_it() {
        let mut repo = Repository::new();
        let token = repo.place_token(named("Orc"), None);
        let created = repo.create_move_proposal(proposal(token.id, 50, 70), None);
        repo.remove_token(token.id);

        let approved = repo.approve_move_proposal(created.proposal.id).unwrap();
        assert!(approved.token.is_none());
        assert_eq!(repo.move_proposals().count(), 0);
        assert_eq!(
            repo.approve_move_proposal(created.proposal.id),
            Err(RepositoryError::ProposalNotFound(created.proposal.id))
        );
    }

    #[test]
    fn reject_and_cancel_leave_token_untouched() {
        let mut repo = Repository::new();
        let token = repo.place_token(named("Orc"), None);
        let a = repo.create_move_proposal(proposal(token.id, 50, 50), None);
        repo.reject_move_proposal(a.proposal.id).unwrap();
        let b = repo.create_move_proposal(proposal(token.id, 60, 60), None);
        repo.cancel_move_proposal(b.proposal.id).unwrap();

        assert_eq!(repo.token(token.id).map(|t| (t.x, t.y)), Some((0, 0)));
        assert_eq!(
            repo.cancel_move_proposal(b.proposal.id),
            Err(RepositoryError::ProposalNotFound(b.proposal.id))
        );
    }

    #[test]
    fn clear_all_and_replace_config() {
        let mut repo = Repository::new();
        repo.create_move_proposal(proposal(1, 1, 1), None);
        repo.create_move_proposal(proposal(2, 1, 1), None);
        assert_eq!(repo.clear_all_proposals(), 2);
        assert_eq!(repo.move_proposals().count(), 0);

        repo.replace_movable_factions(vec![MovableFaction {
            faction_name: "Crows".into(),
            is_movable: true,
        }]);
        let replaced = repo.replace_movable_factions(vec![MovableFaction {
            faction_name: "Wolves".into(),
            is_movable: false,
        }]);
        assert_eq!(replaced.len(), 1);
        assert_eq!(repo.movable_factions()[0].faction_name, "Wolves");
    }

    #[test]
    fn snapshot_filters_by_role() {
        let mut repo = Repository::new();
        repo.place_token(named("seen"), None);
        repo.place_token(
            TokenDraft {
                visible_to_players: Some(false),
                ..named("hidden")
            },
            None,
        );
        repo.upsert_faction_stats(faction("secret"));
        repo.upsert_faction_stats(FactionStatsPatch {
            is_visible: Some(true),
            ..faction("known")
        });

        let player = repo.snapshot(Role::Player);
        assert_eq!(player.tokens.len(), 1);
        assert_eq!(player.tokens[0].name, "seen");
        assert_eq!(player.faction_stats.len(), 1);
        assert_eq!(player.faction_stats[0].faction_name, "known");

        let dm = repo.snapshot(Role::Dm);
        assert_eq!(dm.tokens.len(), 2);
        assert_eq!(dm.faction_stats.len(), 2);
    }

    #[test]
    fn restore_resumes_counters_and_dedupes_proposals() {
        let mut repo = Repository::new();
        assert!(repo.is_pristine());

        let token = TokenEntity {
            id: 41,
            x: 1,
            y: 2,
            name: "Old".into(),
            faction: String::new(),
            hp: 0,
            max_hp: 0,
            current_hp: 0,
            attack: String::new(),
            counterattack: String::new(),
            special: String::new(),
            notes: String::new(),
            color: "#00ff00".into(),
            owner: None,
            visible_to_players: true,
            created_at: SystemTime::UNIX_EPOCH,
        };
        let stale = MoveProposalEntity {
            id: 3,
            token_id: 41,
            original_x: 1,
            original_y: 2,
            proposed_x: 3,
            proposed_y: 4,
            proposed_by: None,
        };
        let fresh = MoveProposalEntity { id: 8, ..stale.clone() };

        repo.restore(StoredBoard {
            tokens: vec![token],
            move_proposals: vec![stale, fresh],
            ..StoredBoard::default()
        });

        assert!(!repo.is_pristine());
        assert_eq!(repo.move_proposals().count(), 1);
        assert_eq!(repo.proposal_for_token(41).map(|p| p.id), Some(8));
        assert_eq!(repo.place_token(named("new"), None).id, 42);
        assert_eq!(repo.create_move_proposal(proposal(1, 0, 0), None).proposal.id, 9);
    }

    #[test]
    fn reserve_ids_skips_persisted_ids_but_keeps_live_content() {
        let mut repo = Repository::new();
        assert_eq!(repo.place_token(named("live"), None).id, 1);

        let stored = MoveProposalEntity {
            id: 6,
            token_id: 5,
            original_x: 0,
            original_y: 0,
            proposed_x: 1,
            proposed_y: 1,
            proposed_by: None,
        };
        let mut board = StoredBoard {
            move_proposals: vec![stored],
            ..StoredBoard::default()
        };
        board.tokens = (1..=5)
            .map(|id| TokenEntity {
                id,
                x: 0,
                y: 0,
                name: format!("stored {id}"),
                faction: String::new(),
                hp: 0,
                max_hp: 0,
                current_hp: 0,
                attack: String::new(),
                counterattack: String::new(),
                special: String::new(),
                notes: String::new(),
                color: "#00ff00".into(),
                owner: None,
                visible_to_players: true,
                created_at: SystemTime::UNIX_EPOCH,
            })
            .collect();

        repo.reserve_ids(&board);

        assert_eq!(repo.tokens().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["live"]);
        assert_eq!(repo.place_token(named("next"), None).id, 6);
        assert_eq!(repo.create_move_proposal(proposal(1, 0, 0), None).proposal.id, 7);

        // Never moves a counter backwards.
        repo.reserve_ids(&StoredBoard::default());
        assert_eq!(repo.place_token(named("after"), None).id, 7);
    }
}
