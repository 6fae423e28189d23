//! Per-session delivery of board events according to role visibility.

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{
        Empty, FactionDeleted, FactionStatsDto, MovableFactionDto, MoveProposalDto, ProposalRef,
        ServerEvent, TokenDto, TokenMoved, TokenRemoved,
    },
    services::visibility::{faction_visible_to, token_visible_to},
    state::{
        board::{FactionStats, MovableFaction, MoveProposal, ProposalId, Token},
        repository::BoardSnapshot,
        session::Role,
        sessions::SessionRegistry,
    },
};

/// Reply to `authenticate`, sent to the caller only.
pub const AUTH_RESULT: &str = "auth_result";
/// Rejected or malformed action, sent to the caller only.
pub const ERROR: &str = "error";
/// Snapshot of the tokens the session may see.
pub const TOKENS_LOAD: &str = "tokens:load";
/// A token was added to the board.
pub const TOKEN_PLACED: &str = "token:placed";
/// A token changed position.
pub const TOKEN_MOVED: &str = "token:moved";
/// A token changed fields other than position.
pub const TOKEN_UPDATED: &str = "token:updated";
/// A token left the board or the session's view.
pub const TOKEN_REMOVED: &str = "token:removed";
/// Snapshot of the faction stats the session may see.
pub const FACTION_STATS_LOAD: &str = "faction_stats:load";
/// Faction stats were created or changed.
pub const FACTION_STATS_UPDATED: &str = "faction_stats:updated";
/// Faction stats were deleted or hidden.
pub const FACTION_STATS_DELETED: &str = "faction_stats:deleted";
/// Snapshot of pending proposals.
pub const MOVE_PROPOSALS_LOAD: &str = "move_proposals:load";
/// A player proposed a move.
pub const MOVE_PROPOSAL_CREATED: &str = "move_proposal:created";
/// A pending proposal got a new target.
pub const MOVE_PROPOSAL_UPDATED: &str = "move_proposal:updated";
/// The DM accepted a proposal.
pub const MOVE_PROPOSAL_APPROVED: &str = "move_proposal:approved";
/// The DM declined a proposal.
pub const MOVE_PROPOSAL_REJECTED: &str = "move_proposal:rejected";
/// A proposal was withdrawn or superseded.
pub const MOVE_PROPOSAL_CANCELLED: &str = "move_proposal:cancelled";
/// Every pending proposal was dropped.
pub const MOVE_PROPOSALS_CLEARED: &str = "move_proposals:cleared";
/// Snapshot of the movable factions list.
pub const MOVABLE_FACTIONS_LOAD: &str = "movable_factions:load";
/// The movable factions list was replaced.
pub const MOVABLE_FACTIONS_UPDATED: &str = "movable_factions:updated";

/// What a single session gets for one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The entity as created or updated.
    Upsert,
    /// A removal event so the entity leaves the session's view.
    Remove,
    /// Nothing; the session never saw the entity.
    Skip,
}

/// Delivery rule for a token, given whether players could see it before the mutation.
pub fn token_delivery(role: Role, token: &Token, was_visible: bool) -> Delivery {
    if token_visible_to(role, token) {
        Delivery::Upsert
    } else if was_visible {
        Delivery::Remove
    } else {
        Delivery::Skip
    }
}

/// Delivery rule for faction stats; `was_visible` is `None` for a fresh row.
pub fn faction_delivery(role: Role, stats: &FactionStats, was_visible: Option<bool>) -> Delivery {
    if faction_visible_to(role, stats) {
        Delivery::Upsert
    } else if was_visible == Some(true) {
        Delivery::Remove
    } else {
        Delivery::Skip
    }
}

/// Serialize an event, logging instead of failing.
pub fn encode<T>(event: &'static str, payload: &T) -> Option<ServerEvent>
where
    T: ?Sized + Serialize,
{
    ServerEvent::json(event, payload)
        .inspect_err(|err| warn!(event, error = %err, "failed to serialize event"))
        .ok()
}

fn deliver(session: Uuid, tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) {
    if tx.send(Message::Text(event.frame.clone())).is_err() {
        debug!(session = %session, event = event.event, "writer closed; dropping event");
    }
}

/// Deliver `event` to every authenticated session.
pub fn broadcast_all(sessions: &SessionRegistry, event: &ServerEvent) {
    for (id, _, tx) in sessions.recipients() {
        deliver(id, &tx, event);
    }
}

/// Deliver `upsert` or `remove` per session according to `rule`.
pub fn broadcast_filtered(
    sessions: &SessionRegistry,
    rule: impl Fn(Role) -> Delivery,
    upsert: &ServerEvent,
    remove: Option<&ServerEvent>,
) {
    for (id, role, tx) in sessions.recipients() {
        match (rule(role), remove) {
            (Delivery::Upsert, _) => deliver(id, &tx, upsert),
            (Delivery::Remove, Some(remove)) => deliver(id, &tx, remove),
            (Delivery::Remove, None) | (Delivery::Skip, _) => {}
        }
    }
}

/// Queue a single event for one session.
pub fn send_event<T>(sessions: &SessionRegistry, session: Uuid, event: &'static str, payload: &T)
where
    T: ?Sized + Serialize,
{
    if let Some(event) = encode(event, payload) {
        sessions.send_to(session, event.frame);
    }
}

/// Announce a new token to every session allowed to see it.
pub fn token_placed(sessions: &SessionRegistry, token: &Token) {
    let Some(event) = encode(TOKEN_PLACED, &TokenDto::from(token)) else {
        return;
    };
    let visible = token.visible_to_players;
    broadcast_filtered(sessions, |role| token_delivery(role, token, visible), &event, None);
}

/// Announce a position change to every session allowed to see the token.
pub fn token_moved(sessions: &SessionRegistry, token: &Token) {
    let payload = TokenMoved {
        token_id: token.id,
        x: token.x,
        y: token.y,
    };
    let Some(event) = encode(TOKEN_MOVED, &payload) else {
        return;
    };
    let visible = token.visible_to_players;
    broadcast_filtered(sessions, |role| token_delivery(role, token, visible), &event, None);
}

/// A visible-to-hidden update reaches players as `token:removed`.
pub fn token_updated(sessions: &SessionRegistry, token: &Token, was_visible: bool) {
    let (Some(upsert), Some(remove)) = (
        encode(TOKEN_UPDATED, &TokenDto::from(token)),
        encode(TOKEN_REMOVED, &TokenRemoved { id: token.id }),
    ) else {
        return;
    };
    broadcast_filtered(
        sessions,
        |role| token_delivery(role, token, was_visible),
        &upsert,
        Some(&remove),
    );
}

/// Removal goes to everyone, since ids carry nothing secret.
pub fn token_removed(sessions: &SessionRegistry, id: i64) {
    if let Some(event) = encode(TOKEN_REMOVED, &TokenRemoved { id }) {
        broadcast_all(sessions, &event);
    }
}

/// A visible-to-hidden update reaches players as `faction_stats:deleted`.
pub fn faction_stats_updated(
    sessions: &SessionRegistry,
    stats: &FactionStats,
    was_visible: Option<bool>,
) {
    let deleted = FactionDeleted {
        faction_name: stats.faction_name.clone(),
    };
    let (Some(upsert), Some(remove)) = (
        encode(FACTION_STATS_UPDATED, &FactionStatsDto::from(stats)),
        encode(FACTION_STATS_DELETED, &deleted),
    ) else {
        return;
    };
    broadcast_filtered(
        sessions,
        |role| faction_delivery(role, stats, was_visible),
        &upsert,
        Some(&remove),
    );
}

/// Announce a deletion to every session.
pub fn faction_stats_deleted(sessions: &SessionRegistry, faction_name: &str) {
    let payload = FactionDeleted {
        faction_name: faction_name.to_string(),
    };
    if let Some(event) = encode(FACTION_STATS_DELETED, &payload) {
        broadcast_all(sessions, &event);
    }
}

/// Proposals are visible to every authenticated session.
pub fn proposal_created(sessions: &SessionRegistry, proposal: &MoveProposal) {
    if let Some(event) = encode(MOVE_PROPOSAL_CREATED, &MoveProposalDto::from(proposal)) {
        broadcast_all(sessions, &event);
    }
}

/// Announce a retargeted proposal to every session.
pub fn proposal_updated(sessions: &SessionRegistry, proposal: &MoveProposal) {
    if let Some(event) = encode(MOVE_PROPOSAL_UPDATED, &MoveProposalDto::from(proposal)) {
        broadcast_all(sessions, &event);
    }
}

/// Terminal proposal events (`approved`, `rejected`, `cancelled`) carry only the id.
pub fn proposal_closed(sessions: &SessionRegistry, event: &'static str, id: ProposalId) {
    if let Some(event) = encode(event, &ProposalRef { proposal_id: id }) {
        broadcast_all(sessions, &event);
    }
}

/// Announce that every proposal was dropped.
pub fn proposals_cleared(sessions: &SessionRegistry) {
    if let Some(event) = encode(MOVE_PROPOSALS_CLEARED, &Empty {}) {
        broadcast_all(sessions, &event);
    }
}

/// Push the replaced movable factions list to every session.
pub fn movable_factions_updated(sessions: &SessionRegistry, factions: &[MovableFaction]) {
    let payload: Vec<MovableFactionDto> = factions.iter().map(MovableFactionDto::from).collect();
    if let Some(event) = encode(MOVABLE_FACTIONS_UPDATED, &payload) {
        broadcast_all(sessions, &event);
    }
}

/// Push the four `*:load` events making up a role-filtered snapshot.
pub fn send_snapshot(sessions: &SessionRegistry, session: Uuid, snapshot: &BoardSnapshot) {
    let tokens: Vec<TokenDto> = snapshot.tokens.iter().map(TokenDto::from).collect();
    let factions: Vec<FactionStatsDto> = snapshot
        .faction_stats
        .iter()
        .map(FactionStatsDto::from)
        .collect();
    let proposals: Vec<MoveProposalDto> = snapshot
        .move_proposals
        .iter()
        .map(MoveProposalDto::from)
        .collect();
    let movable: Vec<MovableFactionDto> = snapshot
        .movable_factions
        .iter()
        .map(MovableFactionDto::from)
        .collect();

    send_event(sessions, session, TOKENS_LOAD, &tokens);
    send_event(sessions, session, FACTION_STATS_LOAD, &factions);
    send_event(sessions, session, MOVE_PROPOSALS_LOAD, &proposals);
    send_event(sessions, session, MOVABLE_FACTIONS_LOAD, &movable);
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn token(visible: bool) -> Token {
        Token {
            id: 1,
            x: 0,
            y: 0,
            name: "Orc".into(),
            faction: String::new(),
            hp: 0,
            max_hp: 0,
            current_hp: 0,
            attack: String::new(),
            counterattack: String::new(),
            special: String::new(),
            notes: String::new(),
            color: "#ff0000".into(),
            owner: None,
            visible_to_players: visible,
            created_at: SystemTime::now(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            frames.push(text.to_string());
        }
        frames
    }

    #[test]
    fn token_rules() {
        let hidden = token(false);
        let shown = token(true);

        assert_eq!(token_delivery(Role::Dm, &hidden, true), Delivery::Upsert);
        assert_eq!(token_delivery(Role::Player, &hidden, true), Delivery::Remove);
        assert_eq!(token_delivery(Role::Player, &hidden, false), Delivery::Skip);
        assert_eq!(token_delivery(Role::Player, &shown, false), Delivery::Upsert);
    }

    #[test]
    fn hiding_a_token_removes_it_for_players_only() {
        let registry = SessionRegistry::new();
        let (dm_tx, mut dm_rx) = mpsc::unbounded_channel();
        let (player_tx, mut player_rx) = mpsc::unbounded_channel();
        let (dm, player) = (Uuid::new_v4(), Uuid::new_v4());
        registry.register(dm, dm_tx);
        registry.register(player, player_tx);
        registry.update(dm, |s| s.authenticate(Role::Dm));
        registry.update(player, |s| s.authenticate(Role::Player));

        token_updated(&registry, &token(false), true);

        let dm_frames = drain(&mut dm_rx);
        let player_frames = drain(&mut player_rx);
        assert_eq!(dm_frames.len(), 1);
        assert!(dm_frames[0].contains(r#""event":"token:updated""#));
        assert_eq!(player_frames, vec![r#"{"event":"token:removed","data":{"id":1}}"#]);
    }

    #[test]
    fn hidden_placement_skips_players() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = Uuid::new_v4();
        registry.register(player, tx);
        registry.update(player, |s| s.authenticate(Role::Player));

        token_placed(&registry, &token(false));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn unauthenticated_sessions_hear_nothing() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(Uuid::new_v4(), tx);

        token_removed(&registry, 4);
        proposals_cleared(&registry);
        assert!(drain(&mut rx).is_empty());
    }
}
