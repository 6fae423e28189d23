//! Routes decoded client actions through the guard, the repository, the
//! persistence queue and the broadcast router.

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{MoveProposalEntity, TokenEntity},
    dto::ws::{AuthResult, ClientAction, ErrorMessage},
    error::ServiceError,
    services::{
        auth::{authorize, verify_credential},
        broadcast::{self, AUTH_RESULT, ERROR},
        persistence::PersistOp,
    },
    state::{SharedState, repository::Repository, session::Role},
};

/// Decode and handle one text frame from `session`.
pub async fn handle_text(state: &SharedState, session: Uuid, text: &str) {
    match ClientAction::from_json_str(text) {
        Ok(action) => handle_action(state, session, action).await,
        Err(err) => {
            warn!(session = %session, error = %err, "failed to decode client message");
            reply_error(state, session, &ServiceError::from(err));
        }
    }
}

/// Handle a decoded action. Failures are reported to the acting session only.
pub async fn handle_action(state: &SharedState, session: Uuid, action: ClientAction) {
    let name = action.name();
    if let Err(err) = dispatch(state, session, action).await {
        match &err {
            ServiceError::Unauthorized(_) => {
                info!(session = %session, action = name, "rejected unauthorized action")
            }
            _ => debug!(session = %session, action = name, error = %err, "action failed"),
        }
        reply_error(state, session, &err);
    }
}

fn reply_error(state: &SharedState, session: Uuid, err: &ServiceError) {
    broadcast::send_event(
        state.sessions(),
        session,
        ERROR,
        &ErrorMessage {
            message: err.to_string(),
        },
    );
}

async fn dispatch(
    state: &SharedState,
    session_id: Uuid,
    action: ClientAction,
) -> Result<(), ServiceError> {
    let Some(session) = state.sessions().session(session_id) else {
        debug!(session = %session_id, "action from a closed session ignored");
        return Ok(());
    };
    authorize(&session, &action)?;

    let sessions = state.sessions();
    match action {
        ClientAction::Authenticate(payload) => {
            authenticate(state, session_id, &payload.role, &payload.password).await;
        }
        ClientAction::SetRole(payload) => {
            let role: Role = payload.role.parse()?;
            sessions
                .update(session_id, |session| session.set_role(role))
                .transpose()?;
            info!(session = %session_id, role = %role, "session role changed");
            push_snapshot(state, session_id, role).await;
        }
        ClientAction::RequestTokens {} => {
            if let Some(role) = session.role() {
                push_snapshot(state, session_id, role).await;
            }
        }
        ClientAction::PlaceToken(draft) => {
            let mut repo = state.repository().lock().await;
            let token = repo.place_token(draft, Some(session_id));
            info!(session = %session_id, token = token.id, "token placed");
            state.persist(PersistOp::SaveToken(TokenEntity::from(token.clone())));
            broadcast::token_placed(sessions, &token);
        }
        ClientAction::MoveToken(payload) => {
            let mut repo = state.repository().lock().await;
            let Some(token) = repo.move_token(payload.token_id, payload.x, payload.y) else {
                debug!(token = payload.token_id, "move for unknown token ignored");
                return Ok(());
            };
            state.persist(PersistOp::SaveToken(TokenEntity::from(token.clone())));
            broadcast::token_moved(sessions, &token);
        }
        ClientAction::UpdateToken(payload) => {
            let mut repo = state.repository().lock().await;
            let Some(update) = repo.update_token(payload.id, payload.patch) else {
                debug!(token = payload.id, "update for unknown token ignored");
                return Ok(());
            };
            state.persist(PersistOp::SaveToken(TokenEntity::from(update.token.clone())));
            broadcast::token_updated(sessions, &update.token, update.was_visible);
        }
        ClientAction::RemoveToken(payload) => {
            let mut repo = state.repository().lock().await;
            if repo.remove_token(payload.token_id).is_some() {
                info!(session = %session_id, token = payload.token_id, "token removed");
            }
            state.persist(PersistOp::DeleteToken(payload.token_id));
            broadcast::token_removed(sessions, payload.token_id);
        }
        ClientAction::UpdateFactionStats(patch) => {
            patch.validate()?;
            let mut repo = state.repository().lock().await;
            let upsert = repo.upsert_faction_stats(patch);
            state.persist(PersistOp::SaveFactionStats(upsert.stats.clone().into()));
            broadcast::faction_stats_updated(sessions, &upsert.stats, upsert.was_visible);
        }
        ClientAction::DeleteFactionStats(payload) => {
            let mut repo = state.repository().lock().await;
            repo.delete_faction_stats(&payload.faction_name);
            state.persist(PersistOp::DeleteFactionStats(payload.faction_name.clone()));
            broadcast::faction_stats_deleted(sessions, &payload.faction_name);
        }
        ClientAction::CreateMoveProposal(draft) => {
            let mut repo = state.repository().lock().await;
            let created = repo.create_move_proposal(draft, Some(session_id));
            // The store keys proposals on token id, so the save overwrites any superseded row.
            state.persist(PersistOp::SaveMoveProposal(MoveProposalEntity::from(
                created.proposal.clone(),
            )));
            if let Some(old) = &created.superseded {
                broadcast::proposal_closed(sessions, broadcast::MOVE_PROPOSAL_CANCELLED, old.id);
            }
            broadcast::proposal_created(sessions, &created.proposal);
        }
        ClientAction::UpdateMoveProposal(payload) => {
            let mut repo = state.repository().lock().await;
            let proposal =
                repo.update_move_proposal(payload.token_id, payload.proposed_x, payload.proposed_y)?;
            state.persist(PersistOp::SaveMoveProposal(proposal.clone().into()));
            broadcast::proposal_updated(sessions, &proposal);
        }
        ClientAction::ApproveMoveProposal(payload) => {
            let mut repo = state.repository().lock().await;
            let approved = repo.approve_move_proposal(payload.proposal_id)?;
            info!(
                session = %session_id,
                proposal = approved.proposal.id,
                token = approved.proposal.token_id,
                "move proposal approved"
            );
            state.persist(PersistOp::DeleteMoveProposal(approved.proposal.token_id));
            if let Some(token) = &approved.token {
                state.persist(PersistOp::SaveToken(token.clone().into()));
                broadcast::token_moved(sessions, token);
            }
            broadcast::proposal_closed(
                sessions,
                broadcast::MOVE_PROPOSAL_APPROVED,
                approved.proposal.id,
            );
        }
        ClientAction::RejectMoveProposal(payload) => {
            let mut repo = state.repository().lock().await;
            close_proposal(state, &mut repo, payload.proposal_id, false)?;
        }
        ClientAction::CancelMoveProposal(payload) => {
            let mut repo = state.repository().lock().await;
            close_proposal(state, &mut repo, payload.proposal_id, true)?;
        }
        ClientAction::ClearMoveProposals {} => {
            let mut repo = state.repository().lock().await;
            let cleared = repo.clear_all_proposals();
            info!(session = %session_id, cleared, "move proposals cleared");
            state.persist(PersistOp::ClearMoveProposals);
            broadcast::proposals_cleared(sessions);
        }
        ClientAction::UpdateMovableFactions(list) => {
            let mut repo = state.repository().lock().await;
            let factions = repo.replace_movable_factions(list);
            state.persist(PersistOp::ReplaceMovableFactions(
                factions.iter().cloned().map(Into::into).collect(),
            ));
            broadcast::movable_factions_updated(sessions, &factions);
        }
    }

    Ok(())
}

/// Reject (DM) or cancel (player) a proposal; only the broadcast name differs.
fn close_proposal(
    state: &SharedState,
    repo: &mut Repository,
    id: i64,
    cancelled: bool,
) -> Result<(), ServiceError> {
    let (proposal, event) = if cancelled {
        (
            repo.cancel_move_proposal(id)?,
            broadcast::MOVE_PROPOSAL_CANCELLED,
        )
    } else {
        (
            repo.reject_move_proposal(id)?,
            broadcast::MOVE_PROPOSAL_REJECTED,
        )
    };
    state.persist(PersistOp::DeleteMoveProposal(proposal.token_id));
    broadcast::proposal_closed(state.sessions(), event, proposal.id);
    Ok(())
}

async fn authenticate(state: &SharedState, session_id: Uuid, role: &str, password: &str) {
    let sessions = state.sessions();
    match verify_credential(role, password, &state.config().dm_password) {
        Ok(role) => {
            sessions.update(session_id, |session| session.authenticate(role));
            info!(session = %session_id, role = %role, "session authenticated");
            broadcast::send_event(
                sessions,
                session_id,
                AUTH_RESULT,
                &AuthResult {
                    success: true,
                    role: Some(role),
                    message: None,
                },
            );
            push_snapshot(state, session_id, role).await;
        }
        Err(err) => {
            info!(session = %session_id, requested = role, "authentication failed");
            broadcast::send_event(
                sessions,
                session_id,
                AUTH_RESULT,
                &AuthResult {
                    success: false,
                    role: None,
                    message: Some(err.to_string()),
                },
            );
        }
    }
}

/// Push the board as `role` may see it, read under the repository lock.
async fn push_snapshot(state: &SharedState, session_id: Uuid, role: Role) {
    let repo = state.repository().lock().await;
    let snapshot = repo.snapshot(role);
    broadcast::send_snapshot(state.sessions(), session_id, &snapshot);
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    struct Client {
        id: Uuid,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        fn connect(state: &SharedState) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = Uuid::new_v4();
            state.sessions().register(id, tx);
            Self { id, rx }
        }

        fn frames(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(Message::Text(text)) = self.rx.try_recv() {
                frames.push(serde_json::from_str(text.as_str()).unwrap());
            }
            frames
        }

        fn events(&mut self) -> Vec<String> {
            self.frames()
                .into_iter()
                .map(|frame| frame["event"].as_str().unwrap().to_string())
                .collect()
        }
    }

    fn state() -> SharedState {
        AppState::new(AppConfig {
            dm_password: "secret".into(),
            ..AppConfig::default()
        })
    }

    async fn send(state: &SharedState, client: &Client, text: &str) {
        handle_text(state, client.id, text).await;
    }

    #[tokio::test]
    async fn wrong_dm_password_is_reported() {
        let state = state();
        let mut client = Client::connect(&state);
        send(
            &state,
            &client,
            r#"{"event":"authenticate","data":{"role":"dm","password":"nope"}}"#,
        )
        .await;

        let frames = client.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "auth_result");
        assert_eq!(frames[0]["data"]["success"], false);
        assert!(!state.sessions().session(client.id).unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn authenticate_pushes_the_snapshot() {
        let state = state();
        let mut client = Client::connect(&state);
        send(
            &state,
            &client,
            r#"{"event":"authenticate","data":{"role":"player"}}"#,
        )
        .await;

        assert_eq!(
            client.events(),
            vec![
                "auth_result",
                "tokens:load",
                "faction_stats:load",
                "move_proposals:load",
                "movable_factions:load"
            ]
        );
    }

    #[tokio::test]
    async fn unknown_event_replies_with_error() {
        let state = state();
        let mut client = Client::connect(&state);
        send(&state, &client, r#"{"event":"token:teleport","data":{}}"#).await;

        let frames = client.frames();
        assert_eq!(frames[0]["event"], "error");
    }

    #[tokio::test]
    async fn player_cannot_escalate_to_dm() {
        let state = state();
        let mut client = Client::connect(&state);
        send(
            &state,
            &client,
            r#"{"event":"authenticate","data":{"role":"player"}}"#,
        )
        .await;
        client.frames();

        send(&state, &client, r#"{"event":"set_role","data":{"role":"dm"}}"#).await;
        let frames = client.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "error");
        assert_eq!(
            state.sessions().session(client.id).unwrap().role(),
            Some(Role::Player)
        );
    }

    #[tokio::test]
    async fn faction_stats_without_name_are_rejected() {
        let state = state();
        let mut dm = Client::connect(&state);
        send(
            &state,
            &dm,
            r#"{"event":"authenticate","data":{"role":"dm","password":"secret"}}"#,
        )
        .await;
        dm.frames();

        send(
            &state,
            &dm,
            r#"{"event":"faction_stats:update","data":{"faction_name":""}}"#,
        )
        .await;
        assert_eq!(dm.events(), vec!["error"]);
        assert_eq!(state.repository().lock().await.faction_stats().count(), 0);
    }

    #[tokio::test]
    async fn superseding_a_proposal_announces_the_old_one_closed() {
        let state = state();
        let mut player = Client::connect(&state);
        send(
            &state,
            &player,
            r#"{"event":"authenticate","data":{"role":"player"}}"#,
        )
        .await;
        player.frames();

        let create = r#"{"event":"move_proposal:create","data":{"token_id":5,"original_x":0,"original_y":0,"proposed_x":10,"proposed_y":10}}"#;
        send(&state, &player, create).await;
        send(&state, &player, create).await;

        assert_eq!(
            player.events(),
            vec![
                "move_proposal:created",
                "move_proposal:cancelled",
                "move_proposal:created"
            ]
        );
        assert_eq!(state.repository().lock().await.move_proposals().count(), 1);
    }
}
