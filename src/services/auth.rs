//! Authentication and the authorization guard.

use crate::{
    dto::ws::ClientAction,
    error::ServiceError,
    state::session::{Role, Session},
};

/// Predicate an action must satisfy before it reaches the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Anyone, including unauthenticated connections.
    Anyone,
    /// Any authenticated session.
    Authenticated,
    /// Authenticated with the game master role.
    Dm,
    /// Authenticated with the player role.
    Player,
}

/// True iff authentication succeeded on this connection.
pub fn is_authenticated(session: &Session) -> bool {
    session.is_authenticated()
}

/// True iff the session is authenticated and working as game master.
pub fn is_dm(session: &Session) -> bool {
    session.is_authenticated() && session.role() == Some(Role::Dm)
}

/// True iff the session is authenticated and working as a player.
pub fn is_player(session: &Session) -> bool {
    session.is_authenticated() && session.role() == Some(Role::Player)
}

/// Requirement for each client action.
pub fn requirement(action: &ClientAction) -> Requirement {
    match action {
        ClientAction::Authenticate(_) => Requirement::Anyone,
        ClientAction::SetRole(_) | ClientAction::RequestTokens {} => Requirement::Authenticated,
        ClientAction::PlaceToken(_)
        | ClientAction::MoveToken(_)
        | ClientAction::UpdateToken(_)
        | ClientAction::RemoveToken(_)
        | ClientAction::UpdateFactionStats(_)
        | ClientAction::DeleteFactionStats(_)
        | ClientAction::ApproveMoveProposal(_)
        | ClientAction::RejectMoveProposal(_)
        | ClientAction::ClearMoveProposals {}
        | ClientAction::UpdateMovableFactions(_) => Requirement::Dm,
        ClientAction::CreateMoveProposal(_)
        | ClientAction::UpdateMoveProposal(_)
        | ClientAction::CancelMoveProposal(_) => Requirement::Player,
    }
}

/// Check `session` against the action's requirement.
pub fn authorize(session: &Session, action: &ClientAction) -> Result<(), ServiceError> {
    let allowed = match requirement(action) {
        Requirement::Anyone => true,
        Requirement::Authenticated => is_authenticated(session),
        Requirement::Dm => is_dm(session),
        Requirement::Player => is_player(session),
    };

    if allowed {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(action.name().to_string()))
    }
}

/// Validate a role claim and its credential. Only `dm` needs the shared
/// secret; `player` always succeeds.
pub fn verify_credential(role: &str, credential: &str, dm_secret: &str) -> Result<Role, ServiceError> {
    match role.parse::<Role>() {
        Ok(Role::Dm) if constant_time_eq(credential.as_bytes(), dm_secret.as_bytes()) => {
            Ok(Role::Dm)
        }
        Ok(Role::Dm) => Err(ServiceError::Unauthorized("invalid password".into())),
        Ok(Role::Player) => Ok(Role::Player),
        Err(err) => Err(ServiceError::InvalidInput(err.to_string())),
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        dto::ws::{ProposalRef, TokenRef},
        state::board::TokenDraft,
    };

    fn session(role: Option<Role>) -> Session {
        let mut session = Session::new(Uuid::new_v4());
        if let Some(role) = role {
            session.authenticate(role);
        }
        session
    }

    #[test]
    fn credentials() {
        assert_eq!(verify_credential("dm", "secret", "secret").ok(), Some(Role::Dm));
        assert!(verify_credential("dm", "wrong", "secret").is_err());
        assert!(verify_credential("dm", "secre", "secret").is_err());
        assert_eq!(
            verify_credential("player", "", "secret").ok(),
            Some(Role::Player)
        );
        assert!(verify_credential("admin", "secret", "secret").is_err());
    }

    #[test]
    fn guard_table() {
        let anonymous = session(None);
        let player = session(Some(Role::Player));
        let dm = session(Some(Role::Dm));

        let place = ClientAction::PlaceToken(TokenDraft::default());
        assert!(authorize(&dm, &place).is_ok());
        assert!(authorize(&player, &place).is_err());
        assert!(authorize(&anonymous, &place).is_err());

        let remove = ClientAction::RemoveToken(TokenRef { token_id: 1 });
        assert!(authorize(&player, &remove).is_err());

        let cancel = ClientAction::CancelMoveProposal(ProposalRef { proposal_id: 1 });
        assert!(authorize(&player, &cancel).is_ok());
        assert!(authorize(&dm, &cancel).is_err());

        let approve = ClientAction::ApproveMoveProposal(ProposalRef { proposal_id: 1 });
        assert!(authorize(&dm, &approve).is_ok());
        assert!(authorize(&player, &approve).is_err());

        let snapshot = ClientAction::RequestTokens {};
        assert!(authorize(&player, &snapshot).is_ok());
        assert!(authorize(&anonymous, &snapshot).is_err());
    }

    #[test]
    fn rejection_names_the_action() {
        let err = authorize(
            &session(None),
            &ClientAction::PlaceToken(TokenDraft::default()),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unauthorized: token:place");
    }

    #[test]
    fn dm_viewing_as_player_loses_dm_rights() {
        let mut dm = session(Some(Role::Dm));
        dm.set_role(Role::Player).unwrap();
        assert!(!is_dm(&dm));
        assert!(is_player(&dm));
    }
}
