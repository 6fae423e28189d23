use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role a session works under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Game master: sole mutator of the board.
    Dm,
    /// Viewer that may only propose moves.
    Player,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Dm => "dm",
            Role::Player => "player",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role name that is neither `dm` nor `player`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dm" => Ok(Role::Dm),
            "player" => Ok(Role::Player),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Reasons a `set_role` request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleChangeError {
    /// The session never authenticated.
    #[error("session is not authenticated")]
    NotAuthenticated,
    /// Switching to the game master view requires having proven the DM secret.
    #[error("role `{0}` was not granted to this session")]
    NotGranted(Role),
}

/// Per-connection runtime state. Lives as long as the socket; a reconnecting
/// client starts over unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: Uuid,
    granted: Option<Role>,
    role: Option<Role>,
}

impl Session {
    /// Fresh, unauthenticated session.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            granted: None,
            role: None,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether authentication succeeded on this connection.
    pub fn is_authenticated(&self) -> bool {
        self.granted.is_some()
    }

    /// Working role, if any.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Record a successful authentication for `role`.
    pub fn authenticate(&mut self, role: Role) {
        self.granted = Some(role);
        self.role = Some(role);
    }

    /// Switch the working role. A DM-authenticated session may view as a
    /// player and back; a player session can never become DM this way.
    pub fn set_role(&mut self, role: Role) -> Result<(), RoleChangeError> {
        match (self.granted, role) {
            (None, _) => Err(RoleChangeError::NotAuthenticated),
            (Some(Role::Player), Role::Dm) => Err(RoleChangeError::NotGranted(Role::Dm)),
            (Some(_), role) => {
                self.role = Some(role);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unauthenticated() {
        let session = Session::new(Uuid::new_v4());
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), None);
    }

    #[test]
    fn dm_can_switch_views() {
        let mut session = Session::new(Uuid::new_v4());
        session.authenticate(Role::Dm);
        session.set_role(Role::Player).unwrap();
        assert_eq!(session.role(), Some(Role::Player));
        session.set_role(Role::Dm).unwrap();
        assert_eq!(session.role(), Some(Role::Dm));
    }

    #[test]
    fn player_cannot_escalate() {
        let mut session = Session::new(Uuid::new_v4());
        assert_eq!(
            session.set_role(Role::Player),
            Err(RoleChangeError::NotAuthenticated)
        );
        session.authenticate(Role::Player);
        assert_eq!(
            session.set_role(Role::Dm),
            Err(RoleChangeError::NotGranted(Role::Dm))
        );
        assert_eq!(session.role(), Some(Role::Player));
    }

    #[test]
    fn parses_roles() {
        assert_eq!("dm".parse::<Role>(), Ok(Role::Dm));
        assert_eq!("player".parse::<Role>(), Ok(Role::Player));
        assert_eq!(
            "admin".parse::<Role>(),
            Err(UnknownRole("admin".to_string()))
        );
    }
}
