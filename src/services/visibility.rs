//! Role-based visibility rules shared by snapshots and broadcasts.
//!
//! Tokens are visible to players unless explicitly hidden, while faction stats
//! stay hidden until the game master reveals them.

use crate::state::{
    board::{FactionStats, Token},
    session::Role,
};

/// Whether a session with `role` may see `token`.
pub fn token_visible_to(role: Role, token: &Token) -> bool {
    match role {
        Role::Dm => true,
        Role::Player => token.visible_to_players,
    }
}

/// Whether a session with `role` may see `stats`.
pub fn faction_visible_to(role: Role, stats: &FactionStats) -> bool {
    match role {
        Role::Dm => true,
        Role::Player => stats.is_visible,
    }
}

/// Tokens a session with `role` may see, in input order.
pub fn visible_tokens<'a>(role: Role, tokens: impl IntoIterator<Item = &'a Token>) -> Vec<Token> {
    tokens
        .into_iter()
        .filter(|token| token_visible_to(role, token))
        .cloned()
        .collect()
}

/// Faction stats a session with `role` may see, in input order.
pub fn visible_factions<'a>(
    role: Role,
    factions: impl IntoIterator<Item = &'a FactionStats>,
) -> Vec<FactionStats> {
    factions
        .into_iter()
        .filter(|stats| faction_visible_to(role, stats))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::board::{FactionStatsPatch, TokenDraft};

    #[test]
    fn tokens_default_visible_factions_default_hidden() {
        let token = Token::from_draft(1, TokenDraft::default(), None);
        let stats = FactionStats::from_patch(
            1,
            FactionStatsPatch {
                faction_name: "Crows".into(),
                ..FactionStatsPatch::default()
            },
        );

        assert!(token_visible_to(Role::Player, &token));
        assert!(!faction_visible_to(Role::Player, &stats));
        assert!(faction_visible_to(Role::Dm, &stats));
    }

    #[test]
    fn dm_sees_hidden_tokens() {
        let hidden = Token::from_draft(
            1,
            TokenDraft {
                visible_to_players: Some(false),
                ..TokenDraft::default()
            },
            None,
        );
        let shown = Token::from_draft(2, TokenDraft::default(), None);
        let all = [hidden, shown];

        assert_eq!(visible_tokens(Role::Dm, &all).len(), 2);
        let player_view = visible_tokens(Role::Player, &all);
        assert_eq!(player_view.len(), 1);
        assert_eq!(player_view[0].id, 2);
    }
}
