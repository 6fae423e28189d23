//! Read-only board views for the HTTP surface.

use crate::{dto::ws::TokenDto, error::ServiceError, state::SharedState};

/// Every token, unfiltered. Diagnostic view, not meant for players.
pub async fn list_tokens(state: &SharedState) -> Vec<TokenDto> {
    let repo = state.repository().lock().await;
    repo.tokens().map(TokenDto::from).collect()
}

/// One token by id.
pub async fn get_token(state: &SharedState, id: i64) -> Result<TokenDto, ServiceError> {
    let repo = state.repository().lock().await;
    repo.token(id)
        .map(TokenDto::from)
        .ok_or_else(|| ServiceError::NotFound(format!("token `{id}` not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, board::TokenDraft},
    };

    #[tokio::test]
    async fn hidden_tokens_are_listed() {
        let state = AppState::new(AppConfig::default());
        {
            let mut repo = state.repository().lock().await;
            repo.place_token(
                TokenDraft {
                    visible_to_players: Some(false),
                    ..TokenDraft::default()
                },
                None,
            );
        }

        let tokens = list_tokens(&state).await;
        assert_eq!(tokens.len(), 1);
        assert!(!tokens[0].visible_to_players);
        assert!(get_token(&state, 1).await.is_ok());
        assert!(matches!(
            get_token(&state, 2).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
