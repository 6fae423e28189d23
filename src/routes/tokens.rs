use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{dto::ws::TokenDto, error::AppError, services::board_service, state::SharedState};

/// Unauthenticated snapshot endpoints over the token collection.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/tokens", get(list_tokens))
        .route("/api/tokens/{id}", get(get_token))
}

#[utoipa::path(
    get,
    path = "/api/tokens",
    tag = "tokens",
    responses((status = 200, description = "Every token on the board, unfiltered", body = [TokenDto]))
)]
/// Return the full token collection.
pub async fn list_tokens(State(state): State<SharedState>) -> Json<Vec<TokenDto>> {
    Json(board_service::list_tokens(&state).await)
}

#[utoipa::path(
    get,
    path = "/api/tokens/{id}",
    tag = "tokens",
    params(("id" = i64, Path, description = "Token identifier")),
    responses(
        (status = 200, description = "The token", body = TokenDto),
        (status = 404, description = "No such token")
    )
)]
/// Return one token.
pub async fn get_token(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<TokenDto>, AppError> {
    let token = board_service::get_token(&state, id).await?;
    Ok(Json(token))
}
