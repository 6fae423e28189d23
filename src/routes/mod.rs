use axum::Router;

use crate::state::SharedState;

/// Swagger UI and OpenAPI JSON.
pub mod docs;
/// Health check endpoint.
pub mod health;
/// Read-only token endpoints.
pub mod tokens;
/// WebSocket upgrade endpoint.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(tokens::router())
        .merge(websocket::router());

    api_router.merge(docs::router()).with_state(state)
}
