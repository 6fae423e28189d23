use serde::Serialize;
use utoipa::ToSchema;

/// Payload of `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" while the record store is unreachable.
    pub status: String,
    /// Live WebSocket connections, authenticated or not.
    pub sessions: usize,
    /// Tokens on the board.
    pub tokens: usize,
}

impl HealthResponse {
    /// Summarize the current relay state.
    pub fn new(degraded: bool, sessions: usize, tokens: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            sessions,
            tokens,
        }
    }
}
