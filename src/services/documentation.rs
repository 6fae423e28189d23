use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the relay's HTTP surface and wire payloads.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::tokens::list_tokens,
        crate::routes::tokens::get_token,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::TokenDto,
            crate::dto::ws::FactionStatsDto,
            crate::dto::ws::MoveProposalDto,
            crate::dto::ws::MovableFactionDto,
            crate::dto::ws::AuthResult,
            crate::dto::ws::TokenMoved,
            crate::dto::ws::TokenRemoved,
            crate::dto::ws::FactionDeleted,
            crate::dto::ws::ProposalRef,
            crate::dto::ws::ErrorMessage,
            crate::dto::ws::AuthenticatePayload,
            crate::dto::ws::SetRolePayload,
            crate::dto::ws::MoveTokenPayload,
            crate::dto::ws::TokenRef,
            crate::dto::ws::FactionNamePayload,
            crate::dto::ws::UpdateMoveProposalPayload,
            crate::state::board::TokenDraft,
            crate::state::board::FactionStatsPatch,
            crate::state::board::MoveProposalDraft,
            crate::state::board::MovableFaction,
            crate::state::session::Role,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "tokens", description = "Read-only token snapshots"),
        (name = "relay", description = "WebSocket board sessions"),
    )
)]
pub struct ApiDoc;
