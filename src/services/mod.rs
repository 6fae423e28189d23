/// Authentication and the per-action authorization guard.
pub mod auth;
/// Read-only board views for HTTP.
pub mod board_service;
/// Role-aware event fan-out to connected sessions.
pub mod broadcast;
/// Client action handling.
pub mod dispatcher;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Fire-and-forget record store writes.
pub mod persistence;
/// Record store connection, restore and health supervision.
pub mod storage_supervisor;
/// Role-based filtering of tokens and faction stats.
pub mod visibility;
/// WebSocket connection handling.
pub mod websocket_service;
