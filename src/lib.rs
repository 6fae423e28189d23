//! Library crate for tabletop-relay, exposing modules for binaries and integration tests.

/// File and environment configuration.
pub mod config;
/// Persisted models and record stores.
pub mod dao;
/// Wire payloads for WebSocket and HTTP.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Relay logic behind the routes.
pub mod services;
/// Shared runtime state.
pub mod state;
