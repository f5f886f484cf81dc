//! Business services behind the routes.

/// Session fan-out to live connections.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Answer scoring table.
pub mod scoring;
/// Events emitted after session operations.
pub mod session_events;
/// Session lifecycle rules.
pub mod session_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
