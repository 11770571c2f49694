/// Scheduled continuations and the in-process task queue.
pub mod dispatcher;
/// OpenAPI documentation generation.
pub mod documentation;
/// Orchestration handlers and their shared helpers.
pub mod game_service;
/// Health check service.
pub mod health_service;
mod lobby_service;
/// Message fan-out to player connections.
pub mod notifier;
pub mod question;
mod round_service;
/// Answer scoring.
pub mod scoring;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
