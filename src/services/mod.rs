/// Message fan-out with remove-on-failure.
pub mod broadcaster;
/// OpenAPI documentation generation.
pub mod documentation;
/// Fire-and-forget audit event writer.
pub mod event_log;
/// Health check service.
pub mod health_service;
/// Inbound message dispatch.
pub mod router;
/// Fixed-timestep simulation loop.
pub mod scheduler;
/// Role negotiation and match lifecycle.
pub mod session;
/// WebSocket connection and message handling service.
pub mod websocket_service;
