//! HTTP API handlers for menugen-ai
//!
//! REST endpoints for upload, status polling and abort, plus the SSE event
//! stream and the health check.

pub mod health;
pub mod menus;
pub mod sse;

pub use health::health_routes;
pub use menus::menu_routes;
pub use sse::{event_routes, menu_event_stream};
