//! HTTP API server for external control (the UI layer)
//!
//! This module provides a REST API for controlling voice sessions:
//! - POST /voice/sessions/start - Create a session and begin listening
//! - POST /voice/sessions/:id/stop - Stop the current turn
//! - POST /voice/sessions/:id/text - Submit a text turn
//! - POST /voice/sessions/:id/clear - Clear transcript and response
//! - GET /voice/sessions/:id/status - Query session state
//! - GET /health - Health check
//!
//! A global keyboard shortcut in the UI maps onto the same start/stop
//! endpoints; there is no separate code path for it.

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
