//! Voice session management
//!
//! This module provides the session layer of the voice pipeline:
//! - Turn state machine driven by remote voice-activity events
//! - Session aggregate and point-in-time snapshots
//! - The orchestrator that owns lifecycle and the public control surface

mod config;
mod machine;
mod orchestrator;
mod state;

pub use config::SessionConfig;
pub use machine::{Effect, StateMachine};
pub use orchestrator::SessionOrchestrator;
pub use state::{SessionSnapshot, TurnState};
