use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::audio::CapabilitySet;
use crate::session::{SessionConfig, SessionOrchestrator};
use crate::telemetry::TelemetrySink;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active voice sessions (session_id → orchestrator)
    pub sessions: Arc<RwLock<HashMap<String, Arc<SessionOrchestrator>>>>,

    /// Session defaults derived from the service configuration
    pub defaults: SessionConfig,

    /// Capabilities detected once at startup
    pub capabilities: Arc<CapabilitySet>,

    /// Optional telemetry sink shared across sessions
    pub telemetry: Option<Arc<TelemetrySink>>,
}

impl AppState {
    pub fn new(
        defaults: SessionConfig,
        capabilities: CapabilitySet,
        telemetry: Option<Arc<TelemetrySink>>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            defaults,
            capabilities: Arc::new(capabilities),
            telemetry,
        }
    }
}
