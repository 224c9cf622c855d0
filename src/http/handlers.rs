use super::state::AppState;
use crate::error::VoiceError;
use crate::session::{SessionConfig, SessionOrchestrator};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// BCP 47 language tag override
    pub language: Option<String>,

    /// Voice identifier override
    pub voice: Option<String>,

    /// Continuous-conversation mode override
    pub continuous: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Deserialize)]
pub struct TextInputRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(error: &VoiceError) -> StatusCode {
    match error {
        VoiceError::PermissionDenied => StatusCode::FORBIDDEN,
        VoiceError::Connection(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/sessions/start
/// Create a session and begin listening
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting voice session: {}", session_id);

    // Check if already active
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} is already active", session_id),
                }),
            )
                .into_response();
        }
    }

    let config = SessionConfig {
        session_id: session_id.clone(),
        language: req.language.unwrap_or_else(|| state.defaults.language.clone()),
        voice_id: req.voice.unwrap_or_else(|| state.defaults.voice_id.clone()),
        continuous: req.continuous.unwrap_or(state.defaults.continuous),
        ..state.defaults.clone()
    };

    let orchestrator = Arc::new(SessionOrchestrator::new(
        config,
        &state.capabilities,
        state.telemetry.clone(),
    ));

    let format = orchestrator.negotiated_format().await;

    if let Err(e) = orchestrator.start().await {
        error!("Failed to start session: {}", e);
        return (
            error_status(&e),
            Json(ErrorResponse {
                error: format!("Failed to start session: {}", e),
            }),
        )
            .into_response();
    }

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), orchestrator);
    }

    info!("Voice session started: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id,
            status: "listening".to_string(),
            format: match format.transport {
                crate::audio::TransportKind::RawPcm => "pcm16".to_string(),
                crate::audio::TransportKind::Container(codec) => codec.as_str().to_string(),
            },
            sample_rate: format.sample_rate,
            channels: format.channels,
        }),
    )
        .into_response()
}

/// POST /voice/sessions/:session_id/stop
/// Stop the current turn; the session stays available in continuous mode
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping voice session: {}", session_id);

    let orchestrator = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    let Some(orchestrator) = orchestrator else {
        return session_not_found(&session_id);
    };

    if let Err(e) = orchestrator.stop().await {
        error!("Failed to stop session: {}", e);
        return (
            error_status(&e),
            Json(ErrorResponse {
                error: format!("Failed to stop session: {}", e),
            }),
        )
            .into_response();
    }

    // A non-continuous session is finished after stop.
    if !orchestrator.snapshot().continuous {
        orchestrator.shutdown().await;
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id);
    }

    (
        StatusCode::OK,
        Json(AckResponse {
            session_id,
            status: "stopped".to_string(),
        }),
    )
        .into_response()
}

/// POST /voice/sessions/:session_id/text
/// Submit a text turn, bypassing audio capture
pub async fn text_input(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<TextInputRequest>,
) -> impl IntoResponse {
    let orchestrator = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    let Some(orchestrator) = orchestrator else {
        return session_not_found(&session_id);
    };

    if let Err(e) = orchestrator.process_text(&req.text).await {
        error!("Failed to process text input: {}", e);
        return (
            error_status(&e),
            Json(ErrorResponse {
                error: format!("Failed to process text input: {}", e),
            }),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(AckResponse {
            session_id,
            status: "processing".to_string(),
        }),
    )
        .into_response()
}

/// POST /voice/sessions/:session_id/clear
/// Clear the visible transcript and response
pub async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let orchestrator = {
        let sessions = state.sessions.read().await;
        sessions.get(&session_id).cloned()
    };

    let Some(orchestrator) = orchestrator else {
        return session_not_found(&session_id);
    };

    orchestrator.clear().await;

    (
        StatusCode::OK,
        Json(AckResponse {
            session_id,
            status: "cleared".to_string(),
        }),
    )
        .into_response()
}

/// GET /voice/sessions/:session_id/status
/// Current session snapshot
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(orchestrator) => (StatusCode::OK, Json(orchestrator.snapshot())).into_response(),
        None => session_not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn session_not_found(session_id: &str) -> axum::response::Response {
    error!("Session {} not found", session_id);
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}
