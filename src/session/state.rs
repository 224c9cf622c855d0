use serde::Serialize;

use crate::transport::ConnectionState;

/// Turn state within one voice session.
///
/// Turn boundaries are owned by the remote voice-activity detection; this
/// side is a reactive projection of remote signals plus local hardware
/// control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::Processing => "processing",
            TurnState::Speaking => "speaking",
        }
    }
}

/// Point-in-time view of a session, served over the status endpoint and
/// pushed to state-change subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub connection_state: ConnectionState,
    pub turn_state: TurnState,
    pub transcript: String,
    pub response: String,
    /// Normalized input level, 0.0..=1.0
    pub audio_level: f32,
    pub permission_granted: bool,
    pub language: String,
    pub voice_id: String,
    pub continuous: bool,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn new(session_id: String, language: String, voice_id: String, continuous: bool) -> Self {
        Self {
            session_id,
            connection_state: ConnectionState::Disconnected,
            turn_state: TurnState::Idle,
            transcript: String::new(),
            response: String::new(),
            audio_level: 0.0,
            permission_granted: false,
            language,
            voice_id,
            continuous,
            last_error: None,
        }
    }
}
