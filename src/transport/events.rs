use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VoiceError;

/// Inbound audio chunk payload. `data` is base64 on the wire; the transport
/// routes it without interpreting the bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioPayload {
    pub data: String,

    /// "pcm16" or a container codec name
    #[serde(default = "default_audio_format")]
    pub format: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl AudioPayload {
    pub fn decode_data(&self) -> Result<Vec<u8>, VoiceError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| VoiceError::Protocol(format!("invalid base64 audio data: {e}")))
    }
}

fn default_audio_format() -> String {
    "pcm16".to_string()
}

fn default_sample_rate() -> u32 {
    24_000
}

fn default_channels() -> u16 {
    1
}

/// The closed set of structured events the remote can send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Session accepted; carries the remote-assigned session id.
    Ready {
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Remote voice-activity detection saw speech begin.
    SpeechStarted,
    /// Remote voice-activity detection saw speech end.
    SpeechStopped,
    /// Streaming transcript; latest partial replaces the previous one.
    PartialAsr { text: String },
    /// Authoritative transcript for the turn.
    FinalAsr { text: String },
    /// Streaming agent response fragment; appended.
    AgentDelta { text: String },
    /// Authoritative agent response for the turn.
    AgentFinal { text: String },
    /// Synthesized audio chunk for playback.
    Audio(AudioPayload),
    /// Remote confirms capture may proceed.
    MicOpened,
    /// Remote requests local capture stop.
    MicClosed,
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    /// Application-level keepalive; answered at the transport layer.
    Ping {
        #[serde(default)]
        payload: Option<Value>,
    },
}

impl ServerEvent {
    /// Synthetic error injected when the connection drops without a local
    /// close. Looks like any other error to the state machine.
    pub fn connection_lost(detail: &str) -> Self {
        ServerEvent::Error {
            message: format!("connection closed unexpectedly: {detail}"),
            code: Some("connection_lost".to_string()),
        }
    }
}

fn is_known_event(kind: &str) -> bool {
    matches!(
        kind,
        "ready"
            | "speech_started"
            | "speech_stopped"
            | "partial_asr"
            | "final_asr"
            | "agent_delta"
            | "agent_final"
            | "audio"
            | "mic_opened"
            | "mic_closed"
            | "error"
            | "ping"
    )
}

/// Parse one inbound text message.
///
/// Unknown event types return `Ok(None)` so newer servers never break this
/// client; malformed JSON or a known type with a bad payload is a protocol
/// error.
pub fn parse_event(raw: &str) -> Result<Option<ServerEvent>, VoiceError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| VoiceError::Protocol(format!("malformed event: {e}")))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| VoiceError::Protocol("event is missing the type field".to_string()))?
        .to_string();

    if !is_known_event(&kind) {
        return Ok(None);
    }

    serde_json::from_value::<ServerEvent>(value)
        .map(Some)
        .map_err(|e| VoiceError::Protocol(format!("bad payload for '{kind}' event: {e}")))
}

/// Recording parameters echoed to the remote on turn start.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingParams {
    pub language: String,
    pub voice: String,
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Outbound control messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    StartRecording { params: RecordingParams },
    StopRecording,
    TextInput { text: String, language: String },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}
