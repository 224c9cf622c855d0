use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Configuration for one voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// WebSocket endpoint of the voice service
    pub endpoint: String,

    /// Bearer token for the upgrade request
    pub token: String,

    /// BCP 47 language tag sent with each turn
    pub language: String,

    /// Voice identifier for synthesis
    pub voice_id: String,

    /// Re-arm listening after each response instead of returning to idle
    pub continuous: bool,

    /// Transport format preference: "auto", "raw", or a container codec name
    pub format_preference: String,

    /// Target capture sample rate (ASR expects 24kHz)
    pub sample_rate: u32,

    /// Number of channels (1 = mono)
    pub channels: u16,

    /// Connection establishment timeout
    pub connect_timeout: Duration,

    /// Container slice cadence in milliseconds
    pub slice_ms: u64,

    /// Target raw-PCM chunk size in bytes
    pub chunk_bytes: usize,

    /// Hard cap on any emitted chunk
    pub chunk_cap_bytes: usize,

    /// Capacity of the capture-to-transport frame queue
    pub frame_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            endpoint: "ws://localhost:8900/voice".to_string(),
            token: String::new(),
            language: "en-US".to_string(),
            voice_id: "default".to_string(),
            continuous: true,
            format_preference: "auto".to_string(),
            sample_rate: 24_000,
            channels: 1,
            connect_timeout: Duration::from_secs(15),
            slice_ms: 50,
            chunk_bytes: 2048,
            chunk_cap_bytes: 4096,
            frame_queue_depth: 64,
        }
    }
}

impl SessionConfig {
    /// Derive session defaults from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.transport.endpoint.clone(),
            token: config.transport.token.clone(),
            language: config.session.language.clone(),
            voice_id: config.session.voice.clone(),
            continuous: config.session.continuous,
            format_preference: config.audio.preference.clone(),
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
            connect_timeout: Duration::from_secs(config.transport.connect_timeout_secs),
            slice_ms: config.audio.slice_ms,
            chunk_bytes: config.audio.chunk_bytes,
            chunk_cap_bytes: config.audio.chunk_bytes * 2,
            ..Self::default()
        }
    }
}
