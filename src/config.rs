use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionDefaults,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct TransportConfig {
    /// WebSocket endpoint of the voice service
    pub endpoint: String,

    /// Bearer token presented on the upgrade request
    #[serde(default)]
    pub token: String,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Transport format preference: "auto", "raw", or a container codec name
    pub preference: String,

    /// Target sample rate for capture (ASR expects 24kHz)
    pub sample_rate: u32,

    /// Number of channels (1 = mono)
    pub channels: u16,

    /// Container slice cadence in milliseconds
    #[serde(default = "default_slice_ms")]
    pub slice_ms: u64,

    /// Target raw-PCM chunk size in bytes
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct SessionDefaults {
    pub language: String,
    pub voice: String,
    /// Re-arm listening after each agent response instead of returning to idle
    pub continuous: bool,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            voice: "default".to_string(),
            continuous: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TelemetryConfig {
    /// NATS server URL; telemetry is disabled when absent
    pub nats_url: Option<String>,
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_slice_ms() -> u64 {
    50
}

fn default_chunk_bytes() -> usize {
    2048
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
