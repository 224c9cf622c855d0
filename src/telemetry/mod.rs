//! Timing telemetry for voice turns.
//!
//! Events are published to NATS as fire-and-forget JSON; a missing or
//! failing sink never affects the voice session itself.

use anyhow::{Context, Result};
use async_nats::Client;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    TurnStarted,
    FirstResponse { latency_ms: u64 },
    BargeIn,
}

#[derive(Debug, Serialize)]
struct TelemetryEnvelope<'a> {
    session_id: &'a str,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a TelemetryEvent,
}

pub struct TelemetrySink {
    client: Client,
}

impl TelemetrySink {
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting telemetry sink to NATS at {}", url);
        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;
        Ok(Self { client })
    }

    /// Publish one event. Failures are logged and swallowed.
    pub async fn emit(&self, session_id: &str, event: &TelemetryEvent) {
        let envelope = TelemetryEnvelope {
            session_id,
            timestamp: Utc::now(),
            event,
        };

        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode telemetry event: {}", e);
                return;
            }
        };

        let subject = format!("voice.telemetry.session-{}", session_id);
        if let Err(e) = self.client.publish(subject, payload.into()).await {
            warn!("Failed to publish telemetry event: {}", e);
        }
    }
}
