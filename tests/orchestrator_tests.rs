// Tests for the session orchestrator
//
// No voice service runs during tests, so connection attempts target a
// closed port and every scenario exercises the failure and idempotency
// paths that do not require hardware or a network peer.

use std::time::Duration;

use anyhow::Result;

use voicelink::transport::ConnectionState;
use voicelink::{
    CapabilitySet, CaptureSource, SessionConfig, SessionOrchestrator, TransportKind, TurnState,
};

fn unreachable_config() -> SessionConfig {
    SessionConfig {
        endpoint: "ws://127.0.0.1:1/voice".to_string(),
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

fn no_container_caps() -> CapabilitySet {
    CapabilitySet::new(vec![], true)
}

#[tokio::test]
async fn test_new_session_starts_idle_and_disconnected() {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.turn_state, TurnState::Idle);
    assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
    assert_eq!(snapshot.transcript, "");
    assert_eq!(snapshot.response, "");
    assert_eq!(snapshot.audio_level, 0.0);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_negotiation_happens_at_construction() {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);

    let format = orchestrator.negotiated_format().await;
    assert_eq!(format.transport, TransportKind::RawPcm);
    assert_eq!(format.sample_rate, 24000);
    assert_eq!(format.channels, 1);
}

#[tokio::test]
async fn test_start_fails_fast_against_unreachable_endpoint() -> Result<()> {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);
    // File source skips the microphone permission probe
    orchestrator
        .set_capture_source(CaptureSource::File("/dev/null".to_string()))
        .await;

    let result = orchestrator.start().await;
    assert!(result.is_err(), "Nothing listens on port 1");

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
    assert!(
        snapshot.last_error.is_some(),
        "Connection failures surface in the snapshot"
    );
    assert_eq!(snapshot.turn_state, TurnState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_text_turn_requires_a_connection() {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);

    let result = orchestrator.process_text("hello").await;
    assert!(result.is_err());

    // The failed turn leaves no transcript behind
    assert_eq!(orchestrator.snapshot().transcript, "");
}

#[tokio::test]
async fn test_stop_without_start_is_safe() -> Result<()> {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);

    orchestrator.stop().await?;
    orchestrator.stop().await?;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.turn_state, TurnState::Idle);
    assert_eq!(snapshot.audio_level, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_without_start_is_safe() {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);
    orchestrator.shutdown().await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.turn_state, TurnState::Idle);
    assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_clear_resets_text_and_error() {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);

    // Provoke an error to populate last_error
    let _ = orchestrator.process_text("hi").await;
    assert!(orchestrator.snapshot().last_error.is_some());

    orchestrator.clear().await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.transcript, "");
    assert_eq!(snapshot.response, "");
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_language_change_resets_the_session() -> Result<()> {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);
    let original_id = orchestrator.snapshot().session_id.clone();

    orchestrator.set_language("fr-FR").await?;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.language, "fr-FR");
    assert_ne!(
        snapshot.session_id, original_id,
        "A language change forces a fresh session"
    );

    // Setting the same language again is a no-op
    let id_after = orchestrator.snapshot().session_id.clone();
    orchestrator.set_language("fr-FR").await?;
    assert_eq!(orchestrator.snapshot().session_id, id_after);
    Ok(())
}

#[tokio::test]
async fn test_voice_change_resets_the_session() -> Result<()> {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);
    let original_id = orchestrator.snapshot().session_id.clone();

    orchestrator.set_voice("aria").await?;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.voice_id, "aria");
    assert_ne!(snapshot.session_id, original_id);
    Ok(())
}

#[tokio::test]
async fn test_subscribe_observes_snapshot_changes() -> Result<()> {
    let orchestrator =
        SessionOrchestrator::new(unreachable_config(), &no_container_caps(), None);
    let mut rx = orchestrator.subscribe();

    orchestrator.set_voice("nova").await?;

    rx.changed().await?;
    assert_eq!(rx.borrow().voice_id, "nova");
    Ok(())
}

#[test]
fn test_session_defaults() {
    let config = SessionConfig::default();

    assert!(config.session_id.starts_with("session-"));
    assert_eq!(config.sample_rate, 24000);
    assert_eq!(config.channels, 1);
    assert_eq!(config.slice_ms, 50);
    assert_eq!(config.chunk_bytes, 2048);
    assert_eq!(config.chunk_cap_bytes, 4096);
    assert!(config.continuous);
}
