use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::machine::{Effect, StateMachine};
use super::state::SessionSnapshot;
use crate::audio::backend::probe_microphone;
use crate::audio::{
    negotiate, BackendConfig, CapabilitySet, CaptureBackendFactory, CaptureEngine, CaptureOptions,
    CaptureSource, FormatPreference, FrameQueue, NegotiatedFormat, PlaybackEngine, TransportKind,
};
use crate::error::VoiceError;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::transport::{
    ConnectionState, ControlMessage, RecordingParams, ServerEvent, TransportSession,
};

struct SessionRuntime {
    transport: Arc<Mutex<TransportSession>>,
    event_task: Option<JoinHandle<()>>,
    pump_task: Option<JoinHandle<()>>,
    level_task: Option<JoinHandle<()>>,
}

struct Inner {
    config: SessionConfig,
    format: NegotiatedFormat,
    capture_source: CaptureSource,
    runtime: Option<SessionRuntime>,
}

/// Owns one voice session end to end.
///
/// Lifecycle: permission, format negotiation, transport, capture, state
/// machine, teardown. Start and stop run under a single session-scoped lock
/// so a start can never complete after a stop has requested hardware
/// release.
pub struct SessionOrchestrator {
    inner: Mutex<Inner>,
    machine: Arc<Mutex<StateMachine>>,
    capture: Arc<Mutex<Option<CaptureEngine>>>,
    playback: Arc<PlaybackEngine>,
    telemetry: Option<Arc<TelemetrySink>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionOrchestrator {
    pub fn new(
        config: SessionConfig,
        capabilities: &CapabilitySet,
        telemetry: Option<Arc<TelemetrySink>>,
    ) -> Self {
        let preference =
            FormatPreference::parse(&config.format_preference, config.sample_rate, config.channels);
        let format = negotiate(capabilities, &preference);

        info!(
            "Session {} negotiated format: {:?} at {}Hz, {} channels",
            config.session_id, format.transport, format.sample_rate, format.channels
        );

        let snapshot = SessionSnapshot::new(
            config.session_id.clone(),
            config.language.clone(),
            config.voice_id.clone(),
            config.continuous,
        );
        let (snapshot_tx, _) = watch::channel(snapshot);

        let machine = Arc::new(Mutex::new(StateMachine::new(config.continuous)));

        Self {
            inner: Mutex::new(Inner {
                config,
                format,
                capture_source: CaptureSource::Microphone,
                runtime: None,
            }),
            machine,
            capture: Arc::new(Mutex::new(None)),
            playback: Arc::new(PlaybackEngine::new()),
            telemetry,
            snapshot_tx,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Observe state changes as they happen.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub async fn negotiated_format(&self) -> NegotiatedFormat {
        self.inner.lock().await.format
    }

    /// Capture from a WAV file instead of the microphone (batch runs).
    pub async fn set_capture_source(&self, source: CaptureSource) {
        self.inner.lock().await.capture_source = source;
    }

    /// Probe microphone access without holding the device open. Permission
    /// is sticky once granted.
    pub async fn request_permission(&self) -> Result<(), VoiceError> {
        let result = tokio::task::spawn_blocking(probe_microphone)
            .await
            .map_err(|e| VoiceError::Device(format!("permission probe failed: {e}")))?;

        match result {
            Ok(()) => {
                self.snapshot_tx.send_modify(|s| s.permission_granted = true);
                Ok(())
            }
            Err(e) => {
                self.snapshot_tx
                    .send_modify(|s| s.last_error = Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Begin listening: connect if needed, open capture, announce the turn.
    ///
    /// A start while capture is already active is a no-op; a second hardware
    /// stream is never created.
    pub async fn start(&self) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock().await;

        {
            let capture = self.capture.lock().await;
            if capture.as_ref().map(|c| c.is_active()).unwrap_or(false) {
                info!("Capture already active, ignoring start");
                return Ok(());
            }
        }

        if !self.snapshot_tx.borrow().permission_granted {
            if let CaptureSource::Microphone = inner.capture_source {
                self.request_permission().await?;
            }
        }

        self.ensure_connected(&mut inner).await?;

        let queue = Arc::new(FrameQueue::new(inner.config.frame_queue_depth));
        let backend = CaptureBackendFactory::create(
            inner.capture_source.clone(),
            BackendConfig {
                target_sample_rate: inner.config.sample_rate,
                target_channels: inner.config.channels,
                block_ms: inner.config.slice_ms,
            },
        )?;

        let options = CaptureOptions {
            slice_ms: inner.config.slice_ms,
            chunk_bytes: inner.config.chunk_bytes,
            chunk_cap_bytes: inner.config.chunk_cap_bytes,
        };

        let engine = CaptureEngine::start(backend, inner.format, Arc::clone(&queue), options)
            .await
            .map_err(|e| {
                self.snapshot_tx
                    .send_modify(|s| s.last_error = Some(e.to_string()));
                e
            })?;
        let level_rx = engine.level();
        *self.capture.lock().await = Some(engine);

        let params = RecordingParams {
            language: inner.config.language.clone(),
            voice: inner.config.voice_id.clone(),
            format: format_name(&inner.format),
            sample_rate: inner.format.sample_rate,
            channels: inner.format.channels,
        };
        let announced = match inner.runtime.as_ref() {
            Some(runtime) => {
                runtime
                    .transport
                    .lock()
                    .await
                    .send_control(&ControlMessage::StartRecording { params })
                    .await
            }
            None => Err(VoiceError::Connection("transport not established".to_string())),
        };
        if let Err(e) = announced {
            // The turn never started; the microphone must not stay open.
            self.release_capture(&mut inner).await;
            self.snapshot_tx
                .send_modify(|s| s.last_error = Some(e.to_string()));
            return Err(e);
        }

        let Some(runtime) = inner.runtime.as_mut() else {
            return Err(VoiceError::Connection("transport not established".to_string()));
        };

        runtime.pump_task = Some(tokio::spawn(pump_task(
            queue,
            Arc::clone(&runtime.transport),
        )));
        runtime.level_task = Some(tokio::spawn(level_task(
            level_rx,
            self.snapshot_tx.clone(),
        )));

        self.machine.lock().await.begin_listening();
        self.sync_machine().await;

        info!("Session {} listening", inner.config.session_id);
        Ok(())
    }

    /// Stop the current turn. Idempotent and safe from any state; the
    /// microphone is released on every path.
    pub async fn stop(&self) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock().await;

        let effects = self.machine.lock().await.apply_stop();
        for effect in effects {
            match effect {
                Effect::StopCapture => self.release_capture(&mut inner).await,
                Effect::SendStopControl => {
                    if let Some(runtime) = inner.runtime.as_ref() {
                        let transport = runtime.transport.lock().await;
                        if transport.is_connected() {
                            if let Err(e) =
                                transport.send_control(&ControlMessage::StopRecording).await
                            {
                                warn!("Stop control not delivered: {}", e);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if !inner.config.continuous {
            self.teardown(&mut inner).await;
        }

        self.sync_machine().await;
        self.snapshot_tx.send_modify(|s| s.audio_level = 0.0);

        info!("Session {} stopped", inner.config.session_id);
        Ok(())
    }

    /// Submit text directly: no audio, no speech events, the turn goes
    /// straight to Processing.
    pub async fn process_text(&self, text: &str) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock().await;
        self.ensure_connected(&mut inner).await?;

        let Some(runtime) = inner.runtime.as_ref() else {
            return Err(VoiceError::Connection("transport not established".to_string()));
        };

        runtime
            .transport
            .lock()
            .await
            .send_control(&ControlMessage::TextInput {
                text: text.to_string(),
                language: inner.config.language.clone(),
            })
            .await?;

        self.machine.lock().await.begin_text_turn(text);
        self.sync_machine().await;
        Ok(())
    }

    /// Clear the visible transcript and response.
    pub async fn clear(&self) {
        self.machine.lock().await.clear();
        self.sync_machine().await;
        self.snapshot_tx.send_modify(|s| s.last_error = None);
    }

    /// Change the session language. Forces a new session on next start.
    pub async fn set_language(&self, language: &str) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock().await;
        if inner.config.language == language {
            return Ok(());
        }
        self.reset_session(&mut inner).await;
        inner.config.language = language.to_string();
        self.snapshot_tx
            .send_modify(|s| s.language = language.to_string());
        Ok(())
    }

    /// Change the synthesis voice. Forces a new session on next start.
    pub async fn set_voice(&self, voice_id: &str) -> Result<(), VoiceError> {
        let mut inner = self.inner.lock().await;
        if inner.config.voice_id == voice_id {
            return Ok(());
        }
        self.reset_session(&mut inner).await;
        inner.config.voice_id = voice_id.to_string();
        self.snapshot_tx
            .send_modify(|s| s.voice_id = voice_id.to_string());
        Ok(())
    }

    /// End the session entirely: release capture, close the transport.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.release_capture(&mut inner).await;
        self.teardown(&mut inner).await;
        self.machine.lock().await.apply_stop();
        self.sync_machine().await;
    }

    async fn ensure_connected(&self, inner: &mut Inner) -> Result<(), VoiceError> {
        if let Some(runtime) = inner.runtime.as_ref() {
            if runtime.transport.lock().await.is_connected() {
                return Ok(());
            }
            // The runtime outlived its connection. Reconnection happens
            // here, on an explicit start, never silently mid-turn.
            info!("Discarding stale transport, reconnecting");
            self.teardown(inner).await;
        }

        self.snapshot_tx
            .send_modify(|s| s.connection_state = ConnectionState::Connecting);

        let connected = TransportSession::connect(
            &inner.config.endpoint,
            &inner.config.token,
            inner.config.connect_timeout,
        )
        .await;

        let (transport, events) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                self.snapshot_tx.send_modify(|s| {
                    s.connection_state = ConnectionState::Disconnected;
                    s.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        self.snapshot_tx
            .send_modify(|s| s.connection_state = ConnectionState::Connected);

        let event_task = tokio::spawn(event_task(
            events,
            Arc::clone(&self.machine),
            Arc::clone(&self.capture),
            Arc::clone(&self.playback),
            self.telemetry.clone(),
            self.snapshot_tx.clone(),
        ));

        inner.runtime = Some(SessionRuntime {
            transport: Arc::new(Mutex::new(transport)),
            event_task: Some(event_task),
            pump_task: None,
            level_task: None,
        });

        Ok(())
    }

    /// Stop the capture engine and wait for its remainder to reach the
    /// transport before anything else goes out.
    async fn release_capture(&self, inner: &mut Inner) {
        if let Some(mut engine) = self.capture.lock().await.take() {
            engine.stop().await;
        }
        if let Some(runtime) = inner.runtime.as_mut() {
            if let Some(task) = runtime.pump_task.take() {
                if task.await.is_err() {
                    error!("Frame pump task panicked");
                }
            }
            if let Some(task) = runtime.level_task.take() {
                if task.await.is_err() {
                    error!("Level task panicked");
                }
            }
        }
    }

    async fn teardown(&self, inner: &mut Inner) {
        if let Some(mut runtime) = inner.runtime.take() {
            if let Some(task) = runtime.pump_task.take() {
                let _ = task.await;
            }
            runtime.transport.lock().await.close().await;
            if let Some(task) = runtime.level_task.take() {
                let _ = task.await;
            }
            if let Some(task) = runtime.event_task.take() {
                if task.await.is_err() {
                    error!("Event task panicked");
                }
            }
        }
        self.snapshot_tx
            .send_modify(|s| s.connection_state = ConnectionState::Disconnected);
    }

    async fn reset_session(&self, inner: &mut Inner) {
        self.release_capture(inner).await;
        self.teardown(inner).await;

        inner.config.session_id = format!("session-{}", uuid::Uuid::new_v4());
        *self.machine.lock().await = StateMachine::new(inner.config.continuous);

        let config = &inner.config;
        self.snapshot_tx.send_modify(|s| {
            let permission = s.permission_granted;
            *s = SessionSnapshot::new(
                config.session_id.clone(),
                config.language.clone(),
                config.voice_id.clone(),
                config.continuous,
            );
            s.permission_granted = permission;
        });
    }

    async fn sync_machine(&self) {
        let machine = self.machine.lock().await;
        self.snapshot_tx.send_modify(|s| {
            s.turn_state = machine.state();
            s.transcript = machine.transcript().to_string();
            s.response = machine.response().to_string();
        });
    }
}

fn format_name(format: &NegotiatedFormat) -> String {
    match format.transport {
        TransportKind::RawPcm => "pcm16".to_string(),
        TransportKind::Container(codec) => codec.as_str().to_string(),
    }
}

/// Forwards captured frames to the transport in capture order. Ends when
/// the queue closes or the writer goes away.
async fn pump_task(queue: Arc<FrameQueue>, transport: Arc<Mutex<TransportSession>>) {
    while let Some(frame) = queue.pop().await {
        let result = transport.lock().await.send_frame(frame.bytes).await;
        if result.is_err() {
            warn!("Transport writer gone, stopping frame pump");
            break;
        }
    }
}

/// Mirrors the capture level gauge into the snapshot. Ends with the capture
/// task.
async fn level_task(mut level_rx: watch::Receiver<f32>, snapshot_tx: watch::Sender<SessionSnapshot>) {
    while level_rx.changed().await.is_ok() {
        let level = *level_rx.borrow();
        snapshot_tx.send_modify(|s| s.audio_level = level);
    }
}

/// Single consumer of the inbound event stream. The state machine never
/// observes out-of-order transitions because everything funnels through
/// this one loop.
async fn event_task(
    mut events: mpsc::Receiver<ServerEvent>,
    machine: Arc<Mutex<StateMachine>>,
    capture: Arc<Mutex<Option<CaptureEngine>>>,
    playback: Arc<PlaybackEngine>,
    telemetry: Option<Arc<TelemetrySink>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
) {
    let mut turn_started_at: Option<Instant> = None;

    while let Some(event) = events.recv().await {
        match &event {
            ServerEvent::Ready { session_id } => {
                if let Some(id) = session_id {
                    info!("Session ready, remote id {}", id);
                    snapshot_tx.send_modify(|s| s.session_id = id.clone());
                }
                continue;
            }
            ServerEvent::Audio(payload) => {
                render_chunk(payload, &playback);
                continue;
            }
            _ => {}
        }

        let effects = machine.lock().await.apply(&event);

        {
            let machine = machine.lock().await;
            snapshot_tx.send_modify(|s| {
                s.turn_state = machine.state();
                s.transcript = machine.transcript().to_string();
                s.response = machine.response().to_string();
            });
        }

        for effect in effects {
            match effect {
                Effect::StopCapture => {
                    if let Some(mut engine) = capture.lock().await.take() {
                        engine.stop().await;
                    }
                    snapshot_tx.send_modify(|s| s.audio_level = 0.0);
                }
                Effect::StopPlayback => playback.stop(),
                Effect::SendStopControl => {}
                Effect::SurfaceError(message) => {
                    snapshot_tx.send_modify(|s| s.last_error = Some(message));
                }
                Effect::TurnStarted => {
                    turn_started_at = Some(Instant::now());
                    emit(&telemetry, &snapshot_tx, TelemetryEvent::TurnStarted).await;
                }
                Effect::FirstResponse => {
                    let latency_ms = turn_started_at
                        .map(|t| t.elapsed().as_millis() as u64)
                        .unwrap_or(0);
                    emit(
                        &telemetry,
                        &snapshot_tx,
                        TelemetryEvent::FirstResponse { latency_ms },
                    )
                    .await;
                }
                Effect::BargeIn => {
                    emit(&telemetry, &snapshot_tx, TelemetryEvent::BargeIn).await;
                }
            }
        }

        if let ServerEvent::Error {
            code: Some(code), ..
        } = &event
        {
            if code == "connection_lost" {
                snapshot_tx
                    .send_modify(|s| s.connection_state = ConnectionState::Disconnected);
            }
        }
    }
}

fn render_chunk(payload: &crate::transport::AudioPayload, playback: &PlaybackEngine) {
    let bytes = match payload.decode_data() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Skipping audio chunk: {}", e);
            return;
        }
    };

    match crate::audio::decode_chunk(&payload.format, &bytes, payload.sample_rate, payload.channels)
    {
        Ok(pcm) => {
            if let Err(e) = playback.play(pcm) {
                warn!("Playback unavailable: {}", e);
            }
        }
        // One bad chunk loses itself, never the turn.
        Err(e) => warn!("Skipping undecodable audio chunk: {}", e),
    }
}

async fn emit(
    telemetry: &Option<Arc<TelemetrySink>>,
    snapshot_tx: &watch::Sender<SessionSnapshot>,
    event: TelemetryEvent,
) {
    if let Some(sink) = telemetry {
        let session_id = snapshot_tx.borrow().session_id.clone();
        sink.emit(&session_id, &event).await;
    }
}
