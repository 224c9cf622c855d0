use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::VoiceError;

/// One block of raw samples off the hardware (i16 PCM, interleaved).
#[derive(Debug, Clone)]
pub struct SampleBlock {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Target sample rate (the engine downsamples if the device differs)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono)
    pub target_channels: u16,
    /// Block cadence for file-based capture in milliseconds
    pub block_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 24000,
            target_channels: 1,
            block_ms: 50,
        }
    }
}

/// Audio capture backend trait.
///
/// Implementations:
/// - Microphone: cpal input stream on a dedicated thread
/// - File: WAV file playback (tests, batch processing)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing; returns a channel receiver of sample blocks.
    async fn start(&mut self) -> Result<mpsc::Receiver<SampleBlock>, VoiceError>;

    /// Stop capturing and release the underlying stream.
    async fn stop(&mut self) -> Result<(), VoiceError>;

    /// Whether the backend is currently capturing.
    fn is_capturing(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Capture source selector.
#[derive(Debug, Clone)]
pub enum CaptureSource {
    Microphone,
    File(String),
}

pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub fn create(
        source: CaptureSource,
        config: BackendConfig,
    ) -> Result<Box<dyn CaptureBackend>, VoiceError> {
        match source {
            CaptureSource::Microphone => Ok(Box::new(MicrophoneBackend::new(config))),
            CaptureSource::File(path) => Ok(Box::new(FileBackend::new(path, config))),
        }
    }
}

/// Map a capture failure message onto the error taxonomy. Hosts report
/// permission refusals as device-access errors with recognizable wording.
pub fn classify_capture_error(message: &str) -> VoiceError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        VoiceError::PermissionDenied
    } else {
        VoiceError::Device(message.to_string())
    }
}

/// Probe the default input device without holding it open.
///
/// Used by the orchestrator's permission request; distinguishes permission
/// refusal from missing/failed hardware.
pub fn probe_microphone() -> Result<(), VoiceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::Device("no input device available".to_string()))?;

    device
        .default_input_config()
        .map(|_| ())
        .map_err(|e| classify_capture_error(&e.to_string()))
}

/// Microphone backend using cpal.
///
/// `cpal::Stream` is `!Send`, so the stream lives on its own OS thread and
/// blocks forward into a tokio channel from the audio callback.
pub struct MicrophoneBackend {
    config: BackendConfig,
    capturing: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<SampleBlock>, VoiceError> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(VoiceError::Device(
                "microphone backend already capturing".to_string(),
            ));
        }

        // Probe on the calling thread so permission/device failures surface
        // from start() rather than dying silently inside the stream thread.
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::Device("no input device available".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| classify_capture_error(&e.to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(
            "Starting microphone capture on '{}' ({}Hz, {} channels, {:?}, target {}Hz/{}ch)",
            device_name,
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format(),
            self.config.target_sample_rate,
            self.config.target_channels
        );

        let (tx, rx) = mpsc::channel::<SampleBlock>(64);
        let stop_flag = Arc::clone(&self.stop_flag);
        let capturing = Arc::clone(&self.capturing);
        stop_flag.store(false, Ordering::SeqCst);
        capturing.store(true, Ordering::SeqCst);

        let thread = std::thread::spawn(move || {
            let sample_rate = supported.sample_rate().0;
            let channels = supported.channels();
            let sample_format = supported.sample_format();
            let stream_config: cpal::StreamConfig = supported.into();
            let started = Instant::now();

            let err_fn = |e| error!("Input stream error: {}", e);

            let forward = {
                let tx = tx.clone();
                move |samples: Vec<i16>| {
                    let block = SampleBlock {
                        samples,
                        sample_rate,
                        channels,
                        timestamp_ms: started.elapsed().as_millis() as u64,
                    };
                    // Never block the audio callback; a full channel means the
                    // consumer is behind and this block is already stale.
                    if tx.try_send(block).is_err() {
                        warn!("Capture channel full, dropping sample block");
                    }
                }
            };

            let stream = match sample_format {
                cpal::SampleFormat::I16 => {
                    let forward = forward.clone();
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[i16], _| forward(data.to_vec()),
                        err_fn,
                        None,
                    )
                }
                cpal::SampleFormat::F32 => {
                    let forward = forward.clone();
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _| {
                            let samples = data
                                .iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                                .collect();
                            forward(samples)
                        },
                        err_fn,
                        None,
                    )
                }
                cpal::SampleFormat::U16 => {
                    let forward = forward.clone();
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[u16], _| {
                            let samples = data
                                .iter()
                                .map(|&s| (s as i32 - 32768) as i16)
                                .collect();
                            forward(samples)
                        },
                        err_fn,
                        None,
                    )
                }
                other => {
                    error!("Unsupported input sample format: {:?}", other);
                    capturing.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    error!("Failed to build input stream: {}", e);
                    capturing.store(false, Ordering::SeqCst);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                error!("Failed to start input stream: {}", e);
                capturing.store(false, Ordering::SeqCst);
                return;
            }

            while !stop_flag.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }

            // Dropping the stream releases the device handle.
            drop(stream);
            capturing.store(false, Ordering::SeqCst);
            info!("Microphone capture thread stopped");
        });

        self.thread = Some(thread);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), VoiceError> {
        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || {
                if thread.join().is_err() {
                    error!("Microphone capture thread panicked");
                }
            })
            .await
            .map_err(|e| VoiceError::Device(format!("failed to join capture thread: {e}")))?;
        }

        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// WAV-file capture backend (tests, batch processing).
///
/// Emits the file's samples as fixed-duration blocks without pacing.
pub struct FileBackend {
    path: String,
    config: BackendConfig,
    capturing: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: String, config: BackendConfig) -> Self {
        Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<SampleBlock>, VoiceError> {
        let reader = hound::WavReader::open(&self.path)
            .map_err(|e| VoiceError::Device(format!("failed to open {}: {e}", self.path)))?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VoiceError::Device(format!("failed to read samples: {e}")))?;

        info!(
            "File backend: {} ({}Hz, {} channels, {} samples)",
            self.path,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let block_samples = (spec.sample_rate as u64 * self.config.block_ms / 1000) as usize
            * spec.channels as usize;
        let block_samples = block_samples.max(1);

        let (tx, rx) = mpsc::channel::<SampleBlock>(64);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);
        let block_ms = self.config.block_ms;

        let task = tokio::spawn(async move {
            let mut timestamp_ms = 0u64;
            for chunk in samples.chunks(block_samples) {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                let block = SampleBlock {
                    samples: chunk.to_vec(),
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms,
                };
                if tx.send(block).await.is_err() {
                    break;
                }
                timestamp_ms += block_ms;
            }
            capturing.store(false, Ordering::SeqCst);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), VoiceError> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
