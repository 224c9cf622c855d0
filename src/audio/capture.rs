use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Notify};
use tracing::{error, warn};

use super::backend::{CaptureBackend, SampleBlock};
use super::format::{NegotiatedFormat, TransportKind};
use crate::error::VoiceError;

/// Encoding of an outbound frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Pcm16,
    Wav,
}

impl FormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::Pcm16 => "pcm16",
            FormatTag::Wav => "wav",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            FormatTag::Pcm16 => "audio/pcm",
            FormatTag::Wav => "audio/wav",
        }
    }
}

/// One transport-ready audio frame.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub bytes: Vec<u8>,
    pub format: FormatTag,
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp_ms: u64,
    /// Monotonic per-capture counter; the pump relies on it for ordering.
    pub sequence: u64,
}

/// Bounded frame buffer between capture and the transport pump.
///
/// When full, the OLDEST frame is evicted so a stalled transport replays
/// recent audio rather than stale audio. Single consumer.
pub struct FrameQueue {
    frames: Mutex<VecDeque<AudioFrame>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn push(&self, frame: AudioFrame) {
        {
            let mut queue = self.frames.lock().await;
            if queue.len() >= self.capacity {
                queue.pop_front();
                warn!("Frame queue full, dropping oldest frame");
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Wait for the next frame. Returns `None` once the queue is closed
    /// and drained.
    pub async fn pop(&self) -> Option<AudioFrame> {
        loop {
            {
                let mut queue = self.frames.lock().await;
                if let Some(frame) = queue.pop_front() {
                    return Some(frame);
                }
            }
            if self.closed.load(Ordering::SeqCst) {
                let mut queue = self.frames.lock().await;
                return queue.pop_front();
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; pending frames remain poppable.
    ///
    /// `notify_one` stores a permit when no consumer is parked, which covers
    /// the close-vs-park race for the single consumer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.frames.lock().await.len()
    }
}

/// Re-chunks a raw PCM byte stream into fixed-size frames.
///
/// Emits exactly `target`-sized chunks and carries the remainder forward;
/// `flush` drains whatever is left, splitting at `cap` so no frame ever
/// exceeds it. Byte-exact: concatenating the output reproduces the input.
pub struct PcmChunker {
    target: usize,
    cap: usize,
    buf: Vec<u8>,
}

impl PcmChunker {
    pub fn new(target: usize, cap: usize) -> Self {
        let target = target.max(2);
        Self {
            target,
            cap: cap.max(target),
            buf: Vec::new(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while self.buf.len() >= self.target {
            out.push(self.buf.drain(..self.target).collect());
        }
        out
    }

    pub fn flush(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while self.buf.len() > self.cap {
            out.push(self.buf.drain(..self.cap).collect());
        }
        if !self.buf.is_empty() {
            out.push(std::mem::take(&mut self.buf));
        }
        out
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Encodes capture samples as a stream of short standalone WAV files.
///
/// Each slice covers `slice_ms` of audio and carries its own header, so the
/// receiver can decode every frame independently.
pub struct WavSliceEncoder {
    sample_rate: u32,
    channels: u16,
    slice_samples: usize,
    pending: Vec<i16>,
}

impl WavSliceEncoder {
    pub fn new(sample_rate: u32, channels: u16, slice_ms: u64) -> Self {
        let slice_samples =
            ((sample_rate as u64 * slice_ms / 1000) as usize * channels as usize).max(1);
        Self {
            sample_rate,
            channels,
            slice_samples,
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<Vec<u8>>, VoiceError> {
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        while self.pending.len() >= self.slice_samples {
            let slice: Vec<i16> = self.pending.drain(..self.slice_samples).collect();
            out.push(self.encode(&slice)?);
        }
        Ok(out)
    }

    /// Emit the final partial slice, if any.
    pub fn flush(&mut self) -> Result<Option<Vec<u8>>, VoiceError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let slice = std::mem::take(&mut self.pending);
        Ok(Some(self.encode(&slice)?))
    }

    fn encode(&self, samples: &[i16]) -> Result<Vec<u8>, VoiceError> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut bytes = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut bytes);
            let mut writer = hound::WavWriter::new(cursor, spec)
                .map_err(|e| VoiceError::Device(format!("failed to create WAV slice: {e}")))?;
            for &sample in samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| VoiceError::Device(format!("failed to encode WAV slice: {e}")))?;
            }
            writer
                .finalize()
                .map_err(|e| VoiceError::Device(format!("failed to finalize WAV slice: {e}")))?;
        }
        Ok(bytes)
    }
}

/// Mean absolute amplitude normalized to 0.0..=1.0.
pub fn level_of(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|&s| (s as i32).unsigned_abs() as u64).sum();
    (sum as f64 / samples.len() as f64 / i16::MAX as f64) as f32
}

/// Nearest-sample decimation. Passes the input through when the source rate
/// is already at or below the target.
pub fn downsample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate <= to_rate || to_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    (0..out_len)
        .map(|i| samples[((i as f64 * ratio) as usize).min(samples.len() - 1)])
        .collect()
}

/// Average interleaved channels down to mono.
pub fn stereo_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let step = channels as usize;
    samples
        .chunks(step)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Capture tuning knobs, sourced from [`crate::config::AudioConfig`].
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub slice_ms: u64,
    pub chunk_bytes: usize,
    pub chunk_cap_bytes: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            slice_ms: 50,
            chunk_bytes: 2048,
            chunk_cap_bytes: 4096,
        }
    }
}

enum FrameEncoder {
    Raw(PcmChunker),
    Wav(WavSliceEncoder),
}

impl FrameEncoder {
    fn new(format: &NegotiatedFormat, options: &CaptureOptions) -> Self {
        match format.transport {
            TransportKind::RawPcm => FrameEncoder::Raw(PcmChunker::new(
                options.chunk_bytes,
                options.chunk_cap_bytes,
            )),
            TransportKind::Container(_) => FrameEncoder::Wav(WavSliceEncoder::new(
                format.sample_rate,
                format.channels,
                options.slice_ms,
            )),
        }
    }

    fn tag(&self) -> FormatTag {
        match self {
            FrameEncoder::Raw(_) => FormatTag::Pcm16,
            FrameEncoder::Wav(_) => FormatTag::Wav,
        }
    }

    fn push(&mut self, samples: &[i16]) -> Result<Vec<Vec<u8>>, VoiceError> {
        match self {
            FrameEncoder::Raw(chunker) => Ok(chunker.push(&pcm_bytes(samples))),
            FrameEncoder::Wav(encoder) => encoder.push(samples),
        }
    }

    fn flush(&mut self) -> Result<Vec<Vec<u8>>, VoiceError> {
        match self {
            FrameEncoder::Raw(chunker) => Ok(chunker.flush()),
            FrameEncoder::Wav(encoder) => Ok(encoder.flush()?.into_iter().collect()),
        }
    }
}

fn conform(block: &SampleBlock, format: &NegotiatedFormat) -> Vec<i16> {
    let mono = if block.channels > format.channels && format.channels == 1 {
        stereo_to_mono(&block.samples, block.channels)
    } else {
        block.samples.clone()
    };

    if block.sample_rate > format.sample_rate {
        downsample(&mono, block.sample_rate, format.sample_rate)
    } else {
        mono
    }
}

/// Drives a capture backend: conforms sample blocks to the negotiated
/// format, encodes them, and feeds the frame queue.
///
/// On stop the remainder is flushed, the backend is released regardless of
/// flush outcome, and the queue is closed so the pump can drain and exit.
pub struct CaptureEngine {
    stop_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
    level_rx: watch::Receiver<f32>,
}

impl CaptureEngine {
    pub async fn start(
        mut backend: Box<dyn CaptureBackend>,
        format: NegotiatedFormat,
        queue: Arc<FrameQueue>,
        options: CaptureOptions,
    ) -> Result<Self, VoiceError> {
        let mut blocks = backend.start().await?;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (level_tx, level_rx) = watch::channel(0.0f32);

        let task = tokio::spawn(async move {
            let mut encoder = FrameEncoder::new(&format, &options);
            let tag = encoder.tag();
            let mut sequence = 0u64;
            let mut last_timestamp_ms = 0u64;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    block = blocks.recv() => {
                        let Some(block) = block else { break };
                        last_timestamp_ms = block.timestamp_ms;

                        let samples = conform(&block, &format);
                        let _ = level_tx.send(level_of(&samples));

                        match encoder.push(&samples) {
                            Ok(chunks) => {
                                for bytes in chunks {
                                    queue
                                        .push(make_frame(
                                            bytes,
                                            tag,
                                            &format,
                                            block.timestamp_ms,
                                            &mut sequence,
                                        ))
                                        .await;
                                }
                            }
                            Err(e) => warn!("Failed to encode capture block: {}", e),
                        }
                    }
                }
            }

            let flushed = encoder.flush();

            // Release the device even when the flush failed.
            if let Err(e) = backend.stop().await {
                error!("Failed to stop capture backend: {}", e);
            }

            match flushed {
                Ok(chunks) => {
                    for bytes in chunks {
                        queue
                            .push(make_frame(bytes, tag, &format, last_timestamp_ms, &mut sequence))
                            .await;
                    }
                }
                Err(e) => warn!("Failed to flush capture remainder: {}", e),
            }

            let _ = level_tx.send(0.0);
            queue.close();
        });

        Ok(Self {
            stop_tx,
            task: Some(task),
            level_rx,
        })
    }

    /// Stop capture and wait for the remainder flush. Idempotent.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            if task.await.is_err() {
                error!("Capture task panicked");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.task
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Input level gauge, updated once per captured block.
    pub fn level(&self) -> watch::Receiver<f32> {
        self.level_rx.clone()
    }
}

fn make_frame(
    bytes: Vec<u8>,
    tag: FormatTag,
    format: &NegotiatedFormat,
    timestamp_ms: u64,
    sequence: &mut u64,
) -> AudioFrame {
    let frame = AudioFrame {
        bytes,
        format: tag,
        sample_rate: format.sample_rate,
        channels: format.channels,
        timestamp_ms,
        sequence: *sequence,
    };
    *sequence += 1;
    frame
}
