use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{error, info, warn};

use crate::error::VoiceError;

/// Interleaved signed 16-bit PCM ready for the output device.
#[derive(Debug, Clone)]
pub struct DecodedPcm {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedPcm {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / (self.sample_rate as u64 * self.channels as u64)
    }
}

/// Decode one inbound playback chunk by its declared format.
///
/// `sample_rate` and `channels` describe raw PCM payloads; container
/// payloads carry their own header and ignore them.
pub fn decode_chunk(
    format: &str,
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<DecodedPcm, VoiceError> {
    match format.to_ascii_lowercase().as_str() {
        "" | "pcm" | "pcm16" | "audio/pcm" => decode_pcm16(bytes, sample_rate, channels),
        "wav" | "wave" | "audio/wav" => decode_wav(bytes),
        other => decode_container(bytes, other).or_else(|e| {
            // Some services mislabel WAV payloads; one more attempt with the
            // plain WAV reader before the chunk is given up on.
            warn!("Container decode failed ({}), trying WAV fallback", e);
            decode_wav(bytes).map_err(|_| e)
        }),
    }
}

/// Reassemble little-endian byte pairs into samples.
///
/// A trailing odd byte means the sender split a sample across chunks, which
/// the protocol forbids; the byte is dropped with a warning.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<DecodedPcm, VoiceError> {
    if sample_rate == 0 || channels == 0 {
        return Err(VoiceError::Decode(format!(
            "invalid PCM parameters: {}Hz, {} channels",
            sample_rate, channels
        )));
    }

    if bytes.len() % 2 != 0 {
        warn!("PCM chunk has odd length {}, dropping trailing byte", bytes.len());
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(DecodedPcm {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode a standalone WAV payload with hound.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedPcm, VoiceError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| VoiceError::Decode(format!("failed to parse WAV chunk: {e}")))?;

    let spec = reader.spec();
    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VoiceError::Decode(format!("failed to read WAV samples: {e}")))?,
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VoiceError::Decode(format!("failed to read WAV samples: {e}")))?,
    };

    Ok(DecodedPcm {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Decode a compressed container payload with symphonia.
pub fn decode_container(bytes: &[u8], format: &str) -> Result<DecodedPcm, VoiceError> {
    let cursor = Cursor::new(bytes.to_vec());
    let stream = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    let ext = format.rsplit('/').next().unwrap_or(format);
    if !ext.is_empty() {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceError::Decode(format!("unrecognized audio container '{format}': {e}")))?;

    let mut reader = probed.format;
    let track = reader
        .default_track()
        .ok_or_else(|| VoiceError::Decode("container has no audio track".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceError::Decode(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(VoiceError::Decode(format!("failed to read packet: {e}")));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A corrupt packet loses its own audio only.
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet: {}", e);
            }
            Err(e) => {
                return Err(VoiceError::Decode(format!("decoder failed: {e}")));
            }
        }
    }

    if samples.is_empty() {
        return Err(VoiceError::Decode(format!(
            "container '{format}' produced no samples"
        )));
    }
    if sample_rate == 0 || channels == 0 {
        return Err(VoiceError::Decode(
            "container did not declare a sample rate or channel count".to_string(),
        ));
    }

    Ok(DecodedPcm {
        samples,
        sample_rate,
        channels,
    })
}

enum PlaybackCommand {
    Play(DecodedPcm),
    Stop,
    Shutdown,
}

/// Speaker output engine.
///
/// `rodio::OutputStream` is `!Send`, so the device lives on a dedicated OS
/// thread fed through a command channel. Chunks queue gaplessly on the sink;
/// `stop` clears everything queued, which is what barge-in needs.
pub struct PlaybackEngine {
    tx: mpsc::Sender<PlaybackCommand>,
    playing: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<PlaybackCommand>();
        let playing = Arc::new(AtomicBool::new(false));
        let playing_thread = Arc::clone(&playing);

        let thread = std::thread::spawn(move || playback_thread(rx, playing_thread));

        Self {
            tx,
            playing,
            thread: Some(thread),
        }
    }

    /// Queue a decoded chunk for playback.
    pub fn play(&self, pcm: DecodedPcm) -> Result<(), VoiceError> {
        self.playing.store(true, Ordering::SeqCst);
        self.tx
            .send(PlaybackCommand::Play(pcm))
            .map_err(|_| VoiceError::Device("playback thread is gone".to_string()))
    }

    /// Stop playback immediately and discard queued chunks.
    pub fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
        if self.tx.send(PlaybackCommand::Stop).is_err() {
            warn!("Playback thread is gone, stop ignored");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.tx.send(PlaybackCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Playback thread panicked");
            }
        }
    }
}

fn playback_thread(rx: mpsc::Receiver<PlaybackCommand>, playing: Arc<AtomicBool>) {
    let output = rodio::OutputStream::try_default();
    let (_stream, handle) = match output {
        Ok(pair) => pair,
        Err(e) => {
            error!("No audio output device: {}", e);
            // Keep draining so senders never error on a headless host.
            drain_without_device(rx, playing);
            return;
        }
    };

    let sink = match rodio::Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Failed to create playback sink: {}", e);
            drain_without_device(rx, playing);
            return;
        }
    };

    info!("Playback engine ready");

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(PlaybackCommand::Play(pcm)) => {
                let buffer = SamplesBuffer::new(pcm.channels, pcm.sample_rate, pcm.samples);
                sink.append(buffer);
                playing.store(true, Ordering::SeqCst);
            }
            Ok(PlaybackCommand::Stop) => {
                sink.stop();
                playing.store(false, Ordering::SeqCst);
            }
            Ok(PlaybackCommand::Shutdown) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if sink.empty() {
                    playing.store(false, Ordering::SeqCst);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    sink.stop();
    playing.store(false, Ordering::SeqCst);
}

fn drain_without_device(rx: mpsc::Receiver<PlaybackCommand>, playing: Arc<AtomicBool>) {
    playing.store(false, Ordering::SeqCst);
    while let Ok(command) = rx.recv() {
        match command {
            PlaybackCommand::Shutdown => break,
            PlaybackCommand::Play(_) => playing.store(false, Ordering::SeqCst),
            PlaybackCommand::Stop => {}
        }
    }
}
