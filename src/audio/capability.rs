use cpal::traits::{DeviceTrait, HostTrait};
use tracing::info;

/// Container codecs this build can encode for transport.
///
/// The WAV encoder is compiled in unconditionally (hound); compressed codecs
/// would be added here when their encoders are linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerCodec {
    Wav,
}

impl ContainerCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerCodec::Wav => "wav",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContainerCodec::Wav => "audio/wav",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "wav" | "audio/wav" | "wave" => Some(ContainerCodec::Wav),
            _ => None,
        }
    }
}

/// Immutable snapshot of the runtime's audio capabilities.
///
/// Detected once at startup and shared read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    container_codecs: Vec<ContainerCodec>,
    raw_pcm: bool,
    mime_idents: Vec<String>,
}

impl CapabilitySet {
    /// Probe the host once: which container encoders are compiled in and
    /// whether an input device can deliver raw samples.
    pub fn detect() -> Self {
        let container_codecs = vec![ContainerCodec::Wav];

        let host = cpal::default_host();
        let raw_pcm = match host.default_input_device() {
            Some(device) => device.default_input_config().is_ok(),
            None => false,
        };

        let set = Self::new(container_codecs, raw_pcm);

        info!(
            "Audio capabilities: containers={:?}, raw_pcm={}",
            set.container_codecs
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
            set.raw_pcm
        );

        set
    }

    /// Build a capability set directly (tests, headless hosts).
    pub fn new(container_codecs: Vec<ContainerCodec>, raw_pcm: bool) -> Self {
        let mut mime_idents: Vec<String> =
            container_codecs.iter().map(|c| c.mime().to_string()).collect();
        if raw_pcm {
            mime_idents.push("audio/pcm".to_string());
        }

        Self {
            container_codecs,
            raw_pcm,
            mime_idents,
        }
    }

    pub fn supports_container(&self, codec: ContainerCodec) -> bool {
        self.container_codecs.contains(&codec)
    }

    pub fn container_codecs(&self) -> &[ContainerCodec] {
        &self.container_codecs
    }

    pub fn raw_pcm(&self) -> bool {
        self.raw_pcm
    }

    pub fn mime_idents(&self) -> &[String] {
        &self.mime_idents
    }
}
