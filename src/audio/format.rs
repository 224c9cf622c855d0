use tracing::warn;

use super::capability::{CapabilitySet, ContainerCodec};

/// Fixed target for downstream ASR: 24kHz mono.
pub const ASR_SAMPLE_RATE: u32 = 24_000;
pub const ASR_CHANNELS: u16 = 1;

/// What the caller asked for before negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceKind {
    /// Prefer a container codec when available, raw PCM otherwise
    Auto,
    /// Raw linear PCM regardless of container support
    RawPcm,
    /// A specific container codec
    Container(ContainerCodec),
}

/// User/config-supplied format preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatPreference {
    pub kind: PreferenceKind,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for FormatPreference {
    fn default() -> Self {
        Self {
            kind: PreferenceKind::Auto,
            sample_rate: ASR_SAMPLE_RATE,
            channels: ASR_CHANNELS,
        }
    }
}

impl FormatPreference {
    /// Parse a config string ("auto", "raw"/"pcm", or a codec name).
    /// Unknown names degrade to auto with a warning.
    pub fn parse(name: &str, sample_rate: u32, channels: u16) -> Self {
        let kind = match name.to_ascii_lowercase().as_str() {
            "auto" => PreferenceKind::Auto,
            "raw" | "pcm" | "pcm16" => PreferenceKind::RawPcm,
            other => match ContainerCodec::from_name(other) {
                Some(codec) => PreferenceKind::Container(codec),
                None => {
                    warn!("Unknown format preference '{}', using auto", other);
                    PreferenceKind::Auto
                }
            },
        };

        Self {
            kind,
            sample_rate,
            channels,
        }
    }
}

/// The agreed transport representation for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Container(ContainerCodec),
    RawPcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub transport: TransportKind,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: Option<u32>,
}

impl NegotiatedFormat {
    fn raw_pcm(sample_rate: u32, channels: u16) -> Self {
        Self {
            transport: TransportKind::RawPcm,
            sample_rate,
            channels,
            bit_rate: None,
        }
    }

    fn container(codec: ContainerCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            transport: TransportKind::Container(codec),
            sample_rate,
            channels,
            bit_rate: Some(sample_rate * 16 * channels as u32),
        }
    }
}

/// Select the transport format for a session.
///
/// Pure function of its inputs; never fails. Raw PCM is the universal
/// fallback when no capability matches.
pub fn negotiate(caps: &CapabilitySet, preference: &FormatPreference) -> NegotiatedFormat {
    match preference.kind {
        // Explicit raw PCM wins regardless of container support.
        PreferenceKind::RawPcm => {
            NegotiatedFormat::raw_pcm(preference.sample_rate, preference.channels)
        }

        PreferenceKind::Container(codec) if caps.supports_container(codec) => {
            NegotiatedFormat::container(codec, preference.sample_rate, preference.channels)
        }

        // Unsupported specific container degrades to auto selection.
        PreferenceKind::Container(_) | PreferenceKind::Auto => {
            match caps.container_codecs().first() {
                Some(&codec) => {
                    NegotiatedFormat::container(codec, preference.sample_rate, preference.channels)
                }
                None => NegotiatedFormat::raw_pcm(preference.sample_rate, preference.channels),
            }
        }
    }
}
