pub mod backend;
pub mod capability;
pub mod capture;
pub mod format;
pub mod playback;

pub use backend::{
    BackendConfig, CaptureBackend, CaptureBackendFactory, CaptureSource, SampleBlock,
};
pub use capability::{CapabilitySet, ContainerCodec};
pub use capture::{AudioFrame, CaptureEngine, CaptureOptions, FormatTag, FrameQueue};
pub use format::{negotiate, FormatPreference, NegotiatedFormat, PreferenceKind, TransportKind};
pub use playback::{decode_chunk, DecodedPcm, PlaybackEngine};
