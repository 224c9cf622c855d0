pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use audio::{
    negotiate, AudioFrame, BackendConfig, CapabilitySet, CaptureBackend, CaptureBackendFactory,
    CaptureEngine, CaptureOptions, CaptureSource, ContainerCodec, FormatPreference, FormatTag,
    FrameQueue, NegotiatedFormat, PlaybackEngine, PreferenceKind, SampleBlock, TransportKind,
};
pub use config::Config;
pub use error::VoiceError;
pub use http::{create_router, AppState};
pub use session::{
    Effect, SessionConfig, SessionOrchestrator, SessionSnapshot, StateMachine, TurnState,
};
pub use telemetry::{TelemetryEvent, TelemetrySink};
pub use transport::{
    parse_event, AudioPayload, ConnectionState, ControlMessage, RecordingParams, ServerEvent,
    TransportSession,
};
