use thiserror::Error;

/// Error taxonomy for the voice pipeline.
///
/// Hardware and decode errors are handled at their component boundary and
/// surface only as state transitions; connection errors propagate to the
/// orchestrator, which owns the recovery affordances.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// User declined microphone access. Recoverable by re-prompting,
    /// never retried automatically.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Hardware or capture failure. Aborts the current turn; the session
    /// stays connected if the transport is healthy.
    #[error("audio device error: {0}")]
    Device(String),

    /// Transport failed to establish or dropped. Reconnection is an
    /// explicit orchestrator action, never a silent retry.
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed inbound structured event. Logged and ignored unless it
    /// indicates a fatal desync.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A single playback chunk failed to decode. Skip that chunk only.
    #[error("audio decode error: {0}")]
    Decode(String),
}

impl VoiceError {
    /// Whether this error must move the session to Disconnected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VoiceError::Connection(_))
    }
}
