pub mod events;
pub mod session;

pub use events::{parse_event, AudioPayload, ControlMessage, RecordingParams, ServerEvent};
pub use session::{ConnectionState, TransportSession};
