use tracing::warn;

use super::state::TurnState;
use crate::transport::ServerEvent;

/// Side effects a transition requests from the orchestrator.
///
/// The machine itself never touches hardware or the network; it only
/// mutates its own turn state and hands back a list of effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Release the capture engine and the microphone stream.
    StopCapture,
    /// Halt playback and discard queued chunks.
    StopPlayback,
    /// Tell the remote to stop its side of the turn.
    SendStopControl,
    /// Show this error to the user.
    SurfaceError(String),
    /// Telemetry: a new turn began.
    TurnStarted,
    /// Telemetry: first response fragment of the turn arrived.
    FirstResponse,
    /// Telemetry: the user spoke over an in-progress response.
    BargeIn,
}

/// Pure projection of remote turn-taking events onto local turn state.
///
/// Transitions for (state, event) pairs outside the table below leave the
/// machine where it is. In continuous mode a finished response re-arms
/// Listening instead of returning to Idle.
pub struct StateMachine {
    state: TurnState,
    transcript: String,
    response: String,
    continuous: bool,
    responded: bool,
}

impl StateMachine {
    pub fn new(continuous: bool) -> Self {
        Self {
            state: TurnState::Idle,
            transcript: String::new(),
            response: String::new(),
            continuous,
            responded: false,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn set_continuous(&mut self, continuous: bool) {
        self.continuous = continuous;
    }

    fn begin_turn(&mut self) {
        self.transcript.clear();
        self.response.clear();
        self.responded = false;
    }

    fn rest_state(&self) -> TurnState {
        if self.continuous {
            TurnState::Listening
        } else {
            TurnState::Idle
        }
    }

    /// Apply one inbound event.
    pub fn apply(&mut self, event: &ServerEvent) -> Vec<Effect> {
        match event {
            ServerEvent::SpeechStarted => {
                let mut effects = Vec::new();
                if self.state == TurnState::Speaking {
                    effects.push(Effect::StopPlayback);
                    effects.push(Effect::BargeIn);
                }
                self.begin_turn();
                self.state = TurnState::Listening;
                effects.push(Effect::TurnStarted);
                effects
            }

            // Latest partial replaces the previous one, never appends.
            ServerEvent::PartialAsr { text } => {
                if matches!(self.state, TurnState::Listening | TurnState::Processing) {
                    self.transcript = text.clone();
                }
                Vec::new()
            }

            ServerEvent::SpeechStopped => {
                if self.state == TurnState::Listening {
                    self.state = TurnState::Processing;
                }
                Vec::new()
            }

            ServerEvent::FinalAsr { text } => {
                self.transcript = text.clone();
                self.state = TurnState::Processing;
                Vec::new()
            }

            ServerEvent::AgentDelta { text } => {
                if matches!(self.state, TurnState::Processing | TurnState::Speaking) {
                    self.response.push_str(text);
                    self.state = TurnState::Speaking;
                    if !self.responded {
                        self.responded = true;
                        return vec![Effect::FirstResponse];
                    }
                }
                Vec::new()
            }

            ServerEvent::AgentFinal { text } => {
                self.response = text.clone();
                self.state = self.rest_state();
                Vec::new()
            }

            ServerEvent::MicOpened => {
                self.state = TurnState::Listening;
                Vec::new()
            }

            ServerEvent::MicClosed => {
                self.state = self.rest_state();
                vec![Effect::StopCapture]
            }

            // An error always aborts the current turn, whatever else is
            // pending.
            ServerEvent::Error { message, code } => {
                warn!("Turn aborted by error event: {} ({:?})", message, code);
                self.state = TurnState::Idle;
                vec![
                    Effect::StopCapture,
                    Effect::StopPlayback,
                    Effect::SurfaceError(message.clone()),
                ]
            }

            // Ready is orchestrator bookkeeping; audio routes to playback;
            // pings never leave the transport.
            ServerEvent::Ready { .. } | ServerEvent::Audio(_) | ServerEvent::Ping { .. } => {
                Vec::new()
            }
        }
    }

    /// Local stop intent. Valid from any state.
    pub fn apply_stop(&mut self) -> Vec<Effect> {
        self.state = TurnState::Idle;
        vec![Effect::StopCapture, Effect::SendStopControl]
    }

    /// Local listening intent (capture about to start).
    pub fn begin_listening(&mut self) {
        self.begin_turn();
        self.state = TurnState::Listening;
    }

    /// Local text input. No speech events will arrive, so the turn goes
    /// straight to Processing with the text as its transcript.
    pub fn begin_text_turn(&mut self, text: &str) {
        self.begin_turn();
        self.transcript = text.to_string();
        self.state = TurnState::Processing;
    }

    /// Clear accumulated transcript and response without changing state.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.response.clear();
    }
}
