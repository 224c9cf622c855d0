// Tests for the turn-taking state machine
//
// The machine is a pure projection of remote events onto local turn state,
// so every scenario here is a sequence of events and an assertion on the
// resulting state, accumulated text, and requested effects.

use voicelink::transport::ServerEvent;
use voicelink::{Effect, StateMachine, TurnState};

fn speech_started() -> ServerEvent {
    ServerEvent::SpeechStarted
}

fn partial(text: &str) -> ServerEvent {
    ServerEvent::PartialAsr {
        text: text.to_string(),
    }
}

fn final_asr(text: &str) -> ServerEvent {
    ServerEvent::FinalAsr {
        text: text.to_string(),
    }
}

fn delta(text: &str) -> ServerEvent {
    ServerEvent::AgentDelta {
        text: text.to_string(),
    }
}

#[test]
fn test_full_voice_turn_accumulates_transcript() {
    let mut machine = StateMachine::new(false);

    machine.apply(&speech_started());
    assert_eq!(machine.state(), TurnState::Listening);

    machine.apply(&partial("hel"));
    assert_eq!(machine.transcript(), "hel");

    // Partials replace, never append
    machine.apply(&partial("hello"));
    assert_eq!(machine.transcript(), "hello");

    machine.apply(&ServerEvent::SpeechStopped);
    assert_eq!(machine.state(), TurnState::Processing);

    machine.apply(&final_asr("hello there"));
    assert_eq!(machine.transcript(), "hello there");
    assert_eq!(machine.state(), TurnState::Processing);
}

#[test]
fn test_agent_deltas_append_and_enter_speaking() {
    let mut machine = StateMachine::new(false);
    machine.apply(&speech_started());
    machine.apply(&ServerEvent::SpeechStopped);

    let effects = machine.apply(&delta("Hi"));
    assert_eq!(machine.state(), TurnState::Speaking);
    assert_eq!(machine.response(), "Hi");
    assert_eq!(effects, vec![Effect::FirstResponse]);

    let effects = machine.apply(&delta(" there"));
    assert_eq!(machine.response(), "Hi there");
    assert!(
        effects.is_empty(),
        "FirstResponse fires only on the first fragment of a turn"
    );
}

#[test]
fn test_agent_final_is_authoritative() {
    let mut machine = StateMachine::new(false);
    machine.apply(&speech_started());
    machine.apply(&ServerEvent::SpeechStopped);
    machine.apply(&delta("Hi ther"));

    machine.apply(&ServerEvent::AgentFinal {
        text: "Hi there!".to_string(),
    });

    assert_eq!(machine.response(), "Hi there!");
    assert_eq!(machine.state(), TurnState::Idle);
}

#[test]
fn test_agent_final_rearms_listening_in_continuous_mode() {
    let mut machine = StateMachine::new(true);
    machine.apply(&speech_started());
    machine.apply(&ServerEvent::SpeechStopped);
    machine.apply(&delta("Hi"));

    machine.apply(&ServerEvent::AgentFinal {
        text: "Hi".to_string(),
    });

    assert_eq!(
        machine.state(),
        TurnState::Listening,
        "Continuous mode re-arms for the next turn"
    );
}

#[test]
fn test_barge_in_interrupts_playback() {
    let mut machine = StateMachine::new(true);
    machine.apply(&speech_started());
    machine.apply(&ServerEvent::SpeechStopped);
    machine.apply(&delta("Long answer"));
    assert_eq!(machine.state(), TurnState::Speaking);

    let effects = machine.apply(&speech_started());

    assert_eq!(machine.state(), TurnState::Listening);
    assert!(effects.contains(&Effect::StopPlayback));
    assert!(effects.contains(&Effect::BargeIn));
    assert!(effects.contains(&Effect::TurnStarted));
    assert_eq!(machine.response(), "", "A new turn clears the old response");
    assert_eq!(machine.transcript(), "");
}

#[test]
fn test_speech_started_without_playback_is_not_barge_in() {
    let mut machine = StateMachine::new(false);

    let effects = machine.apply(&speech_started());

    assert_eq!(effects, vec![Effect::TurnStarted]);
}

#[test]
fn test_new_turn_clears_previous_text() {
    let mut machine = StateMachine::new(true);
    machine.apply(&speech_started());
    machine.apply(&final_asr("first question"));
    machine.apply(&delta("first answer"));
    machine.apply(&ServerEvent::AgentFinal {
        text: "first answer".to_string(),
    });

    machine.apply(&speech_started());

    assert_eq!(machine.transcript(), "");
    assert_eq!(machine.response(), "");

    let effects = machine.apply(&delta("second"));
    // Delta while Listening is out of order and ignored
    assert!(effects.is_empty());
    assert_eq!(machine.response(), "");
}

#[test]
fn test_unlisted_pairs_leave_state_unchanged() {
    let mut machine = StateMachine::new(false);

    // All of these are out of order from Idle
    machine.apply(&partial("ignored"));
    assert_eq!(machine.transcript(), "");
    assert_eq!(machine.state(), TurnState::Idle);

    machine.apply(&ServerEvent::SpeechStopped);
    assert_eq!(machine.state(), TurnState::Idle);

    machine.apply(&delta("ignored"));
    assert_eq!(machine.response(), "");
    assert_eq!(machine.state(), TurnState::Idle);
}

#[test]
fn test_ready_audio_and_ping_are_inert() {
    let mut machine = StateMachine::new(false);
    machine.apply(&speech_started());

    let before = machine.state();
    assert!(machine
        .apply(&ServerEvent::Ready { session_id: None })
        .is_empty());
    assert!(machine.apply(&ServerEvent::Ping { payload: None }).is_empty());
    assert_eq!(machine.state(), before);
}

#[test]
fn test_error_aborts_the_turn() {
    let mut machine = StateMachine::new(true);
    machine.apply(&speech_started());
    machine.apply(&ServerEvent::SpeechStopped);
    machine.apply(&delta("partial answ"));

    let effects = machine.apply(&ServerEvent::Error {
        message: "asr backend unavailable".to_string(),
        code: None,
    });

    assert_eq!(machine.state(), TurnState::Idle);
    assert!(effects.contains(&Effect::StopCapture));
    assert!(effects.contains(&Effect::StopPlayback));
    assert!(effects.contains(&Effect::SurfaceError(
        "asr backend unavailable".to_string()
    )));
}

#[test]
fn test_connection_lost_behaves_like_an_error() {
    let mut machine = StateMachine::new(true);
    machine.apply(&speech_started());

    let effects = machine.apply(&ServerEvent::connection_lost("peer reset"));

    assert_eq!(machine.state(), TurnState::Idle);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::SurfaceError(_))));
}

#[test]
fn test_local_stop_from_any_state() {
    for setup in 0..3 {
        let mut machine = StateMachine::new(true);
        if setup >= 1 {
            machine.apply(&speech_started());
        }
        if setup >= 2 {
            machine.apply(&ServerEvent::SpeechStopped);
        }

        let effects = machine.apply_stop();

        assert_eq!(machine.state(), TurnState::Idle);
        assert_eq!(effects, vec![Effect::StopCapture, Effect::SendStopControl]);
    }
}

#[test]
fn test_text_turn_skips_listening() {
    let mut machine = StateMachine::new(false);

    machine.begin_text_turn("what time is it");

    assert_eq!(machine.state(), TurnState::Processing);
    assert_eq!(machine.transcript(), "what time is it");

    let effects = machine.apply(&delta("It is"));
    assert_eq!(effects, vec![Effect::FirstResponse]);
    assert_eq!(machine.state(), TurnState::Speaking);
}

#[test]
fn test_mic_closed_stops_capture() {
    let mut machine = StateMachine::new(false);
    machine.begin_listening();

    let effects = machine.apply(&ServerEvent::MicClosed);

    assert_eq!(machine.state(), TurnState::Idle);
    assert_eq!(effects, vec![Effect::StopCapture]);

    machine.set_continuous(true);
    machine.begin_listening();
    machine.apply(&ServerEvent::MicClosed);
    assert_eq!(
        machine.state(),
        TurnState::Listening,
        "Continuous mode stays armed after a remote mic close"
    );
}

#[test]
fn test_clear_keeps_state() {
    let mut machine = StateMachine::new(true);
    machine.apply(&speech_started());
    machine.apply(&final_asr("question"));
    machine.apply(&delta("answer"));

    let state = machine.state();
    machine.clear();

    assert_eq!(machine.transcript(), "");
    assert_eq!(machine.response(), "");
    assert_eq!(machine.state(), state);
}
