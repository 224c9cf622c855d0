// Tests for the wire event parser and control message encoding
//
// The parser is forward compatible: unknown event types are skipped, but
// malformed JSON or a known type with a bad payload is a protocol error.

use voicelink::{parse_event, AudioPayload, ControlMessage, RecordingParams, ServerEvent};

#[test]
fn test_parse_known_events() {
    let event = parse_event(r#"{"type":"speech_started"}"#).unwrap();
    assert!(matches!(event, Some(ServerEvent::SpeechStarted)));

    let event = parse_event(r#"{"type":"partial_asr","text":"hel"}"#).unwrap();
    match event {
        Some(ServerEvent::PartialAsr { text }) => assert_eq!(text, "hel"),
        other => panic!("Expected partial_asr, got {:?}", other),
    }

    let event = parse_event(r#"{"type":"ready","session_id":"abc-123"}"#).unwrap();
    match event {
        Some(ServerEvent::Ready { session_id }) => {
            assert_eq!(session_id.as_deref(), Some("abc-123"))
        }
        other => panic!("Expected ready, got {:?}", other),
    }

    // session_id is optional
    let event = parse_event(r#"{"type":"ready"}"#).unwrap();
    assert!(matches!(event, Some(ServerEvent::Ready { session_id: None })));
}

#[test]
fn test_parse_error_event() {
    let event = parse_event(r#"{"type":"error","message":"asr offline","code":"asr_down"}"#)
        .unwrap()
        .unwrap();

    match event {
        ServerEvent::Error { message, code } => {
            assert_eq!(message, "asr offline");
            assert_eq!(code.as_deref(), Some("asr_down"));
        }
        other => panic!("Expected error event, got {:?}", other),
    }
}

#[test]
fn test_unknown_event_type_is_skipped() {
    let event = parse_event(r#"{"type":"usage_report","tokens":512}"#).unwrap();
    assert!(event.is_none(), "Unknown event types must not break the client");
}

#[test]
fn test_malformed_json_is_a_protocol_error() {
    assert!(parse_event("{not json").is_err());
}

#[test]
fn test_missing_type_field_is_a_protocol_error() {
    assert!(parse_event(r#"{"text":"hello"}"#).is_err());
}

#[test]
fn test_bad_payload_for_known_type_is_a_protocol_error() {
    // partial_asr requires a text field
    assert!(parse_event(r#"{"type":"partial_asr"}"#).is_err());
    // error requires a message field
    assert!(parse_event(r#"{"type":"error"}"#).is_err());
}

#[test]
fn test_audio_payload_defaults_and_decode() {
    let raw = format!(
        r#"{{"type":"audio","data":"{}"}}"#,
        // "hello" in base64
        "aGVsbG8="
    );
    let event = parse_event(&raw).unwrap().unwrap();

    match event {
        ServerEvent::Audio(payload) => {
            assert_eq!(payload.format, "pcm16");
            assert_eq!(payload.sample_rate, 24000);
            assert_eq!(payload.channels, 1);
            assert_eq!(payload.timestamp, None);
            assert_eq!(payload.decode_data().unwrap(), b"hello");
        }
        other => panic!("Expected audio event, got {:?}", other),
    }
}

#[test]
fn test_audio_payload_explicit_fields() {
    let raw = r#"{"type":"audio","data":"AAA=","format":"wav","sample_rate":16000,"channels":2,"timestamp":42}"#;
    let event = parse_event(raw).unwrap().unwrap();

    match event {
        ServerEvent::Audio(payload) => {
            assert_eq!(payload.format, "wav");
            assert_eq!(payload.sample_rate, 16000);
            assert_eq!(payload.channels, 2);
            assert_eq!(payload.timestamp, Some(42));
        }
        other => panic!("Expected audio event, got {:?}", other),
    }
}

#[test]
fn test_invalid_base64_audio_data_fails_decode() {
    let raw = r#"{"type":"audio","data":"!!not base64!!"}"#;
    let event = parse_event(raw).unwrap().unwrap();

    let ServerEvent::Audio(payload) = event else {
        panic!("Expected audio event");
    };
    assert!(payload.decode_data().is_err());
}

#[test]
fn test_connection_lost_is_an_error_with_code() {
    let event = ServerEvent::connection_lost("io error");

    match event {
        ServerEvent::Error { message, code } => {
            assert!(message.contains("io error"));
            assert_eq!(code.as_deref(), Some("connection_lost"));
        }
        other => panic!("Expected error event, got {:?}", other),
    }
}

#[test]
fn test_start_recording_serialization() {
    let msg = ControlMessage::StartRecording {
        params: RecordingParams {
            language: "en-US".to_string(),
            voice: "default".to_string(),
            format: "pcm16".to_string(),
            sample_rate: 24000,
            channels: 1,
        },
    };

    let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["action"], "start_recording");
    assert_eq!(json["params"]["language"], "en-US");
    assert_eq!(json["params"]["format"], "pcm16");
    assert_eq!(json["params"]["sample_rate"], 24000);
}

#[test]
fn test_stop_recording_serialization() {
    let json: serde_json::Value =
        serde_json::to_value(&ControlMessage::StopRecording).unwrap();
    assert_eq!(json["action"], "stop_recording");
}

#[test]
fn test_text_input_serialization() {
    let msg = ControlMessage::TextInput {
        text: "what time is it".to_string(),
        language: "en-US".to_string(),
    };

    let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["action"], "text_input");
    assert_eq!(json["text"], "what time is it");
    assert_eq!(json["language"], "en-US");
}

#[test]
fn test_pong_omits_missing_payload() {
    let json: serde_json::Value =
        serde_json::to_value(&ControlMessage::Pong { payload: None }).unwrap();
    assert_eq!(json["action"], "pong");
    assert!(json.get("payload").is_none());

    let echoed = serde_json::json!({"seq": 7});
    let json: serde_json::Value = serde_json::to_value(&ControlMessage::Pong {
        payload: Some(echoed.clone()),
    })
    .unwrap();
    assert_eq!(json["payload"], echoed);
}

#[test]
fn test_audio_payload_standalone_deserialization() {
    let payload: AudioPayload =
        serde_json::from_str(r#"{"data":"AAAA"}"#).unwrap();
    assert_eq!(payload.sample_rate, 24000);
}
