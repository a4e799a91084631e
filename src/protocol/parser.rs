//! # Command Parser
//!
//! Decodes inbound text frames into the uniform [`Command`] shape. The
//! protocol family is selected by inspecting the frame's selector fields:
//! `header.namespace` + `header.name` for the primary family,
//! `header.action` for the legacy family. Any other shape, or any decode
//! failure, yields `None` with a logged diagnostic — parse failures never
//! surface to the caller, and the orchestrator treats `None` as "ignore this
//! frame".

use crate::protocol::types::{
    Command, FinishTaskCommand, ProtocolFamily, RunTaskCommand, StartOptions,
    StartTranscriptionCommand, StopTranscriptionCommand, PRIMARY_NAMESPACE,
};
use serde_json::Value;
use tracing::{error, warn};

/// Minimum accepted task id length. A format floor on what clients may send,
/// not a guarantee about generated ids.
const MIN_TASK_ID_LEN: usize = 32;

/// Decode one text frame into a command, or `None` if it should be ignored.
pub fn parse_command(message: &str) -> Option<Command> {
    let data: Value = match serde_json::from_str(message) {
        Ok(data) => data,
        Err(err) => {
            error!(error = %err, "Failed to decode command frame as JSON");
            return None;
        }
    };

    let header = data.get("header");
    let field = |name: &str| {
        header
            .and_then(|h| h.get(name))
            .and_then(Value::as_str)
            .unwrap_or("")
    };

    if field("namespace") == PRIMARY_NAMESPACE {
        return match field("name") {
            "StartTranscription" => parse_start_transcription(&data),
            "StopTranscription" => parse_stop_transcription(&data),
            name => {
                warn!(name, "Unknown primary-protocol command name");
                None
            }
        };
    }

    match field("action") {
        "run-task" => parse_run_task(&data),
        "finish-task" => parse_finish_task(&data),
        action => {
            warn!(action, "Unknown action");
            None
        }
    }
}

fn parse_start_transcription(data: &Value) -> Option<Command> {
    match serde_json::from_value::<StartTranscriptionCommand>(data.clone()) {
        Ok(command) => Some(Command::Start {
            protocol: ProtocolFamily::Primary,
            options: StartOptions::from(&command.payload),
            task_id: command.header.task_id,
            message_id: Some(command.header.message_id),
        }),
        Err(err) => {
            error!(error = %err, "Failed to parse StartTranscription command");
            None
        }
    }
}

fn parse_stop_transcription(data: &Value) -> Option<Command> {
    match serde_json::from_value::<StopTranscriptionCommand>(data.clone()) {
        Ok(command) => Some(Command::Stop {
            protocol: ProtocolFamily::Primary,
            task_id: command.header.task_id,
            message_id: Some(command.header.message_id),
        }),
        Err(err) => {
            error!(error = %err, "Failed to parse StopTranscription command");
            None
        }
    }
}

fn parse_run_task(data: &Value) -> Option<Command> {
    match serde_json::from_value::<RunTaskCommand>(data.clone()) {
        Ok(command) => Some(Command::Start {
            protocol: ProtocolFamily::Legacy,
            options: StartOptions::from(&command.payload.parameters),
            task_id: command.header.task_id,
            message_id: None,
        }),
        Err(err) => {
            error!(error = %err, "Failed to parse run-task command");
            None
        }
    }
}

fn parse_finish_task(data: &Value) -> Option<Command> {
    match serde_json::from_value::<FinishTaskCommand>(data.clone()) {
        Ok(command) => Some(Command::Stop {
            protocol: ProtocolFamily::Legacy,
            task_id: command.header.task_id,
            message_id: None,
        }),
        Err(err) => {
            error!(error = %err, "Failed to parse finish-task command");
            None
        }
    }
}

/// Structural validation of a client-supplied task id.
///
/// Rejects empty strings and anything shorter than 32 characters; no
/// uniqueness or character-set check is performed.
pub fn validate_task_id(task_id: &str) -> bool {
    !task_id.is_empty() && task_id.len() >= MIN_TASK_ID_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::ResponseMode;

    fn task_id() -> String {
        "f".repeat(32)
    }

    #[test]
    fn test_parse_start_transcription() {
        let frame = serde_json::json!({
            "header": {
                "message_id": "a".repeat(32),
                "task_id": task_id(),
                "namespace": "SpeechTranscriber",
                "name": "StartTranscription"
            },
            "payload": {
                "sample_rate": 8000,
                "enable_punctuation_prediction": true,
                "max_sentence_silence": 500,
                "response_mode": "accurate"
            }
        });

        let command = parse_command(&frame.to_string()).expect("should parse");
        match command {
            Command::Start {
                protocol,
                task_id: id,
                message_id,
                options,
            } => {
                assert_eq!(protocol, ProtocolFamily::Primary);
                assert_eq!(id, task_id());
                assert_eq!(message_id, Some("a".repeat(32)));
                assert_eq!(options.sample_rate, 8000);
                assert!(options.punctuation_enabled);
                assert_eq!(options.max_sentence_silence, 500);
                assert_eq!(options.response_mode, ResponseMode::Accurate);
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_start_transcription_defaults() {
        let frame = serde_json::json!({
            "header": {
                "message_id": "b".repeat(32),
                "task_id": task_id(),
                "namespace": "SpeechTranscriber",
                "name": "StartTranscription"
            },
            "payload": {}
        });

        match parse_command(&frame.to_string()).expect("should parse") {
            Command::Start { options, .. } => {
                assert_eq!(options.sample_rate, 16000);
                assert!(!options.punctuation_enabled);
                assert_eq!(options.response_mode, ResponseMode::Fast);
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_stop_transcription() {
        let frame = serde_json::json!({
            "header": {
                "message_id": "c".repeat(32),
                "task_id": task_id(),
                "namespace": "SpeechTranscriber",
                "name": "StopTranscription"
            }
        });

        match parse_command(&frame.to_string()).expect("should parse") {
            Command::Stop {
                protocol,
                task_id: id,
                ..
            } => {
                assert_eq!(protocol, ProtocolFamily::Primary);
                assert_eq!(id, task_id());
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_legacy_run_task() {
        let frame = serde_json::json!({
            "header": {
                "action": "run-task",
                "task_id": task_id(),
                "streaming": "duplex"
            },
            "payload": {
                "task_group": "audio",
                "task": "asr",
                "function": "recognition",
                "model": "paraformer-realtime-v2",
                "parameters": { "sample_rate": 16000 },
                "input": {}
            }
        });

        match parse_command(&frame.to_string()).expect("should parse") {
            Command::Start {
                protocol,
                message_id,
                options,
                ..
            } => {
                assert_eq!(protocol, ProtocolFamily::Legacy);
                assert_eq!(message_id, None);
                // Legacy defaults differ from the primary family's
                assert!(options.punctuation_enabled);
                assert_eq!(options.response_mode, ResponseMode::Balanced);
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_legacy_finish_task() {
        let frame = serde_json::json!({
            "header": { "action": "finish-task", "task_id": task_id() },
            "payload": { "input": {} }
        });

        match parse_command(&frame.to_string()).expect("should parse") {
            Command::Stop { protocol, .. } => assert_eq!(protocol, ProtocolFamily::Legacy),
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_shapes_yield_none() {
        assert!(parse_command("not json at all").is_none());
        assert!(parse_command("{\"header\":{\"action\":\"pause-task\"}}").is_none());
        assert!(parse_command("{\"kind\":\"ping\"}").is_none());
        // Right namespace, unknown command name
        let frame = serde_json::json!({
            "header": { "namespace": "SpeechTranscriber", "name": "PauseTranscription" }
        });
        assert!(parse_command(&frame.to_string()).is_none());
    }

    #[test]
    fn test_validate_task_id_length_floor() {
        assert!(!validate_task_id(""));
        assert!(!validate_task_id("short"));
        assert!(!validate_task_id(&"x".repeat(31)));
        assert!(validate_task_id(&"x".repeat(32)));
        assert!(validate_task_id(&"x".repeat(64)));
    }
}
