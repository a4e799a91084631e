//! # Event Formatter
//!
//! Pure, deterministic encoding of the gateway's three event shapes —
//! started, result, finished — into either wire family. Both families carry
//! the same semantic payload with different field layouts; the orchestrator
//! supplies one internal representation and names the family.
//!
//! The only non-determinism is the fresh 32-character message id generated
//! per primary-protocol event (unrelated to any task or session id). These
//! functions never fail: the caller contract guarantees task_id and text are
//! always supplied, and encoding the plain data types here cannot error.

use crate::protocol::types::{
    EmptyPayload, LegacyEventHeader, LegacyWordInfo, OutputInfo, PrimaryEventHeader,
    ProtocolFamily, ResultChangedPayload, ResultGeneratedEvent, ResultGeneratedPayload,
    SentenceEndEvent, SentenceEndPayload, SentenceInfo, TaskFinishedEvent, TaskStartedEvent,
    TranscriptionCompletedEvent, TranscriptionResultChangedEvent, TranscriptionStartedEvent,
    TranscriptionStartedPayload, UsageInfo, WordInfo, SUCCESS_STATUS,
};
use crate::recognition::WordTiming;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// Fresh random 32-character hex identifier.
pub fn generate_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Semantic payload of a result event, shared by both wire layouts.
#[derive(Debug, Clone)]
pub struct ResultFields<'a> {
    pub task_id: &'a str,
    pub text: &'a str,
    /// Utterance start offset (ms)
    pub begin_time: u64,
    /// Utterance end offset (ms); legacy layout only
    pub end_time: Option<u64>,
    /// Whether this result closes a sentence
    pub sentence_end: bool,
    /// Whether the engine considers the utterance final
    pub is_final: bool,
    /// Word timings, when the engine produced them
    pub words: Option<&'a [WordTiming]>,
    /// Elapsed audio duration for the task (ms)
    pub duration_ms: Option<u64>,
    /// Monotonically increasing per-session sentence counter
    pub sentence_index: u64,
}

/// Acknowledge task acceptance.
///
/// Primary form carries a newly generated session id; legacy form carries
/// empty attributes.
pub fn task_started_event(task_id: &str, protocol: ProtocolFamily) -> String {
    match protocol {
        ProtocolFamily::Primary => encode(&TranscriptionStartedEvent {
            header: PrimaryEventHeader::new(
                generate_message_id(),
                task_id,
                "TranscriptionStarted",
            ),
            payload: TranscriptionStartedPayload {
                session_id: generate_message_id(),
            },
        }),
        ProtocolFamily::Legacy => encode(&TaskStartedEvent {
            header: LegacyEventHeader::new(task_id, "task-started"),
            payload: EmptyPayload {},
        }),
    }
}

/// Encode a recognition result.
///
/// The primary family splits the two sub-cases into distinct events
/// (`TranscriptionResultChanged` vs. `SentenceEnd`); the legacy family uses
/// one shape distinguished by the `sentence_end` and `is_final` flags.
pub fn result_generated_event(protocol: ProtocolFamily, fields: &ResultFields) -> String {
    match protocol {
        ProtocolFamily::Primary if !fields.sentence_end => {
            encode(&TranscriptionResultChangedEvent {
                header: PrimaryEventHeader::new(
                    generate_message_id(),
                    fields.task_id,
                    "TranscriptionResultChanged",
                ),
                payload: ResultChangedPayload {
                    index: fields.sentence_index,
                    time: fields.duration_ms.unwrap_or(0),
                    result: fields.text.to_string(),
                    words: fields.words.map(primary_words),
                },
            })
        }
        ProtocolFamily::Primary => encode(&SentenceEndEvent {
            header: PrimaryEventHeader::new(generate_message_id(), fields.task_id, "SentenceEnd"),
            payload: SentenceEndPayload {
                index: fields.sentence_index,
                time: fields.duration_ms.unwrap_or(0),
                begin_time: fields.begin_time,
                result: fields.text.to_string(),
                confidence: None,
                words: fields.words.map(primary_words),
                status: SUCCESS_STATUS,
                stash_result: None,
            },
        }),
        ProtocolFamily::Legacy => encode(&ResultGeneratedEvent {
            header: LegacyEventHeader::new(fields.task_id, "result-generated"),
            payload: ResultGeneratedPayload {
                output: OutputInfo {
                    sentence: SentenceInfo {
                        begin_time: fields.begin_time,
                        end_time: fields.end_time,
                        text: fields.text.to_string(),
                        sentence_end: fields.sentence_end,
                        is_final: fields.is_final,
                        words: fields.words.map(legacy_words),
                    },
                },
                usage: fields.duration_ms.map(|duration| UsageInfo { duration }),
            },
        }),
    }
}

/// Terminal event for a task; empty payload in both families.
pub fn task_finished_event(task_id: &str, protocol: ProtocolFamily) -> String {
    match protocol {
        ProtocolFamily::Primary => encode(&TranscriptionCompletedEvent {
            header: PrimaryEventHeader::new(
                generate_message_id(),
                task_id,
                "TranscriptionCompleted",
            ),
            payload: EmptyPayload {},
        }),
        ProtocolFamily::Legacy => encode(&TaskFinishedEvent {
            header: LegacyEventHeader::new(task_id, "task-finished"),
            payload: EmptyPayload {},
        }),
    }
}

fn primary_words(words: &[WordTiming]) -> Vec<WordInfo> {
    words
        .iter()
        .map(|w| WordInfo {
            text: w.text.clone(),
            start_time: w.begin_time,
            end_time: w.end_time,
        })
        .collect()
}

fn legacy_words(words: &[WordTiming]) -> Vec<LegacyWordInfo> {
    words
        .iter()
        .map(|w| LegacyWordInfo {
            begin_time: w.begin_time,
            end_time: w.end_time,
            text: w.text.clone(),
            punctuation: String::new(),
        })
        .collect()
}

// Serialization of these plain structs cannot fail in practice; the fallback
// keeps the formatter contract (no error reaches the caller) if it ever does.
fn encode<T: Serialize>(event: &T) -> String {
    match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            error!(error = %err, "Failed to encode outbound event");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn task_id() -> String {
        "t".repeat(32)
    }

    fn fields<'a>(text: &'a str, task_id: &'a str) -> ResultFields<'a> {
        ResultFields {
            task_id,
            text,
            begin_time: 0,
            end_time: Some(1200),
            sentence_end: false,
            is_final: false,
            words: None,
            duration_ms: Some(1200),
            sentence_index: 2,
        }
    }

    #[test]
    fn test_message_id_is_32_hex_chars() {
        let id = generate_message_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_message_id());
    }

    #[test]
    fn test_primary_started_event_shape() {
        let id = task_id();
        let event: Value =
            serde_json::from_str(&task_started_event(&id, ProtocolFamily::Primary)).unwrap();

        assert_eq!(event["header"]["task_id"], id.as_str());
        assert_eq!(event["header"]["namespace"], "SpeechTranscriber");
        assert_eq!(event["header"]["name"], "TranscriptionStarted");
        assert_eq!(event["header"]["status"], 20000000);
        assert_eq!(event["header"]["status_message"], "GATEWAY|SUCCESS|Success.");
        assert_eq!(
            event["payload"]["session_id"].as_str().unwrap().len(),
            32
        );
    }

    #[test]
    fn test_legacy_started_event_shape() {
        let id = task_id();
        let event: Value =
            serde_json::from_str(&task_started_event(&id, ProtocolFamily::Legacy)).unwrap();

        assert_eq!(event["header"]["task_id"], id.as_str());
        assert_eq!(event["header"]["event"], "task-started");
        assert_eq!(event["header"]["attributes"], serde_json::json!({}));
        assert_eq!(event["payload"], serde_json::json!({}));
    }

    #[test]
    fn test_primary_result_changed_vs_sentence_end() {
        let id = task_id();

        let changed: Value = serde_json::from_str(&result_generated_event(
            ProtocolFamily::Primary,
            &fields("hello", &id),
        ))
        .unwrap();
        assert_eq!(changed["header"]["name"], "TranscriptionResultChanged");
        assert_eq!(changed["payload"]["index"], 2);
        assert_eq!(changed["payload"]["time"], 1200);
        assert_eq!(changed["payload"]["result"], "hello");
        assert!(changed["payload"].get("begin_time").is_none());

        let mut sentence_fields = fields("hello.", &id);
        sentence_fields.sentence_end = true;
        sentence_fields.is_final = true;
        let ended: Value = serde_json::from_str(&result_generated_event(
            ProtocolFamily::Primary,
            &sentence_fields,
        ))
        .unwrap();
        assert_eq!(ended["header"]["name"], "SentenceEnd");
        assert_eq!(ended["payload"]["begin_time"], 0);
        assert_eq!(ended["payload"]["status"], 20000000);
    }

    #[test]
    fn test_legacy_result_event_shape() {
        let id = task_id();
        let words = vec![WordTiming {
            text: "hi".to_string(),
            begin_time: 0,
            end_time: 300,
        }];
        let mut f = fields("hi", &id);
        f.words = Some(&words);

        let event: Value =
            serde_json::from_str(&result_generated_event(ProtocolFamily::Legacy, &f)).unwrap();

        assert_eq!(event["header"]["event"], "result-generated");
        let sentence = &event["payload"]["output"]["sentence"];
        assert_eq!(sentence["text"], "hi");
        assert_eq!(sentence["sentence_end"], false);
        assert_eq!(sentence["is_final"], false);
        assert_eq!(sentence["end_time"], 1200);
        assert_eq!(sentence["words"][0]["begin_time"], 0);
        assert_eq!(sentence["words"][0]["punctuation"], "");
        assert_eq!(event["payload"]["usage"]["duration"], 1200);
    }

    #[test]
    fn test_word_layouts_differ_between_families() {
        let id = task_id();
        let words = vec![WordTiming {
            text: "word".to_string(),
            begin_time: 60,
            end_time: 240,
        }];
        let mut f = fields("word", &id);
        f.words = Some(&words);

        let primary = result_generated_event(ProtocolFamily::Primary, &f);
        assert!(primary.contains("\"startTime\":60"));
        assert!(primary.contains("\"endTime\":240"));

        let legacy = result_generated_event(ProtocolFamily::Legacy, &f);
        assert!(legacy.contains("\"begin_time\":60"));
        assert!(legacy.contains("\"end_time\":240"));
    }

    #[test]
    fn test_finished_events_have_empty_payloads() {
        let id = task_id();

        let primary: Value =
            serde_json::from_str(&task_finished_event(&id, ProtocolFamily::Primary)).unwrap();
        assert_eq!(primary["header"]["name"], "TranscriptionCompleted");
        assert_eq!(primary["payload"], serde_json::json!({}));

        let legacy: Value =
            serde_json::from_str(&task_finished_event(&id, ProtocolFamily::Legacy)).unwrap();
        assert_eq!(legacy["header"]["event"], "task-finished");
        assert_eq!(legacy["payload"], serde_json::json!({}));
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let id = task_id();
        let mut f = fields("x", &id);
        f.end_time = None;
        f.duration_ms = None;

        let legacy = result_generated_event(ProtocolFamily::Legacy, &f);
        assert!(!legacy.contains("usage"));
        assert!(!legacy.contains("null"));

        let primary = result_generated_event(ProtocolFamily::Primary, &f);
        assert!(!primary.contains("null"));
    }

    /// Formatting a result then re-decoding the documented wire shape
    /// reproduces task_id, text, and sentence index exactly.
    #[test]
    fn test_result_event_round_trip() {
        use crate::protocol::types::{ResultGeneratedEvent, TranscriptionResultChangedEvent};

        let id = task_id();
        let f = fields("round trip", &id);

        let primary: TranscriptionResultChangedEvent = serde_json::from_str(
            &result_generated_event(ProtocolFamily::Primary, &f),
        )
        .unwrap();
        assert_eq!(primary.header.task_id, id);
        assert_eq!(primary.payload.result, "round trip");
        assert_eq!(primary.payload.index, 2);

        let legacy: ResultGeneratedEvent =
            serde_json::from_str(&result_generated_event(ProtocolFamily::Legacy, &f)).unwrap();
        assert_eq!(legacy.header.task_id, id);
        assert_eq!(legacy.payload.output.sentence.text, "round trip");
    }
}
