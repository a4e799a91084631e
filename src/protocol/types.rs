//! # Wire Message Types
//!
//! serde models for the two protocol families, plus the uniform internal
//! command the orchestrator dispatches on. The wire structs mirror the
//! documented shapes field-for-field; defaults match what clients are allowed
//! to omit. Absent optional fields are omitted on output, never emitted as
//! null.

use crate::recognition::ResponseMode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespace selector for the primary protocol family.
pub const PRIMARY_NAMESPACE: &str = "SpeechTranscriber";

/// Status code carried by every primary-protocol event header.
pub const SUCCESS_STATUS: u32 = 20000000;

/// Status message carried by every primary-protocol event header.
pub const SUCCESS_MESSAGE: &str = "GATEWAY|SUCCESS|Success.";

fn default_pcm() -> String {
    "pcm".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_true() -> bool {
    true
}

fn default_max_sentence_silence() -> u32 {
    800
}

fn default_fast() -> ResponseMode {
    ResponseMode::Fast
}

fn default_balanced() -> ResponseMode {
    ResponseMode::Balanced
}

fn default_duplex() -> String {
    "duplex".to_string()
}

// ---------------------------------------------------------------------------
// Primary protocol: inbound commands
// ---------------------------------------------------------------------------

/// Header shared by primary-protocol commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryCommandHeader {
    pub message_id: String,
    pub task_id: String,
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appkey: Option<String>,
}

/// `StartTranscription` payload. Every field a client may omit carries the
/// documented default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTranscriptionPayload {
    #[serde(default = "default_pcm")]
    pub format: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub enable_intermediate_result: bool,
    #[serde(default)]
    pub enable_punctuation_prediction: bool,
    #[serde(default)]
    pub enable_inverse_text_normalization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary_id: Option<String>,
    #[serde(default = "default_max_sentence_silence")]
    pub max_sentence_silence: u32,
    #[serde(default)]
    pub enable_words: bool,
    #[serde(default)]
    pub disfluency: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_noise_threshold: Option<f64>,
    #[serde(default)]
    pub enable_semantic_sentence_detection: bool,
    #[serde(default = "default_fast")]
    pub response_mode: ResponseMode,
}

impl Default for StartTranscriptionPayload {
    fn default() -> Self {
        // A payload of `{}` decodes to exactly these values
        serde_json::from_value(Value::Object(Map::new()))
            .unwrap_or_else(|_| unreachable!("all fields carry defaults"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTranscriptionCommand {
    pub header: PrimaryCommandHeader,
    #[serde(default)]
    pub payload: StartTranscriptionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTranscriptionCommand {
    pub header: PrimaryCommandHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

// ---------------------------------------------------------------------------
// Primary protocol: outbound events
// ---------------------------------------------------------------------------

/// Header shared by all primary-protocol events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryEventHeader {
    pub message_id: String,
    pub task_id: String,
    pub namespace: String,
    pub name: String,
    pub status: u32,
    pub status_message: String,
}

impl PrimaryEventHeader {
    pub fn new(message_id: String, task_id: &str, name: &str) -> Self {
        Self {
            message_id,
            task_id: task_id.to_string(),
            namespace: PRIMARY_NAMESPACE.to_string(),
            name: name.to_string(),
            status: SUCCESS_STATUS,
            status_message: SUCCESS_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionStartedPayload {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionStartedEvent {
    pub header: PrimaryEventHeader,
    pub payload: TranscriptionStartedPayload,
}

/// Word timing in the primary family's camelCase layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordInfo {
    pub text: String,
    #[serde(rename = "startTime")]
    pub start_time: u64,
    #[serde(rename = "endTime")]
    pub end_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultChangedPayload {
    pub index: u64,
    pub time: u64,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResultChangedEvent {
    pub header: PrimaryEventHeader,
    pub payload: ResultChangedPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashResult {
    #[serde(rename = "sentenceId")]
    pub sentence_id: u64,
    #[serde(rename = "beginTime")]
    pub begin_time: u64,
    pub text: String,
    #[serde(rename = "currentTime")]
    pub current_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceEndPayload {
    pub index: u64,
    pub time: u64,
    pub begin_time: u64,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordInfo>>,
    pub status: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stash_result: Option<StashResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceEndEvent {
    pub header: PrimaryEventHeader,
    pub payload: SentenceEndPayload,
}

/// Serializes to `{}`; the terminal event carries no payload fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionCompletedEvent {
    pub header: PrimaryEventHeader,
    pub payload: EmptyPayload,
}

// ---------------------------------------------------------------------------
// Legacy protocol: inbound commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTaskHeader {
    pub action: String,
    pub task_id: String,
    #[serde(default = "default_duplex")]
    pub streaming: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTaskParameters {
    #[serde(default = "default_pcm")]
    pub format: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_hints: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub punctuation_prediction_enabled: bool,
    #[serde(default = "default_true")]
    pub inverse_text_normalization_enabled: bool,
    #[serde(default = "default_balanced")]
    pub response_mode: ResponseMode,
}

impl Default for RunTaskParameters {
    fn default() -> Self {
        serde_json::from_value(Value::Object(Map::new()))
            .unwrap_or_else(|_| unreachable!("all fields carry defaults"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTaskPayload {
    #[serde(default)]
    pub task_group: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub parameters: RunTaskParameters,
    #[serde(default)]
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTaskCommand {
    pub header: RunTaskHeader,
    pub payload: RunTaskPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishTaskHeader {
    pub action: String,
    pub task_id: String,
    #[serde(default = "default_duplex")]
    pub streaming: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinishTaskPayload {
    #[serde(default)]
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishTaskCommand {
    pub header: FinishTaskHeader,
    #[serde(default)]
    pub payload: FinishTaskPayload,
}

// ---------------------------------------------------------------------------
// Legacy protocol: outbound events
// ---------------------------------------------------------------------------

/// Header shared by all legacy-protocol events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyEventHeader {
    pub task_id: String,
    pub event: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl LegacyEventHeader {
    pub fn new(task_id: &str, event: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            event: event.to_string(),
            attributes: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStartedEvent {
    pub header: LegacyEventHeader,
    pub payload: EmptyPayload,
}

/// Word timing in the legacy family's snake_case layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyWordInfo {
    pub begin_time: u64,
    pub end_time: u64,
    pub text: String,
    #[serde(default)]
    pub punctuation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceInfo {
    pub begin_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    pub text: String,
    pub sentence_end: bool,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<LegacyWordInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputInfo {
    pub sentence: SentenceInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageInfo {
    pub duration: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultGeneratedPayload {
    pub output: OutputInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultGeneratedEvent {
    pub header: LegacyEventHeader,
    pub payload: ResultGeneratedPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFinishedEvent {
    pub header: LegacyEventHeader,
    pub payload: EmptyPayload,
}

// ---------------------------------------------------------------------------
// Internal command representation
// ---------------------------------------------------------------------------

/// Which wire family a connection is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    Primary,
    Legacy,
}

impl ProtocolFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolFamily::Primary => "primary",
            ProtocolFamily::Legacy => "legacy",
        }
    }
}

/// Recognition options decoded from a start command, normalized across
/// families.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOptions {
    pub sample_rate: u32,
    pub punctuation_enabled: bool,
    pub inverse_text_normalization: bool,
    pub disfluency_removal: bool,
    pub max_sentence_silence: u32,
    pub semantic_sentence_detection: bool,
    pub response_mode: ResponseMode,
}

impl From<&StartTranscriptionPayload> for StartOptions {
    fn from(payload: &StartTranscriptionPayload) -> Self {
        Self {
            sample_rate: payload.sample_rate,
            punctuation_enabled: payload.enable_punctuation_prediction,
            inverse_text_normalization: payload.enable_inverse_text_normalization,
            disfluency_removal: payload.disfluency,
            max_sentence_silence: payload.max_sentence_silence,
            semantic_sentence_detection: payload.enable_semantic_sentence_detection,
            response_mode: payload.response_mode,
        }
    }
}

impl From<&RunTaskParameters> for StartOptions {
    fn from(parameters: &RunTaskParameters) -> Self {
        Self {
            sample_rate: parameters.sample_rate,
            punctuation_enabled: parameters.punctuation_prediction_enabled,
            inverse_text_normalization: parameters.inverse_text_normalization_enabled,
            disfluency_removal: false,
            max_sentence_silence: default_max_sentence_silence(),
            semantic_sentence_detection: false,
            response_mode: parameters.response_mode,
        }
    }
}

/// Uniform command shape produced by the parser for both families.
#[derive(Debug, Clone)]
pub enum Command {
    /// Start a new transcription task on this connection
    Start {
        protocol: ProtocolFamily,
        task_id: String,
        message_id: Option<String>,
        options: StartOptions,
    },
    /// Finish the named task
    Stop {
        protocol: ProtocolFamily,
        task_id: String,
        message_id: Option<String>,
    },
}

impl Command {
    pub fn task_id(&self) -> &str {
        match self {
            Command::Start { task_id, .. } | Command::Stop { task_id, .. } => task_id,
        }
    }

    pub fn protocol(&self) -> ProtocolFamily {
        match self {
            Command::Start { protocol, .. } | Command::Stop { protocol, .. } => *protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_payload_defaults() {
        let payload = StartTranscriptionPayload::default();
        assert_eq!(payload.format, "pcm");
        assert_eq!(payload.sample_rate, 16000);
        assert!(!payload.enable_punctuation_prediction);
        assert_eq!(payload.max_sentence_silence, 800);
        assert_eq!(payload.response_mode, ResponseMode::Fast);
    }

    #[test]
    fn test_run_task_parameter_defaults() {
        let parameters = RunTaskParameters::default();
        assert_eq!(parameters.sample_rate, 16000);
        assert!(parameters.punctuation_prediction_enabled);
        assert!(parameters.inverse_text_normalization_enabled);
        assert_eq!(parameters.response_mode, ResponseMode::Balanced);
    }

    #[test]
    fn test_empty_payload_serializes_to_braces() {
        assert_eq!(serde_json::to_string(&EmptyPayload {}).unwrap(), "{}");
    }

    #[test]
    fn test_word_info_uses_camel_case_times() {
        let word = WordInfo {
            text: "hello".to_string(),
            start_time: 120,
            end_time: 480,
        };
        let json = serde_json::to_string(&word).unwrap();
        assert!(json.contains("\"startTime\":120"));
        assert!(json.contains("\"endTime\":480"));
    }

    #[test]
    fn test_optional_words_omitted_not_null() {
        let payload = ResultChangedPayload {
            index: 1,
            time: 0,
            result: "hi".to_string(),
            words: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("words"));
        assert!(!json.contains("null"));
    }
}
