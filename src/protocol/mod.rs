//! # Protocol Translation Module
//!
//! The gateway speaks two mutually exclusive wire protocols over the same
//! WebSocket connection type:
//!
//! - **Primary**: session-oriented `SpeechTranscriber` commands and events
//!   (`StartTranscription` / `StopTranscription` in,
//!   `TranscriptionStarted` / `TranscriptionResultChanged` / `SentenceEnd` /
//!   `TranscriptionCompleted` out)
//! - **Legacy**: task-oriented `run-task` / `finish-task` commands and
//!   `task-started` / `result-generated` / `task-finished` events
//!
//! Exactly one family is used per connection, selected by whichever command
//! first establishes a session. Inbound frames are decoded into one uniform
//! [`Command`](types::Command) shape before dispatch; outbound events are
//! produced from one internal result representation by the formatter.
//!
//! ## Key Components:
//! - **types**: serde structs for both wire families + the internal command
//! - **parser**: selector-based command decoding and task id validation
//! - **formatter**: pure event encoding for both families

pub mod formatter;
pub mod parser;
pub mod types;

pub use types::{Command, ProtocolFamily, StartOptions};
