//! # Recognition Engine Seam
//!
//! The gateway never touches an acoustic model directly. Everything it needs
//! from one is expressed by the [`RecognitionEngine`] trait: an incremental
//! `recognize` call fed fixed-size chunks, and a `finalize` call that flushes
//! any trailing partial decode at task end.
//!
//! ## Contract:
//! - Neither call fails. A backend converts its internal errors into an
//!   empty-text output that preserves the `is_final` input, so the
//!   orchestrator always has a result to act on.
//! - Incremental decode state lives in an opaque [`RecognitionCache`] passed
//!   by value into and out of every call. The engine must not retain hidden
//!   cross-session state, and a cache value is never shared across sessions.
//!
//! ## Backends:
//! - `stub`: deterministic, dependency-free stand-in used for development and
//!   in tests (see [`stub::StubEngine`]).

pub mod stub;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Latency/quality trade-off for incremental recognition.
///
/// Maps onto the streaming decoder's chunk geometry: how much audio is
/// consumed per emission and how much lookahead the encoder gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// ~180ms emission, 60ms lookahead
    Fast,
    /// ~300ms emission, 120ms lookahead
    Balanced,
    /// ~480ms emission, 240ms lookahead
    Accurate,
}

impl ResponseMode {
    /// Streaming chunk geometry `[pre, emit, lookahead]` for this mode,
    /// in 60ms decoder frames.
    pub fn chunk_geometry(&self) -> [usize; 3] {
        match self {
            ResponseMode::Fast => [0, 3, 1],
            ResponseMode::Balanced => [0, 5, 2],
            ResponseMode::Accurate => [0, 8, 4],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Fast => "fast",
            ResponseMode::Balanced => "balanced",
            ResponseMode::Accurate => "accurate",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(ResponseMode::Fast),
            "balanced" => Ok(ResponseMode::Balanced),
            "accurate" => Ok(ResponseMode::Accurate),
            other => Err(format!("Unknown response mode: {}", other)),
        }
    }
}

/// Opaque incremental-decode state owned by the engine.
///
/// The session holds this between chunk calls and round-trips it unchanged;
/// the gateway core never inspects or mutates the contained state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionCache(serde_json::Value);

impl RecognitionCache {
    /// Fresh cache for a new session (no decode state yet).
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    /// Wrap engine-owned state. Only backends should call this.
    pub fn from_state(state: serde_json::Value) -> Self {
        Self(state)
    }

    /// Unwrap the engine-owned state. Only backends should call this.
    pub fn into_state(self) -> serde_json::Value {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// Word-level timing attached to a recognition result (milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub text: String,
    pub begin_time: u64,
    pub end_time: u64,
}

/// Sentence-level segmentation reported by the engine, logged by the
/// orchestrator but not forwarded on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceSpan {
    pub begin_time: u64,
    pub end_time: u64,
    pub text: String,
}

/// Per-call options derived from the session's start parameters.
#[derive(Debug, Clone, Copy)]
pub struct RecognitionOptions {
    pub response_mode: ResponseMode,
    pub punctuation_enabled: bool,
}

/// Result of one incremental recognize or finalize call.
#[derive(Debug, Clone)]
pub struct RecognitionOutput {
    /// Recognized text for the current utterance (may be empty)
    pub text: String,

    /// Updated decode state, to be stored back on the session
    pub cache: RecognitionCache,

    /// Word timings for `text`, when the backend produces them
    pub timestamps: Vec<WordTiming>,

    /// Sentence segmentation, when the backend produces it
    pub sentences: Vec<SentenceSpan>,

    /// True while the utterance is still being revised
    pub is_partial: bool,

    /// True once the backend considers the utterance closed
    pub is_final: bool,
}

impl RecognitionOutput {
    /// Empty-text output used when a backend hits an internal error:
    /// the `is_final` input is preserved, the cache is passed back as-is.
    pub fn empty(cache: RecognitionCache, is_final: bool) -> Self {
        Self {
            text: String::new(),
            cache,
            timestamps: Vec::new(),
            sentences: Vec::new(),
            is_partial: !is_final,
            is_final,
        }
    }
}

/// Contract between the gateway and an acoustic model backend.
///
/// ## Threading:
/// One engine instance is shared across all connections; calls are made
/// inline from each connection's frame handler, so implementations must be
/// `Send + Sync` and keep all per-session state inside the cache.
pub trait RecognitionEngine: Send + Sync {
    /// Incrementally decode one chunk of normalized samples.
    fn recognize(
        &self,
        samples: &[f32],
        cache: RecognitionCache,
        is_final: bool,
        options: &RecognitionOptions,
    ) -> RecognitionOutput;

    /// Flush any trailing partial decode. Called at most once per task,
    /// at task end.
    fn finalize(&self, cache: RecognitionCache) -> RecognitionOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_mode_parsing() {
        assert_eq!("fast".parse::<ResponseMode>(), Ok(ResponseMode::Fast));
        assert_eq!(
            "balanced".parse::<ResponseMode>(),
            Ok(ResponseMode::Balanced)
        );
        assert_eq!(
            "accurate".parse::<ResponseMode>(),
            Ok(ResponseMode::Accurate)
        );
        assert!("realtime".parse::<ResponseMode>().is_err());
    }

    #[test]
    fn test_chunk_geometry_table() {
        assert_eq!(ResponseMode::Fast.chunk_geometry(), [0, 3, 1]);
        assert_eq!(ResponseMode::Balanced.chunk_geometry(), [0, 5, 2]);
        assert_eq!(ResponseMode::Accurate.chunk_geometry(), [0, 8, 4]);
    }

    #[test]
    fn test_empty_output_preserves_final_flag() {
        let out = RecognitionOutput::empty(RecognitionCache::empty(), true);
        assert!(out.text.is_empty());
        assert!(out.is_final);
        assert!(!out.is_partial);

        let out = RecognitionOutput::empty(RecognitionCache::empty(), false);
        assert!(!out.is_final);
        assert!(out.is_partial);
    }
}
