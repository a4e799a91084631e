//! # Stub Recognition Backend
//!
//! Deterministic stand-in for a real streaming acoustic model, used in
//! development deployments and throughout the test suite. It keeps the
//! gateway end-to-end exercisable without model files: voiced chunks (RMS
//! energy above a small threshold) accumulate into placeholder segments,
//! silent chunks leave the transcript unchanged, and all decode state lives
//! in the [`RecognitionCache`] exactly as a real backend's would.
//!
//! The response mode shapes the output the way it shapes a real streaming
//! decoder: a segment closes once the mode's emission span worth of voiced
//! chunks has accumulated, so `fast` produces short frequent segments and
//! `accurate` fewer, longer ones. With punctuation enabled, final results
//! carry a closing period.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    RecognitionCache, RecognitionEngine, RecognitionOptions, RecognitionOutput, WordTiming,
};

/// RMS energy below which a chunk counts as silence.
const VOICE_THRESHOLD: f32 = 0.01;

/// Sample rate assumed when turning sample counts into word timings.
/// Timing precision is not a goal for the stub.
const ASSUMED_SAMPLE_RATE: u64 = 16000;

/// Decode state the stub round-trips through the opaque cache.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StubState {
    /// Samples consumed so far
    samples_seen: u64,
    /// Closed segments, with their timings
    words: Vec<WordTiming>,
    /// Voiced chunks accumulated toward the next segment
    voiced_pending: u64,
    /// Start offset (ms) of the segment being accumulated
    pending_begin_ms: Option<u64>,
}

impl StubState {
    fn transcript(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Close the segment under accumulation, if any, ending at `end_ms`.
    fn close_segment(&mut self, end_ms: u64) {
        if self.voiced_pending == 0 {
            return;
        }
        let begin_ms = self.pending_begin_ms.take().unwrap_or(end_ms);
        let token = format!("seg{}", self.words.len() + 1);
        self.words.push(WordTiming {
            text: token,
            begin_time: begin_ms,
            end_time: end_ms,
        });
        self.voiced_pending = 0;
    }
}

/// Development/test recognition backend.
pub struct StubEngine;

impl StubEngine {
    pub fn new() -> Self {
        Self
    }

    /// Decode the state carried in the cache; a corrupt cache is treated
    /// as fresh state, not an error.
    fn load_state(cache: &RecognitionCache) -> StubState {
        if cache.is_empty() {
            return StubState::default();
        }
        match serde_json::from_value(cache.clone().into_state()) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "Stub engine cache did not round-trip, starting fresh");
                StubState::default()
            }
        }
    }

    fn store_state(state: &StubState) -> RecognitionCache {
        match serde_json::to_value(state) {
            Ok(value) => RecognitionCache::from_state(value),
            Err(_) => RecognitionCache::empty(),
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionEngine for StubEngine {
    fn recognize(
        &self,
        samples: &[f32],
        cache: RecognitionCache,
        is_final: bool,
        options: &RecognitionOptions,
    ) -> RecognitionOutput {
        let mut state = Self::load_state(&cache);

        let begin_ms = state.samples_seen * 1000 / ASSUMED_SAMPLE_RATE;
        state.samples_seen += samples.len() as u64;
        let end_ms = state.samples_seen * 1000 / ASSUMED_SAMPLE_RATE;

        let energy = Self::rms(samples);
        if energy >= VOICE_THRESHOLD {
            if state.pending_begin_ms.is_none() {
                state.pending_begin_ms = Some(begin_ms);
            }
            state.voiced_pending += 1;

            let [_, emit_chunks, _] = options.response_mode.chunk_geometry();
            if state.voiced_pending >= emit_chunks as u64 {
                state.close_segment(end_ms);
                debug!(
                    energy,
                    mode = %options.response_mode,
                    segments = state.words.len(),
                    "Stub engine closed a voiced segment"
                );
            }
        }

        if is_final {
            state.close_segment(end_ms);
        }

        let mut text = state.transcript();
        if options.punctuation_enabled && is_final && !text.is_empty() {
            text.push('.');
        }

        RecognitionOutput {
            text,
            timestamps: state.words.clone(),
            sentences: Vec::new(),
            is_partial: !is_final,
            is_final,
            cache: Self::store_state(&state),
        }
    }

    fn finalize(&self, cache: RecognitionCache) -> RecognitionOutput {
        let mut state = Self::load_state(&cache);
        let end_ms = state.samples_seen * 1000 / ASSUMED_SAMPLE_RATE;
        state.close_segment(end_ms);

        RecognitionOutput {
            text: state.transcript(),
            timestamps: state.words.clone(),
            sentences: Vec::new(),
            is_partial: false,
            is_final: true,
            cache: RecognitionCache::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::ResponseMode;

    fn options() -> RecognitionOptions {
        RecognitionOptions {
            response_mode: ResponseMode::Fast,
            punctuation_enabled: false,
        }
    }

    fn voiced_chunk() -> Vec<f32> {
        vec![0.25_f32; 1600]
    }

    #[test]
    fn test_silence_yields_empty_text() {
        let engine = StubEngine::new();
        let out = engine.recognize(&[0.0; 1600], RecognitionCache::empty(), false, &options());

        assert_eq!(out.text, "");
        assert!(out.is_partial);
        assert!(out.timestamps.is_empty());
    }

    #[test]
    fn test_segments_close_after_mode_emission_span() {
        // Fast geometry is [0, 3, 1]: a segment closes every three voiced
        // chunks.
        let engine = StubEngine::new();
        let mut cache = RecognitionCache::empty();
        let mut text = String::new();

        for _ in 0..3 {
            let out = engine.recognize(&voiced_chunk(), cache, false, &options());
            cache = out.cache;
            text = out.text;
        }
        assert_eq!(text, "seg1");

        let mut out = engine.recognize(&voiced_chunk(), cache, false, &options());
        for _ in 0..2 {
            out = engine.recognize(&voiced_chunk(), out.cache, false, &options());
        }
        assert_eq!(out.text, "seg1 seg2");
        assert_eq!(out.timestamps.len(), 2);
        assert!(out.timestamps[1].begin_time >= out.timestamps[0].end_time);
    }

    #[test]
    fn test_accurate_mode_holds_segments_longer() {
        let engine = StubEngine::new();
        let accurate = RecognitionOptions {
            response_mode: ResponseMode::Accurate,
            punctuation_enabled: false,
        };

        let mut cache = RecognitionCache::empty();
        let mut text = String::new();
        for _ in 0..3 {
            let out = engine.recognize(&voiced_chunk(), cache, false, &accurate);
            cache = out.cache;
            text = out.text;
        }
        // Three voiced chunks close a segment under fast but not under
        // accurate, whose emission span is eight.
        assert_eq!(text, "");
    }

    #[test]
    fn test_finalize_flushes_pending_segment_and_clears_cache() {
        let engine = StubEngine::new();

        let out = engine.recognize(&voiced_chunk(), RecognitionCache::empty(), false, &options());
        assert_eq!(out.text, "");

        let finalized = engine.finalize(out.cache);
        assert_eq!(finalized.text, "seg1");
        assert!(finalized.is_final);
        assert!(finalized.cache.is_empty());
    }

    #[test]
    fn test_punctuation_appended_on_final_result() {
        let engine = StubEngine::new();
        let punctuated = RecognitionOptions {
            response_mode: ResponseMode::Fast,
            punctuation_enabled: true,
        };

        let out = engine.recognize(&voiced_chunk(), RecognitionCache::empty(), true, &punctuated);
        assert_eq!(out.text, "seg1.");
        assert!(out.is_final);

        // Partial results stay unpunctuated even when the model is on.
        let engine = StubEngine::new();
        let mut cache = RecognitionCache::empty();
        let mut text = String::new();
        for _ in 0..3 {
            let out = engine.recognize(&voiced_chunk(), cache, false, &punctuated);
            cache = out.cache;
            text = out.text;
        }
        assert_eq!(text, "seg1");
    }

    #[test]
    fn test_corrupt_cache_starts_fresh_instead_of_failing() {
        let engine = StubEngine::new();
        let corrupt = RecognitionCache::from_state(serde_json::json!({"samples_seen": "NaN"}));

        let out = engine.recognize(&[0.0; 100], corrupt, false, &options());
        assert_eq!(out.text, "");
    }
}
