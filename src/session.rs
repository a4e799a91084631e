//! # Session State and Registry
//!
//! A *task* is the unit of work a client requests transcription for; a
//! *session* is the gateway's live state for one task: lifecycle stage,
//! recognition options, the engine's opaque decode cache, and result
//! bookkeeping carried across chunk calls.
//!
//! ## Lifecycle:
//! Idle -> Running (on start command) -> Finished (on stop/finish command),
//! removed from the registry right after the finished event is emitted.
//! Audio is only forwarded to the engine while the stage is Running.
//!
//! ## Sharing:
//! The registry map is the only state shared across connections. Map
//! mutation is serialized behind one RwLock; individual sessions are handed
//! out as `Arc<Mutex<SessionState>>` — exactly one connection owns a given
//! task id in normal operation, so per-session lock contention does not
//! occur.

use crate::recognition::{RecognitionCache, ResponseMode, WordTiming};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{info, warn};

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// Created, start not yet processed
    Idle,
    /// Actively accepting audio
    Running,
    /// Stop processed; awaiting removal
    Finished,
}

impl SessionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::Idle => "idle",
            SessionStage::Running => "running",
            SessionStage::Finished => "finished",
        }
    }
}

/// Mutable per-task state carried across chunk calls.
#[derive(Debug)]
pub struct SessionState {
    pub task_id: String,
    pub stage: SessionStage,
    pub sample_rate: u32,
    pub punctuation_enabled: bool,
    pub response_mode: ResponseMode,

    /// Opaque incremental-decode state owned by the recognition engine,
    /// round-tripped unchanged through every recognize call
    pub cache: RecognitionCache,

    /// Last text emitted for this task; duplicate consecutive results are
    /// suppressed against it
    pub last_text: String,

    /// Word timings from the last emitted result
    pub last_timestamps: Vec<WordTiming>,

    start_time: Option<Instant>,
    end_time: Option<Instant>,

    /// Number of distinct results emitted so far
    pub sentence_count: u64,
}

impl SessionState {
    pub fn new(
        task_id: String,
        sample_rate: u32,
        punctuation_enabled: bool,
        response_mode: ResponseMode,
    ) -> Self {
        Self {
            task_id,
            stage: SessionStage::Idle,
            sample_rate,
            punctuation_enabled,
            response_mode,
            cache: RecognitionCache::empty(),
            last_text: String::new(),
            last_timestamps: Vec::new(),
            start_time: None,
            end_time: None,
            sentence_count: 0,
        }
    }

    /// Transition to Running and start the session clock.
    pub fn start(&mut self) {
        self.stage = SessionStage::Running;
        self.start_time = Some(Instant::now());
        info!(
            task_id = %self.task_id,
            sample_rate = self.sample_rate,
            punctuation_enabled = self.punctuation_enabled,
            response_mode = %self.response_mode,
            "Session started"
        );
    }

    /// Transition to Finished and stop the session clock.
    pub fn finish(&mut self) {
        self.stage = SessionStage::Finished;
        self.end_time = Some(Instant::now());
        info!(
            task_id = %self.task_id,
            total_duration_ms = self.duration_ms(),
            sentences_processed = self.sentence_count,
            "Session finished"
        );
    }

    pub fn is_running(&self) -> bool {
        self.stage == SessionStage::Running
    }

    pub fn is_finished(&self) -> bool {
        self.stage == SessionStage::Finished
    }

    /// Record a new recognition result. A no-op when the text matches the
    /// last emitted result; otherwise updates the cached text/timestamps and
    /// bumps the sentence counter.
    pub fn update_result(&mut self, text: &str, timestamps: Vec<WordTiming>) {
        if text != self.last_text {
            self.last_text = text.to_string();
            self.last_timestamps = timestamps;
            self.sentence_count += 1;
        }
    }

    /// Wall-clock session duration in milliseconds (start to finish, or to
    /// now while still running).
    pub fn duration_ms(&self) -> u64 {
        match self.start_time {
            Some(start) => {
                let end = self
                    .end_time
                    .map(|e| e.duration_since(start))
                    .unwrap_or_else(|| start.elapsed());
                end.as_millis() as u64
            }
            None => 0,
        }
    }

    /// Return to a pristine Idle state, discarding all per-task bookkeeping.
    pub fn reset(&mut self) {
        self.stage = SessionStage::Idle;
        self.cache = RecognitionCache::empty();
        self.last_text.clear();
        self.last_timestamps.clear();
        self.start_time = None;
        self.end_time = None;
        self.sentence_count = 0;
    }
}

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Owns the task id -> session map shared across all connections.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session for a task id. Always succeeds: an existing entry
    /// for the same id is replaced, which is a logged event rather than an
    /// error (the replaced session's state is discarded).
    pub fn create(
        &self,
        task_id: &str,
        sample_rate: u32,
        punctuation_enabled: bool,
        response_mode: ResponseMode,
    ) -> SessionHandle {
        let mut sessions = self.sessions.write().unwrap();

        if let Some(existing) = sessions.get(task_id) {
            let stage = existing.lock().unwrap().stage;
            warn!(
                task_id,
                previous_stage = stage.as_str(),
                "Session already exists, replacing"
            );
        }

        let session = Arc::new(Mutex::new(SessionState::new(
            task_id.to_string(),
            sample_rate,
            punctuation_enabled,
            response_mode,
        )));
        sessions.insert(task_id.to_string(), session.clone());

        info!(
            task_id,
            sample_rate,
            punctuation_enabled,
            response_mode = %response_mode,
            active_sessions = sessions.len(),
            "Created new session"
        );

        session
    }

    pub fn get(&self, task_id: &str) -> Option<SessionHandle> {
        self.sessions.read().unwrap().get(task_id).cloned()
    }

    /// Remove a session; returns false (with a warning) when absent.
    pub fn remove(&self, task_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.remove(task_id) {
            Some(session) => {
                let (stage, duration_ms) = {
                    let session = session.lock().unwrap();
                    (session.stage, session.duration_ms())
                };
                info!(
                    task_id,
                    final_stage = stage.as_str(),
                    total_duration_ms = duration_ms,
                    remaining_sessions = sessions.len(),
                    "Removed session"
                );
                true
            }
            None => {
                warn!(task_id, "Attempted to remove non-existent session");
                false
            }
        }
    }

    /// Total sessions currently registered, in any stage.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Snapshot of the sessions currently in the Running stage.
    pub fn active_sessions(&self) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.lock().unwrap().is_running())
            .cloned()
            .collect()
    }

    /// Snapshot of all registered task ids.
    pub fn task_ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_id() -> String {
        "s".repeat(32)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut session =
            SessionState::new(task_id(), 16000, true, ResponseMode::Balanced);
        assert_eq!(session.stage, SessionStage::Idle);
        assert!(!session.is_running());

        session.start();
        assert!(session.is_running());

        session.finish();
        assert!(session.is_finished());
        assert!(!session.is_running());
    }

    #[test]
    fn test_update_result_suppresses_duplicates() {
        let mut session = SessionState::new(task_id(), 16000, false, ResponseMode::Fast);
        session.start();

        for text in ["h", "he", "he", "hello"] {
            session.update_result(text, Vec::new());
        }

        assert_eq!(session.sentence_count, 3);
        assert_eq!(session.last_text, "hello");
    }

    #[test]
    fn test_reset_discards_bookkeeping() {
        let mut session = SessionState::new(task_id(), 16000, false, ResponseMode::Fast);
        session.start();
        session.update_result("hello", Vec::new());
        session.finish();

        session.reset();
        assert_eq!(session.stage, SessionStage::Idle);
        assert_eq!(session.sentence_count, 0);
        assert!(session.last_text.is_empty());
        assert!(session.cache.is_empty());
        assert_eq!(session.duration_ms(), 0);
    }

    #[test]
    fn test_registry_create_get_remove() {
        let registry = SessionRegistry::new();
        let id = task_id();

        let session = registry.create(&id, 16000, true, ResponseMode::Balanced);
        session.lock().unwrap().start();

        assert!(registry.get(&id).is_some());
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.active_sessions().len(), 1);

        assert!(registry.remove(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.remove(&id));
    }

    #[test]
    fn test_create_replaces_existing_entry() {
        let registry = SessionRegistry::new();
        let id = task_id();

        let first = registry.create(&id, 16000, true, ResponseMode::Balanced);
        first.lock().unwrap().start();
        first.lock().unwrap().update_result("old text", Vec::new());

        // Second start for the same task id: no error, prior state discarded
        let second = registry.create(&id, 8000, false, ResponseMode::Fast);
        assert_eq!(registry.session_count(), 1);

        let replacement = registry.get(&id).expect("entry should exist");
        assert!(Arc::ptr_eq(&replacement, &second));
        let state = replacement.lock().unwrap();
        assert_eq!(state.sample_rate, 8000);
        assert_eq!(state.sentence_count, 0);
        assert!(state.last_text.is_empty());
    }

    #[test]
    fn test_active_sessions_excludes_non_running() {
        let registry = SessionRegistry::new();
        let running_id = "r".repeat(32);
        let idle_id = "i".repeat(32);

        registry
            .create(&running_id, 16000, false, ResponseMode::Fast)
            .lock()
            .unwrap()
            .start();
        registry.create(&idle_id, 16000, false, ResponseMode::Fast);

        let active = registry.active_sessions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].lock().unwrap().task_id, running_id);
        assert_eq!(registry.session_count(), 2);
    }
}
