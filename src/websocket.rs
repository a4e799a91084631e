//! # WebSocket Transcription Handler
//!
//! One actor per connection, driving the full task lifecycle over a
//! persistent duplex WebSocket. Clients connect to `/ws`, send a JSON start
//! command, stream binary PCM audio, and receive JSON result events until
//! they send a stop command.
//!
//! ## Protocol:
//! 1. **Start**: `StartTranscription` (primary) or `run-task` (legacy) opens
//!    a task; the gateway acknowledges with a started event.
//! 2. **Audio**: binary frames of 16-bit LE PCM, fragmented arbitrarily.
//! 3. **Results**: emitted whenever a completed chunk produces new text.
//! 4. **Stop**: `StopTranscription` / `finish-task` closes the task; the
//!    finished event is the last event for that task. The connection stays
//!    open and may start another task.
//!
//! ## Ordering:
//! The actor mailbox processes frames strictly in arrival order, and engine
//! calls run inline in the frame handler, so results for one connection can
//! never interleave out of order.

use crate::audio::AudioFramer;
use crate::protocol::formatter::{
    result_generated_event, task_finished_event, task_started_event, ResultFields,
};
use crate::protocol::parser::{parse_command, validate_task_id};
use crate::protocol::{Command, ProtocolFamily, StartOptions};
use crate::recognition::{RecognitionCache, RecognitionOptions};
use crate::session::SessionHandle;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long without any client frame before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// The task currently owned by this connection.
struct ActiveTask {
    task_id: String,
    protocol: ProtocolFamily,
    session: SessionHandle,
    framer: AudioFramer,
    options: RecognitionOptions,
}

/// WebSocket actor for one transcription connection.
pub struct TranscribeWebSocket {
    state: AppState,

    /// Task opened by the last start command, if any
    active: Option<ActiveTask>,

    /// Chunk duration handed to each new framer (ms)
    chunk_duration_ms: u32,

    /// Last time the client showed signs of life
    last_heartbeat: Instant,
}

impl TranscribeWebSocket {
    pub fn new(state: AppState) -> Self {
        let chunk_duration_ms = state.get_config().audio.chunk_duration_ms;
        Self {
            state,
            active: None,
            chunk_duration_ms,
            last_heartbeat: Instant::now(),
        }
    }

    /// Send an event to the client and count it.
    fn emit(&self, event: String, out: &mut dyn FnMut(String)) {
        if event.is_empty() {
            return;
        }
        self.state.record_event_emitted();
        out(event);
    }

    /// Decode and dispatch one text frame. Malformed frames and unknown
    /// commands were already logged by the parser and are ignored here.
    fn process_text_frame(&mut self, text: &str, out: &mut dyn FnMut(String)) {
        self.state.record_frame_received();

        let Some(command) = parse_command(text) else {
            return;
        };
        debug!(
            task_id = %command.task_id(),
            protocol = command.protocol().as_str(),
            "Command frame decoded"
        );

        match command {
            Command::Start {
                protocol,
                task_id,
                message_id,
                options,
            } => {
                debug!(message_id = ?message_id, "Start command received");
                self.handle_start(protocol, task_id, options, out);
            }
            Command::Stop {
                protocol,
                task_id,
                message_id,
            } => {
                debug!(message_id = ?message_id, "Stop command received");
                self.handle_stop(protocol, &task_id, out);
            }
        }
    }

    /// Open a task: create (or replace) the session, start the clock, and
    /// acknowledge with a started event.
    fn handle_start(
        &mut self,
        protocol: ProtocolFamily,
        task_id: String,
        options: StartOptions,
        out: &mut dyn FnMut(String),
    ) {
        if !validate_task_id(&task_id) {
            warn!(task_id = %task_id, "Invalid task id in start command, ignoring");
            return;
        }

        // A stale task from an earlier start on this connection is dropped;
        // a repeated start for the same id is handled by registry replacement.
        if let Some(old) = self.active.take() {
            if old.task_id != task_id {
                warn!(
                    old_task_id = %old.task_id,
                    new_task_id = %task_id,
                    "New start while another task is active, removing old session"
                );
                self.state.registry.remove(&old.task_id);
            }
        }

        info!(
            task_id = %task_id,
            protocol = protocol.as_str(),
            sample_rate = options.sample_rate,
            punctuation = options.punctuation_enabled,
            inverse_text_normalization = options.inverse_text_normalization,
            disfluency_removal = options.disfluency_removal,
            max_sentence_silence = options.max_sentence_silence,
            semantic_sentence_detection = options.semantic_sentence_detection,
            response_mode = %options.response_mode,
            "Starting transcription task"
        );

        let session = self.state.registry.create(
            &task_id,
            options.sample_rate,
            options.punctuation_enabled,
            options.response_mode,
        );
        session.lock().unwrap().start();
        self.state.record_session_created();

        let framer = AudioFramer::new(options.sample_rate, self.chunk_duration_ms);
        debug!(
            task_id = %task_id,
            chunk_size = framer.chunk_size(),
            "Audio framer ready"
        );
        let recognition_options = RecognitionOptions {
            response_mode: options.response_mode,
            punctuation_enabled: options.punctuation_enabled,
        };

        self.active = Some(ActiveTask {
            task_id: task_id.clone(),
            protocol,
            session,
            framer,
            options: recognition_options,
        });

        self.emit(task_started_event(&task_id, protocol), out);
    }

    /// Feed one binary frame through the framer and run every completed
    /// chunk through the engine, emitting a result event whenever the text
    /// changes.
    fn process_binary_frame(&mut self, data: &[u8], out: &mut dyn FnMut(String)) {
        self.state.record_frame_received();

        let Some(active) = self.active.as_mut() else {
            warn!(bytes = data.len(), "Audio received with no active task, discarding");
            return;
        };

        if !active.session.lock().unwrap().is_running() {
            warn!(
                task_id = %active.task_id,
                bytes = data.len(),
                "Audio received for a session that is not running, discarding"
            );
            return;
        }

        active.framer.add_audio(data);
        debug!(
            task_id = %active.task_id,
            bytes = data.len(),
            buffered_samples = active.framer.buffered_samples(),
            "Audio frame buffered"
        );

        let mut events = Vec::new();
        while let Some(chunk) = active.framer.next_chunk() {
            let cache = {
                let mut session = active.session.lock().unwrap();
                std::mem::replace(&mut session.cache, RecognitionCache::empty())
            };

            let output = self
                .state
                .engine
                .recognize(&chunk, cache, false, &active.options);

            for sentence in &output.sentences {
                debug!(
                    task_id = %active.task_id,
                    begin_time = sentence.begin_time,
                    end_time = sentence.end_time,
                    text = %sentence.text,
                    "Sentence span reported by engine"
                );
            }

            let mut session = active.session.lock().unwrap();
            session.cache = output.cache;

            if !output.text.is_empty() && output.text != session.last_text {
                session.update_result(&output.text, output.timestamps.clone());

                let words = if output.timestamps.is_empty() {
                    None
                } else {
                    Some(output.timestamps.as_slice())
                };
                let duration_ms = active.framer.duration_ms();
                events.push(result_generated_event(
                    active.protocol,
                    &ResultFields {
                        task_id: &active.task_id,
                        text: &output.text,
                        begin_time: 0,
                        end_time: Some(duration_ms),
                        sentence_end: output.is_final,
                        is_final: !output.is_partial,
                        words,
                        duration_ms: Some(duration_ms),
                        sentence_index: session.sentence_count,
                    },
                ));
            }
        }

        for event in events {
            self.emit(event, out);
        }
    }

    /// Close a task: the finished event is emitted before any finalize work
    /// so it is guaranteed to be the last event the client sees for this
    /// task. Trailing audio is drained through the engine afterwards, with
    /// the flushed text going to the log only.
    fn handle_stop(
        &mut self,
        protocol: ProtocolFamily,
        task_id: &str,
        out: &mut dyn FnMut(String),
    ) {
        let Some(session) = self.state.registry.get(task_id) else {
            warn!(task_id, "Stop for a task with no session, ignoring");
            return;
        };
        session.lock().unwrap().finish();

        self.emit(task_finished_event(task_id, protocol), out);

        let owns_task = self
            .active
            .as_ref()
            .map(|active| active.task_id == task_id)
            .unwrap_or(false);
        let drained = if owns_task {
            self.active.take().map(|mut active| {
                let leftover = active.framer.drain_all();
                let cache = {
                    let mut session = active.session.lock().unwrap();
                    std::mem::replace(&mut session.cache, RecognitionCache::empty())
                };
                (leftover, cache, active.options)
            })
        } else {
            None
        };

        match (protocol, drained) {
            // Primary clients wait for the finished event, so the session is
            // dropped and the drain runs inline without holding anything up.
            (ProtocolFamily::Primary, drained) => {
                self.state.registry.remove(task_id);
                if let Some((leftover, cache, options)) = drained {
                    Self::finalize_task(&self.state, task_id, leftover, cache, options);
                }
            }
            // Legacy clients close immediately after finished; the drain is
            // detached so a slow engine cannot stall the mailbox. The entry
            // stays registered (already marked finished, so audio for it is
            // inert) until the detached flush has run.
            (ProtocolFamily::Legacy, Some((leftover, cache, options))) => {
                let state = self.state.clone();
                let task_id = task_id.to_string();
                tokio::spawn(async move {
                    Self::finalize_task(&state, &task_id, leftover, cache, options);
                    state.registry.remove(&task_id);
                });
            }
            // A legacy stop for a task this connection never owned has no
            // audio to flush.
            (ProtocolFamily::Legacy, None) => {
                self.state.registry.remove(task_id);
            }
        }
    }

    /// Run trailing audio and the engine's flush for a closed task. Results
    /// are logged, never sent: the finished event has already gone out.
    fn finalize_task(
        state: &AppState,
        task_id: &str,
        leftover: Vec<f32>,
        cache: RecognitionCache,
        options: RecognitionOptions,
    ) {
        let cache = if leftover.is_empty() {
            cache
        } else {
            let output = state.engine.recognize(&leftover, cache, true, &options);
            if !output.text.is_empty() {
                info!(task_id, text = %output.text, "Drained trailing audio at task end");
            }
            output.cache
        };

        let output = state.engine.finalize(cache);
        if !output.text.is_empty() {
            info!(task_id, text = %output.text, "Engine flush at task end");
        }
    }

    /// Transport closed or failed: the owned session must not outlive the
    /// connection.
    fn handle_disconnect(&mut self) {
        if let Some(active) = self.active.take() {
            warn!(
                task_id = %active.task_id,
                "Connection closed with an active task, removing session"
            );
            self.state.registry.remove(&active.task_id);
        }
        self.state.websocket_disconnected();
    }
}

impl Actor for TranscribeWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection started");
        self.state.websocket_connected();

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection stopped");
        self.handle_disconnect();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TranscribeWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.process_text_frame(&text, &mut |event| ctx.text(event));
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                self.process_binary_frame(&data, &mut |event| ctx.text(event));
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(reason = ?reason, "WebSocket closed by client");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// HTTP-to-WebSocket upgrade handler for `/ws`.
pub async fn transcribe_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        peer = ?req.connection_info().peer_addr(),
        "New WebSocket connection request"
    );

    ws::start(
        TranscribeWebSocket::new(app_state.get_ref().clone()),
        &req,
        stream,
    )
}
