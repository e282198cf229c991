use super::config::SessionContext;
use super::messages::{ClientMessage, ServerMessage, WordStatus};
use super::state::{ScriptProgress, SessionPhase, SessionState};
use super::stats::SessionStats;
use super::transport::{Inbound, OutboundSink};
use crate::alignment::Aligner;
use crate::asr::{handler_fn, AsrError, AsrEvent, AsrEventHandler, AsrStream, TranscriptEvent};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

type OpenTask = JoinHandle<Result<Box<dyn AsrStream>, AsrError>>;

/// What woke the dispatch loop
enum LoopEvent {
    Inbound(Option<Inbound>),
    StreamOpened(Result<Box<dyn AsrStream>, AsrError>),
    StreamFailed(AsrError),
}

/// Why the dispatch loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    Requested,
    Disconnected,
    AsrFailed,
}

/// Applies transcript events to the shared session state.
///
/// The speech recognizer invokes this from its own task; every update and
/// the snapshot it produces happen under the session lock.
#[derive(Clone)]
struct TranscriptHandler {
    state: Arc<Mutex<SessionState>>,
    aligner: Arc<Aligner>,
    outbound: OutboundSink,
    failures: mpsc::UnboundedSender<AsrError>,
}

impl TranscriptHandler {
    fn into_event_handler(self) -> AsrEventHandler {
        handler_fn(move |event| {
            let handler = self.clone();
            async move { handler.on_event(event).await }
        })
    }

    async fn on_event(&self, event: AsrEvent) {
        match event {
            AsrEvent::Transcript(transcript) => self.on_transcript(transcript).await,
            AsrEvent::Failed(e) => {
                let _ = self.failures.send(e);
            }
            AsrEvent::Closed => {
                if self.state.lock().await.is_ended() {
                    debug!("Speech recognition stream closed");
                } else {
                    // Closed by the provider while the session still needs it
                    let _ = self.failures.send(AsrError::Closed);
                }
            }
        }
    }

    async fn on_transcript(&self, transcript: TranscriptEvent) {
        let mut state = self.state.lock().await;

        if state.is_ended() {
            return;
        }
        if state.paused {
            state.stats.transcripts_discarded += 1;
            debug!("Paused, discarding transcript: {}", transcript.text);
            return;
        }

        let words = transcript.words();
        let Some(progress) = state.progress.as_mut() else {
            return;
        };

        let result = progress.align(&self.aligner, &words);
        let confirmed = progress.apply(&result);
        let cursor = progress.cursor();
        let total_confirmed = progress.confirmed_count();
        let snapshot = progress.snapshot();

        state.stats.transcripts_processed += 1;
        state.stats.words_confirmed = total_confirmed;

        debug!(
            "Transcript '{}' (final={}): {} new confirmations, cursor at {}",
            transcript.text, transcript.is_final, confirmed, cursor
        );

        // Queued while still holding the lock so snapshots leave in processing order
        if self.outbound.send(ServerMessage::Transcript { payload: snapshot }) {
            state.stats.snapshots_sent += 1;
        } else {
            debug!("Client connection gone, snapshot dropped");
        }
    }
}

/// Read-only view of a running session
#[derive(Clone)]
pub struct SessionObserver {
    state: Arc<Mutex<SessionState>>,
}

impl SessionObserver {
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn cursor(&self) -> Option<usize> {
        self.state.lock().await.progress.as_ref().map(|p| p.cursor())
    }

    pub async fn snapshot(&self) -> Option<Vec<WordStatus>> {
        self.state.lock().await.progress.as_ref().map(|p| p.snapshot())
    }

    pub async fn stats(&self) -> SessionStats {
        self.state.lock().await.stats.clone()
    }
}

/// Drives one client connection: control messages, audio forwarding,
/// speech recognition and confirmation snapshots.
pub struct ReciteSession {
    id: Uuid,
    context: SessionContext,
    state: Arc<Mutex<SessionState>>,
    outbound: OutboundSink,

    /// Open speech recognition stream, once ready
    stream: Option<Box<dyn AsrStream>>,

    /// Audio received before the stream was ready, in arrival order
    pending_frames: VecDeque<Bytes>,

    failures_tx: mpsc::UnboundedSender<AsrError>,
    failures_rx: Option<mpsc::UnboundedReceiver<AsrError>>,

    transport_closed: bool,
}

impl ReciteSession {
    pub fn new(context: SessionContext, outbound: OutboundSink) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        Self {
            id: Uuid::new_v4(),
            context,
            state: Arc::new(Mutex::new(SessionState::new())),
            outbound,
            stream: None,
            pending_frames: VecDeque::new(),
            failures_tx,
            failures_rx: Some(failures_rx),
            transport_closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn observer(&self) -> SessionObserver {
        SessionObserver {
            state: Arc::clone(&self.state),
        }
    }

    /// Run the session until the client ends it, disconnects, or speech
    /// recognition fails. `inbound` is the only reader of the connection.
    pub async fn run<S>(&mut self, inbound: S) -> SessionStats
    where
        S: Stream<Item = Inbound> + Unpin + Send,
    {
        let span = info_span!("session", session_id = %self.id);
        self.dispatch(inbound).instrument(span).await
    }

    async fn dispatch<S>(&mut self, mut inbound: S) -> SessionStats
    where
        S: Stream<Item = Inbound> + Unpin + Send,
    {
        info!("Session started");

        let mut opening: Option<OpenTask> = None;
        let Some(mut failures) = self.failures_rx.take() else {
            warn!("Session already ran");
            return self.stats().await;
        };

        let reason = loop {
            let event = tokio::select! {
                unit = inbound.next() => LoopEvent::Inbound(unit),
                opened = wait_for_stream(&mut opening) => LoopEvent::StreamOpened(opened),
                Some(e) = failures.recv() => LoopEvent::StreamFailed(e),
            };

            match event {
                LoopEvent::Inbound(Some(Inbound::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Script { payload }) => {
                            if let Some(task) = self.load_script(&payload).await {
                                opening = Some(task);
                            }
                        }
                        Ok(ClientMessage::Pause) => self.set_paused(true).await,
                        Ok(ClientMessage::Resume) => self.set_paused(false).await,
                        Ok(ClientMessage::End) => {
                            info!("Session end requested");
                            break EndReason::Requested;
                        }
                        Err(e) => warn!("Ignoring malformed control message: {}", e),
                    }
                }
                LoopEvent::Inbound(Some(Inbound::Binary(frame))) => self.handle_audio(frame).await,
                LoopEvent::Inbound(None) => {
                    info!("Client disconnected");
                    break EndReason::Disconnected;
                }
                LoopEvent::StreamOpened(Ok(stream)) => {
                    opening = None;
                    self.on_stream_ready(stream).await;
                }
                LoopEvent::StreamOpened(Err(e)) => {
                    opening = None;
                    error!("Failed to open speech recognition stream: {}", e);
                    self.notify_error(format!("Speech recognition unavailable: {e}"));
                    break EndReason::AsrFailed;
                }
                LoopEvent::StreamFailed(e) => {
                    error!("Speech recognition stream failed: {}", e);
                    self.notify_error(format!("Speech recognition failed: {e}"));
                    break EndReason::AsrFailed;
                }
            }
        };

        if let Some(task) = opening.take() {
            task.abort();
        }

        debug!("Dispatch loop stopped: {:?}", reason);
        self.end().await;
        self.stats().await
    }

    async fn load_script(&mut self, payload: &str) -> Option<OpenTask> {
        {
            let mut state = self.state.lock().await;
            if state.phase != SessionPhase::Idle {
                warn!("Script already loaded (phase {:?}), ignoring", state.phase);
                return None;
            }

            let progress = ScriptProgress::new(payload);
            info!("Received script with {} words", progress.len());
            state.stats.script_words = progress.len();
            state.progress = Some(progress);
            state.phase = SessionPhase::ScriptLoaded;
        }

        let handler = TranscriptHandler {
            state: Arc::clone(&self.state),
            aligner: Arc::clone(&self.context.aligner),
            outbound: self.outbound.clone(),
            failures: self.failures_tx.clone(),
        }
        .into_event_handler();

        let asr = Arc::clone(&self.context.asr);
        let options = self.context.stream_options.clone();
        info!("Opening {} speech recognition stream", asr.provider());

        Some(tokio::spawn(
            async move { asr.open(options, handler).await }.in_current_span(),
        ))
    }

    async fn on_stream_ready(&mut self, stream: Box<dyn AsrStream>) {
        {
            let mut state = self.state.lock().await;
            if state.is_ended() {
                return;
            }
            state.phase = if state.paused {
                SessionPhase::Paused
            } else {
                SessionPhase::Streaming
            };
            info!("Speech recognition ready, phase {:?}", state.phase);
        }

        self.stream = Some(stream);

        if !self.pending_frames.is_empty() {
            debug!("Forwarding {} held audio frames", self.pending_frames.len());
        }
        while let Some(frame) = self.pending_frames.pop_front() {
            self.forward(frame).await;
        }
    }

    async fn set_paused(&mut self, paused: bool) {
        let mut state = self.state.lock().await;
        match state.phase {
            SessionPhase::Idle | SessionPhase::Ended => {
                let command = if paused { "pause" } else { "resume" };
                warn!("Ignoring {} in phase {:?}", command, state.phase);
            }
            SessionPhase::ScriptLoaded => {
                state.paused = paused;
            }
            SessionPhase::Streaming | SessionPhase::Paused => {
                state.paused = paused;
                state.phase = if paused {
                    SessionPhase::Paused
                } else {
                    SessionPhase::Streaming
                };
                info!("Session {}", if paused { "paused" } else { "resumed" });
            }
        }
    }

    async fn handle_audio(&mut self, frame: Bytes) {
        let phase = {
            let mut state = self.state.lock().await;
            state.stats.frames_received += 1;
            state.phase
        };

        match phase {
            // Paused sessions keep feeding the recognizer so it stays warm
            SessionPhase::Streaming | SessionPhase::Paused => self.forward(frame).await,
            SessionPhase::ScriptLoaded => {
                if self.pending_frames.len() >= self.context.config.max_pending_frames {
                    warn!("Pending audio buffer full, dropping oldest frame");
                    self.pending_frames.pop_front();
                }
                self.pending_frames.push_back(frame);
            }
            SessionPhase::Idle => {
                debug!("No script loaded, dropping {} byte audio frame", frame.len())
            }
            SessionPhase::Ended => {}
        }
    }

    async fn forward(&mut self, frame: Bytes) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let len = frame.len();
        let result = stream.send(frame).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                state.stats.frames_forwarded += 1;
                debug!("Forwarded {} byte audio frame", len);
            }
            Err(e) => {
                state.stats.frame_send_failures += 1;
                warn!("Failed to forward audio frame: {}", e);
            }
        }
    }

    fn notify_error(&self, message: String) {
        if !self.transport_closed && !self.outbound.send(ServerMessage::Error { message }) {
            debug!("Client connection gone, error notice dropped");
        }
    }

    /// Tear the session down: finish the recognition stream, close the
    /// client connection, and move to `Ended`. Calling it again does nothing.
    pub async fn end(&mut self) {
        {
            let mut state = self.state.lock().await;
            if state.is_ended() {
                return;
            }
            state.phase = SessionPhase::Ended;
            state.stats.finish();
        }

        self.pending_frames.clear();

        if let Some(mut stream) = self.stream.take() {
            if stream.is_open() {
                if let Err(e) = stream.finish().await {
                    warn!("Failed to finish speech recognition stream: {}", e);
                } else {
                    info!("Speech recognition stream finished");
                }
            }
        }

        if !self.transport_closed {
            self.transport_closed = true;
            if self.outbound.is_open() {
                self.outbound.close();
                info!("Client connection closed");
            }
        }

        let stats = self.stats().await;
        info!(
            "Session ended: {}/{} words confirmed, {} transcripts, {} frames forwarded in {:.1}s",
            stats.words_confirmed,
            stats.script_words,
            stats.transcripts_processed,
            stats.frames_forwarded,
            stats.duration_secs
        );
    }

    pub async fn stats(&self) -> SessionStats {
        self.state.lock().await.stats.clone()
    }
}

/// Resolve once the pending stream open completes; never resolves when
/// nothing is being opened.
async fn wait_for_stream(opening: &mut Option<OpenTask>) -> Result<Box<dyn AsrStream>, AsrError> {
    match opening.as_mut() {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(e) => Err(AsrError::Connection(format!("Stream open task failed: {e}"))),
        },
        None => futures::future::pending().await,
    }
}
