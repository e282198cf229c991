// Integration tests for the reciting session controller
//
// The speech recognizer is replaced by an in-memory fake so tests can drive
// transcript events directly and observe forwarded audio.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as client_mpsc;
use recite_coach::asr::{AsrEventHandler, StreamOptions};
use recite_coach::session::{
    Inbound, Outbound, OutboundSink, ReciteSession, SessionObserver, SessionPhase,
};
use recite_coach::{
    AsrClient, AsrError, AsrEvent, AsrStream, Aligner, ServerMessage, SessionConfig,
    SessionContext, SessionStats, TranscriptEvent, WordStatus,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const LORAX: &str = "I am the Lorax and I speak for the trees";
const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct FakeAsrState {
    handler: Mutex<Option<AsrEventHandler>>,
    options: Mutex<Option<StreamOptions>>,
    frames: Mutex<Vec<Bytes>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    opens: AtomicUsize,
    finishes: AtomicUsize,
    fail_open: AtomicBool,
}

#[derive(Clone, Default)]
struct FakeAsr {
    state: Arc<FakeAsrState>,
}

impl FakeAsr {
    fn failing() -> Self {
        let fake = Self::default();
        fake.state.fail_open.store(true, Ordering::SeqCst);
        fake
    }

    /// Hold `open` until the returned sender fires
    fn gated() -> (Self, oneshot::Sender<()>) {
        let fake = Self::default();
        let (tx, rx) = oneshot::channel();
        *fake.state.gate.lock().unwrap() = Some(rx);
        (fake, tx)
    }

    fn handler(&self) -> AsrEventHandler {
        self.state
            .handler
            .lock()
            .unwrap()
            .clone()
            .expect("stream was never opened")
    }

    fn frames(&self) -> Vec<Bytes> {
        self.state.frames.lock().unwrap().clone()
    }

    fn finishes(&self) -> usize {
        self.state.finishes.load(Ordering::SeqCst)
    }

    async fn transcript(&self, text: &str) {
        let handler = self.handler();
        handler(AsrEvent::Transcript(TranscriptEvent::new(text, true))).await;
    }
}

#[async_trait]
impl AsrClient for FakeAsr {
    async fn open(
        &self,
        options: StreamOptions,
        handler: AsrEventHandler,
    ) -> Result<Box<dyn AsrStream>, AsrError> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        *self.state.options.lock().unwrap() = Some(options);
        *self.state.handler.lock().unwrap() = Some(handler);

        let gate = self.state.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(AsrError::Connection("refused".to_string()));
        }

        Ok(Box::new(FakeStream {
            state: Arc::clone(&self.state),
            finished: false,
        }))
    }

    fn provider(&self) -> &'static str {
        "fake"
    }
}

struct FakeStream {
    state: Arc<FakeAsrState>,
    finished: bool,
}

#[async_trait]
impl AsrStream for FakeStream {
    async fn send(&mut self, audio: Bytes) -> Result<(), AsrError> {
        if audio.as_ref() == b"fail" {
            return Err(AsrError::Send("simulated".to_string()));
        }
        self.state.frames.lock().unwrap().push(audio);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), AsrError> {
        self.finished = true;
        self.state.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.finished
    }
}

struct Harness {
    asr: FakeAsr,
    inbound: client_mpsc::UnboundedSender<Inbound>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    observer: SessionObserver,
    task: JoinHandle<(ReciteSession, SessionStats)>,
}

impl Harness {
    fn start(asr: FakeAsr) -> Self {
        Self::start_with_config(asr, SessionConfig::default())
    }

    fn start_with_config(asr: FakeAsr, config: SessionConfig) -> Self {
        let (sink, outbound) = OutboundSink::channel();
        let context = SessionContext::new(Arc::new(asr.clone()), Arc::new(Aligner::default()))
            .with_config(config);
        let mut session = ReciteSession::new(context, sink);
        let observer = session.observer();

        let (inbound, inbound_rx) = client_mpsc::unbounded();
        let task = tokio::spawn(async move {
            let stats = session.run(inbound_rx).await;
            (session, stats)
        });

        Self {
            asr,
            inbound,
            outbound,
            observer,
            task,
        }
    }

    /// Start a session with `script` loaded and the recognizer ready
    async fn streaming(script: &str) -> Self {
        let harness = Self::start(FakeAsr::default());
        harness.script(script);
        harness.wait_for_phase(SessionPhase::Streaming).await;
        harness
    }

    fn text(&self, json: &str) {
        self.inbound
            .unbounded_send(Inbound::Text(json.to_string()))
            .unwrap();
    }

    fn script(&self, script: &str) {
        let json = serde_json::json!({ "type": "script", "payload": script });
        self.text(&json.to_string());
    }

    fn audio(&self, data: &'static [u8]) {
        self.inbound
            .unbounded_send(Inbound::Binary(Bytes::from_static(data)))
            .unwrap();
    }

    async fn wait_for_phase(&self, phase: SessionPhase) {
        let observer = self.observer.clone();
        timeout(WAIT, async move {
            while observer.phase().await != phase {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("session never reached {:?}", phase));
    }

    async fn wait_for_frames(&self, count: usize) -> Vec<Bytes> {
        let asr = self.asr.clone();
        timeout(WAIT, async move {
            loop {
                let frames = asr.frames();
                if frames.len() >= count {
                    return frames;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("audio frames were not forwarded")
    }

    async fn wait_for_received(&self, count: usize) {
        let observer = self.observer.clone();
        timeout(WAIT, async move {
            while observer.stats().await.frames_received < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("audio frames were not received");
    }

    async fn next_outbound(&mut self) -> Outbound {
        timeout(WAIT, self.outbound.recv())
            .await
            .expect("no outbound message")
            .expect("outbound channel closed")
    }

    async fn next_snapshot(&mut self) -> Vec<WordStatus> {
        match self.next_outbound().await {
            Outbound::Message(ServerMessage::Transcript { payload }) => payload,
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    async fn assert_no_outbound(&mut self) {
        let result = timeout(Duration::from_millis(150), self.outbound.recv()).await;
        assert!(result.is_err(), "unexpected outbound message: {:?}", result);
    }

    async fn finished(self) -> (ReciteSession, SessionStats, mpsc::UnboundedReceiver<Outbound>) {
        let (session, stats) = timeout(WAIT, self.task)
            .await
            .expect("session did not end")
            .expect("session task panicked");
        (session, stats, self.outbound)
    }
}

fn correct_flags(snapshot: &[WordStatus]) -> Vec<bool> {
    snapshot.iter().map(|w| w.correct).collect()
}

#[tokio::test]
async fn test_script_load_opens_stream_and_streams_when_ready() {
    let harness = Harness::start(FakeAsr::default());
    assert_eq!(harness.observer.phase().await, SessionPhase::Idle);

    harness.script(LORAX);
    harness.wait_for_phase(SessionPhase::Streaming).await;

    assert_eq!(harness.asr.state.opens.load(Ordering::SeqCst), 1);
    let options = harness.asr.state.options.lock().unwrap().clone().unwrap();
    assert!(options.punctuate);
    assert!(options.interim_results);

    let snapshot = harness.observer.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 10);
    assert!(snapshot.iter().all(|w| !w.correct));
    assert_eq!(harness.observer.cursor().await, Some(0));
}

#[tokio::test]
async fn test_lorax_transcript_confirms_lorax_and_trees() {
    let mut harness = Harness::streaming(LORAX).await;

    harness.asr.transcript("I'm the Lorax I speak for trees").await;
    let snapshot = harness.next_snapshot().await;

    assert_eq!(snapshot.len(), 10);
    assert_eq!(snapshot[3].word, "Lorax");
    assert!(snapshot[3].correct);
    assert_eq!(snapshot[9].word, "trees");
    assert!(snapshot[9].correct);
    // "am" was skipped, so the cursor waits there
    assert!(!snapshot[1].correct);
    assert_eq!(harness.observer.cursor().await, Some(1));
}

#[tokio::test]
async fn test_audio_is_held_until_stream_is_ready() {
    let (asr, release) = FakeAsr::gated();
    let harness = Harness::start(asr);

    harness.script(LORAX);
    harness.audio(b"one");
    harness.audio(b"two");
    harness.audio(b"three");
    harness.wait_for_received(3).await;

    assert_eq!(harness.observer.phase().await, SessionPhase::ScriptLoaded);
    assert!(harness.asr.frames().is_empty());

    release.send(()).unwrap();
    harness.wait_for_phase(SessionPhase::Streaming).await;

    let frames = harness.wait_for_frames(3).await;
    assert_eq!(
        frames,
        vec![
            Bytes::from_static(b"one"),
            Bytes::from_static(b"two"),
            Bytes::from_static(b"three"),
        ]
    );
}

#[tokio::test]
async fn test_stream_setup_failure_ends_session() {
    let harness = Harness::start(FakeAsr::failing());
    harness.script(LORAX);

    let observer = harness.observer.clone();
    let (_session, _stats, mut outbound) = harness.finished().await;

    match outbound.recv().await {
        Some(Outbound::Message(ServerMessage::Error { message })) => {
            assert!(message.contains("refused"), "{}", message)
        }
        other => panic!("expected error notice, got {:?}", other),
    }
    assert_eq!(outbound.recv().await, Some(Outbound::Close));
    assert_eq!(observer.phase().await, SessionPhase::Ended);
}

#[tokio::test]
async fn test_paused_transcripts_are_discarded() {
    let mut harness = Harness::streaming(LORAX).await;

    harness.text(r#"{"type":"pause"}"#);
    harness.wait_for_phase(SessionPhase::Paused).await;

    // Audio still reaches the recognizer while paused
    harness.audio(b"warm");
    harness.wait_for_frames(1).await;

    harness.asr.transcript("I am the").await;
    harness.assert_no_outbound().await;
    let snapshot = harness.observer.snapshot().await.unwrap();
    assert!(snapshot.iter().all(|w| !w.correct));
    assert_eq!(harness.observer.cursor().await, Some(0));
    assert_eq!(harness.observer.stats().await.transcripts_discarded, 1);

    harness.text(r#"{"type":"resume"}"#);
    harness.wait_for_phase(SessionPhase::Streaming).await;

    harness.asr.transcript("I am the").await;
    let snapshot = harness.next_snapshot().await;
    assert_eq!(
        &correct_flags(&snapshot)[..4],
        &[true, true, true, false]
    );
    assert_eq!(harness.observer.cursor().await, Some(3));
}

#[tokio::test]
async fn test_snapshots_follow_transcript_order() {
    let mut harness = Harness::streaming(LORAX).await;

    harness.asr.transcript("I am").await;
    harness.asr.transcript("the Lorax").await;

    let first = harness.next_snapshot().await;
    let second = harness.next_snapshot().await;

    let first_confirmed = first.iter().filter(|w| w.correct).count();
    let second_confirmed = second.iter().filter(|w| w.correct).count();
    assert_eq!(first_confirmed, 2);
    assert_eq!(second_confirmed, 4);
    assert!(first
        .iter()
        .zip(&second)
        .all(|(before, after)| !before.correct || after.correct));
    assert_eq!(harness.observer.cursor().await, Some(4));
}

#[tokio::test]
async fn test_end_tears_down_once() {
    let mut harness = Harness::streaming(LORAX).await;

    harness.text(r#"{"type":"end"}"#);
    assert_eq!(harness.next_outbound().await, Outbound::Close);

    let asr = harness.asr.clone();
    let observer = harness.observer.clone();
    let (mut session, _stats, mut outbound) = harness.finished().await;
    assert_eq!(asr.finishes(), 1);
    assert_eq!(observer.phase().await, SessionPhase::Ended);

    session.end().await;
    assert_eq!(asr.finishes(), 1);
    assert!(outbound.try_recv().is_err());
    assert_eq!(observer.phase().await, SessionPhase::Ended);
}

#[tokio::test]
async fn test_transcripts_after_end_are_ignored() {
    let mut harness = Harness::streaming(LORAX).await;
    harness.text(r#"{"type":"end"}"#);
    assert_eq!(harness.next_outbound().await, Outbound::Close);

    harness.asr.transcript("I am the Lorax").await;
    let asr = harness.asr.clone();
    let (_session, stats, mut outbound) = harness.finished().await;

    assert!(outbound.try_recv().is_err());
    assert_eq!(stats.transcripts_processed, 0);
    assert_eq!(asr.finishes(), 1);
}

#[tokio::test]
async fn test_disconnect_ends_session() {
    let harness = Harness::streaming(LORAX).await;
    let asr = harness.asr.clone();

    harness.inbound.close_channel();
    let (_session, _stats, mut outbound) = harness.finished().await;

    assert_eq!(asr.finishes(), 1);
    assert_eq!(outbound.recv().await, Some(Outbound::Close));
}

#[tokio::test]
async fn test_fatal_stream_error_ends_session() {
    let harness = Harness::streaming(LORAX).await;
    let asr = harness.asr.clone();

    let handler = asr.handler();
    handler(AsrEvent::Failed(AsrError::Provider("quota exceeded".to_string()))).await;

    let (_session, _stats, mut outbound) = harness.finished().await;
    match outbound.recv().await {
        Some(Outbound::Message(ServerMessage::Error { message })) => {
            assert!(message.contains("quota exceeded"))
        }
        other => panic!("expected error notice, got {:?}", other),
    }
    assert_eq!(outbound.recv().await, Some(Outbound::Close));
    assert_eq!(asr.finishes(), 1);
}

#[tokio::test]
async fn test_malformed_and_repeated_scripts_are_ignored() {
    let mut harness = Harness::start(FakeAsr::default());

    harness.text("not json at all");
    harness.text(r#"{"type":"rewind"}"#);
    harness.script(LORAX);
    harness.wait_for_phase(SessionPhase::Streaming).await;
    harness.script("a completely different script");

    harness.asr.transcript("I am").await;
    let snapshot = harness.next_snapshot().await;
    assert_eq!(snapshot.len(), 10);
    assert_eq!(snapshot[0].word, "I");
    assert_eq!(harness.asr.state.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_send_failure_is_not_fatal() {
    let harness = Harness::streaming(LORAX).await;

    harness.audio(b"fail");
    harness.audio(b"ok");
    let frames = harness.wait_for_frames(1).await;

    assert_eq!(frames, vec![Bytes::from_static(b"ok")]);
    let stats = harness.observer.stats().await;
    assert_eq!(stats.frame_send_failures, 1);
    assert_eq!(stats.frames_forwarded, 1);
    assert_eq!(harness.observer.phase().await, SessionPhase::Streaming);
}

#[tokio::test]
async fn test_audio_before_script_is_dropped() {
    let harness = Harness::start(FakeAsr::default());

    harness.audio(b"early");
    harness.wait_for_received(1).await;
    harness.script(LORAX);
    harness.wait_for_phase(SessionPhase::Streaming).await;
    harness.audio(b"late");

    let frames = harness.wait_for_frames(1).await;
    assert_eq!(frames, vec![Bytes::from_static(b"late")]);
}

#[tokio::test]
async fn test_pause_before_ready_starts_paused() {
    let (asr, release) = FakeAsr::gated();
    let harness = Harness::start(asr);

    harness.script(LORAX);
    harness.wait_for_phase(SessionPhase::ScriptLoaded).await;
    harness.text(r#"{"type":"pause"}"#);
    harness.audio(b"held");
    harness.wait_for_received(1).await;

    release.send(()).unwrap();
    harness.wait_for_phase(SessionPhase::Paused).await;
    harness.wait_for_frames(1).await;
}

#[tokio::test]
async fn test_held_audio_drops_oldest_frame_when_full() {
    let (asr, release) = FakeAsr::gated();
    let harness = Harness::start_with_config(
        asr,
        SessionConfig {
            max_pending_frames: 2,
        },
    );

    harness.script(LORAX);
    harness.audio(b"one");
    harness.audio(b"two");
    harness.audio(b"three");
    harness.wait_for_received(3).await;

    release.send(()).unwrap();
    harness.wait_for_phase(SessionPhase::Streaming).await;

    let frames = harness.wait_for_frames(2).await;
    assert_eq!(
        frames,
        vec![Bytes::from_static(b"two"), Bytes::from_static(b"three")]
    );
}

#[tokio::test]
async fn test_provider_closing_stream_ends_session() {
    let harness = Harness::streaming(LORAX).await;
    let asr = harness.asr.clone();
    let observer = harness.observer.clone();

    let handler = asr.handler();
    handler(AsrEvent::Closed).await;

    let (_session, _stats, mut outbound) = harness.finished().await;
    match outbound.recv().await {
        Some(Outbound::Message(ServerMessage::Error { message })) => {
            assert!(message.contains("Stream closed"), "{}", message)
        }
        other => panic!("expected error notice, got {:?}", other),
    }
    assert_eq!(outbound.recv().await, Some(Outbound::Close));
    assert_eq!(observer.phase().await, SessionPhase::Ended);
}

#[tokio::test]
async fn test_stream_closed_during_teardown_is_quiet() {
    let mut harness = Harness::streaming(LORAX).await;
    harness.text(r#"{"type":"end"}"#);
    assert_eq!(harness.next_outbound().await, Outbound::Close);

    let asr = harness.asr.clone();
    let (_session, _stats, mut outbound) = harness.finished().await;

    // The recognizer acknowledging the finish must not produce another notice
    let handler = asr.handler();
    handler(AsrEvent::Closed).await;
    assert!(outbound.try_recv().is_err());
}
