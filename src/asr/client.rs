use super::error::AsrError;
use crate::alignment::tokenize;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Recognized text from one transcription result
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,

    /// Whether the provider considers this result final (not interim)
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
        }
    }

    /// Recognized words, in spoken order
    pub fn words(&self) -> Vec<String> {
        tokenize(&self.text)
    }
}

/// Events delivered by an open stream
#[derive(Debug, Clone)]
pub enum AsrEvent {
    Transcript(TranscriptEvent),

    /// The stream failed and will not deliver further transcripts
    Failed(AsrError),

    /// The stream has shut down
    Closed,
}

/// Callback invoked for every event of a stream, one at a time and in order
pub type AsrEventHandler = Arc<dyn Fn(AsrEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as an `AsrEventHandler`
pub fn handler_fn<F, Fut>(f: F) -> AsrEventHandler
where
    F: Fn(AsrEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)) as BoxFuture<'static, ()>)
}

/// Per-stream recognition options
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    pub punctuate: bool,
    pub interim_results: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            punctuate: true,
            interim_results: true,
        }
    }
}

/// Handle to one live transcription stream
#[async_trait]
pub trait AsrStream: Send + Sync {
    /// Forward an audio frame. Failures are per call; the stream stays usable.
    async fn send(&mut self, audio: Bytes) -> Result<(), AsrError>;

    /// Ask the provider to flush and close the stream. Does not wait for it.
    async fn finish(&mut self) -> Result<(), AsrError>;

    fn is_open(&self) -> bool;
}

/// Factory for transcription streams.
///
/// Implementations hold configuration and credentials only; all per-session
/// state lives in the stream they return.
#[async_trait]
pub trait AsrClient: Send + Sync {
    /// Open a stream. `handler` is registered before any audio is accepted,
    /// so no transcript can be missed.
    async fn open(
        &self,
        options: StreamOptions,
        handler: AsrEventHandler,
    ) -> Result<Box<dyn AsrStream>, AsrError>;

    fn provider(&self) -> &'static str;
}
