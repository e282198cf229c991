use super::client::{AsrClient, AsrEvent, AsrEventHandler, AsrStream, StreamOptions};
use super::error::AsrError;
use super::messages::{parse_server_message, CLOSE_STREAM_MESSAGE};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for the Deepgram live transcription endpoint
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub language: String,

    /// Raw audio encoding; leave unset for containerized audio (webm, ogg)
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,

    pub connect_timeout: Duration,

    /// How long a finished stream may keep delivering trailing results
    pub finish_grace: Duration,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.deepgram.com/v1/listen".to_string(),
            api_key: String::new(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            encoding: None,
            sample_rate: None,
            channels: None,
            connect_timeout: Duration::from_secs(10),
            finish_grace: Duration::from_millis(2000),
        }
    }
}

/// Stateless factory for Deepgram streams, shared by all sessions
#[derive(Debug, Clone)]
pub struct DeepgramClient {
    config: DeepgramConfig,
}

impl DeepgramClient {
    pub fn new(config: DeepgramConfig) -> Result<Self, AsrError> {
        if config.api_key.trim().is_empty() {
            return Err(AsrError::Configuration(
                "Deepgram API key is required".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Build the listen URL with query parameters
    pub fn build_url(&self, options: &StreamOptions) -> Result<Url, AsrError> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| AsrError::Configuration(format!("Invalid Deepgram URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("model", &self.config.model);
            query.append_pair("language", &self.config.language);
            query.append_pair("punctuate", &options.punctuate.to_string());
            query.append_pair("interim_results", &options.interim_results.to_string());

            if let Some(encoding) = &self.config.encoding {
                query.append_pair("encoding", encoding);
            }
            if let Some(sample_rate) = self.config.sample_rate {
                query.append_pair("sample_rate", &sample_rate.to_string());
            }
            if let Some(channels) = self.config.channels {
                query.append_pair("channels", &channels.to_string());
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl AsrClient for DeepgramClient {
    async fn open(
        &self,
        options: StreamOptions,
        handler: AsrEventHandler,
    ) -> Result<Box<dyn AsrStream>, AsrError> {
        let url = self.build_url(&options)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| AsrError::Configuration(format!("Invalid request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
            .map_err(|e| AsrError::Configuration(format!("Invalid API key: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        info!("Connecting to Deepgram (model={})", self.config.model);

        let (ws, _) = timeout(self.config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| AsrError::Timeout("Deepgram connection".to_string()))?
            .map_err(|e| AsrError::Connection(e.to_string()))?;

        info!("Connected to Deepgram");

        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(run_connection(
            sink,
            stream,
            rx,
            handler,
            Arc::clone(&open),
            self.config.finish_grace,
        ));

        Ok(Box::new(DeepgramStream {
            sender: Some(tx),
            open,
        }))
    }

    fn provider(&self) -> &'static str {
        "deepgram"
    }
}

/// One live Deepgram stream. Audio is queued to the connection task, so
/// `send` never waits on the network.
pub struct DeepgramStream {
    sender: Option<mpsc::UnboundedSender<Message>>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl AsrStream for DeepgramStream {
    async fn send(&mut self, audio: Bytes) -> Result<(), AsrError> {
        let sender = self.sender.as_ref().ok_or(AsrError::Closed)?;
        sender
            .send(Message::Binary(audio))
            .map_err(|_| AsrError::Send("Deepgram connection task has stopped".to_string()))
    }

    async fn finish(&mut self) -> Result<(), AsrError> {
        // Dropping the sender lets the connection task drain and enter its grace period
        let Some(sender) = self.sender.take() else {
            return Ok(());
        };
        sender
            .send(Message::Text(CLOSE_STREAM_MESSAGE.to_string().into()))
            .map_err(|_| AsrError::Closed)
    }

    fn is_open(&self) -> bool {
        self.sender.is_some() && self.open.load(Ordering::SeqCst)
    }
}

/// Drive one Deepgram socket until it closes, fails, or the finish grace
/// period runs out.
async fn run_connection(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    handler: AsrEventHandler,
    open: Arc<AtomicBool>,
    finish_grace: Duration,
) {
    debug!("Deepgram connection task started");

    let mut finishing = false;
    let mut deadline = Instant::now();

    loop {
        tokio::select! {
            message = outgoing.recv(), if !finishing => {
                match message {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            error!("Failed to send to Deepgram: {}", e);
                            handler(AsrEvent::Failed(AsrError::Connection(e.to_string()))).await;
                            break;
                        }
                    }
                    None => {
                        debug!("Deepgram stream finishing");
                        finishing = true;
                        deadline = Instant::now() + finish_grace;
                    }
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => match parse_server_message(text.as_str()) {
                        Ok(Some(event)) => handler(AsrEvent::Transcript(event)).await,
                        Ok(None) => {}
                        Err(AsrError::Malformed(e)) => {
                            warn!("Skipping undecodable Deepgram message: {}", e);
                        }
                        Err(e) => {
                            error!("Deepgram reported an error: {}", e);
                            handler(AsrEvent::Failed(e)).await;
                            break;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!("Deepgram closed the stream: {:?}", frame);
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Unexpected binary message from Deepgram ({} bytes)", data.len());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if !finishing {
                            error!("Deepgram WebSocket error: {}", e);
                            handler(AsrEvent::Failed(AsrError::Connection(e.to_string()))).await;
                        }
                        break;
                    }
                    None => {
                        debug!("Deepgram stream ended");
                        break;
                    }
                }
            }

            _ = sleep_until(deadline), if finishing => {
                warn!("Deepgram did not close within {:?}, dropping connection", finish_grace);
                break;
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    let _ = sink.close().await;
    handler(AsrEvent::Closed).await;

    debug!("Deepgram connection task stopped");
}
