/// Errors raised at the speech recognition boundary
#[derive(Debug, Clone, thiserror::Error)]
pub enum AsrError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Failed to send audio: {0}")]
    Send(String),
    #[error("Provider error: {0}")]
    Provider(String),
    /// A single provider message could not be decoded; the stream is unaffected
    #[error("Malformed provider message: {0}")]
    Malformed(String),
    #[error("Stream closed")]
    Closed,
}
