use super::client::TranscriptEvent;
use super::error::AsrError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Text message that asks Deepgram to flush pending audio and close
pub const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

/// Server message from the Deepgram live endpoint
#[derive(Debug, Deserialize, Serialize)]
pub struct DeepgramResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    pub channel: Option<DeepgramChannel>,
    pub is_final: Option<bool>,
    pub speech_final: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeepgramChannel {
    pub alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeepgramAlternative {
    pub transcript: String,
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeepgramError {
    pub description: Option<String>,
    pub message: Option<String>,
}

/// Parse one text message from Deepgram.
///
/// Returns the transcript of a `Results` message, `None` for informational
/// messages and empty transcripts, `AsrError::Provider` for `Error` messages
/// and `AsrError::Malformed` for anything that does not decode.
pub fn parse_server_message(text: &str) -> Result<Option<TranscriptEvent>, AsrError> {
    let response: DeepgramResponse = serde_json::from_str(text)
        .map_err(|e| AsrError::Malformed(format!("Failed to parse response: {e}")))?;

    match response.response_type.as_str() {
        "Results" => {
            let Some(alternative) = response
                .channel
                .and_then(|channel| channel.alternatives.into_iter().next())
            else {
                return Ok(None);
            };

            if alternative.transcript.trim().is_empty() {
                return Ok(None);
            }

            Ok(Some(TranscriptEvent::new(
                alternative.transcript,
                response.is_final.unwrap_or(false),
            )))
        }
        "Metadata" | "SpeechStarted" | "UtteranceEnd" => {
            debug!("Received {} message", response.response_type);
            Ok(None)
        }
        "Error" => {
            let detail = serde_json::from_str::<DeepgramError>(text)
                .ok()
                .and_then(|e| e.description.or(e.message))
                .unwrap_or_else(|| "Unknown error from Deepgram".to_string());
            Err(AsrError::Provider(detail))
        }
        other => {
            warn!("Unknown Deepgram response type: {}", other);
            Ok(None)
        }
    }
}
