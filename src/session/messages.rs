use serde::{Deserialize, Serialize};

/// Control messages sent by the client as JSON text frames
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Load the reference script (whitespace-separated words)
    Script { payload: String },
    Pause,
    Resume,
    End,
}

/// One entry of the confirmation snapshot
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WordStatus {
    pub word: String,
    pub correct: bool,
}

/// Messages sent to the client as JSON text frames
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full confirmation snapshot, one entry per reference word
    Transcript { payload: Vec<WordStatus> },
    Error { message: String },
}
