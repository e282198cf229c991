use crate::alignment::Aligner;
use crate::asr::{AsrClient, StreamOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Audio frames held while the speech recognizer is connecting.
    /// The oldest frame is dropped once this many are waiting.
    pub max_pending_frames: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: 512,
        }
    }
}

/// Process-wide collaborators handed to every new session
#[derive(Clone)]
pub struct SessionContext {
    pub asr: Arc<dyn AsrClient>,
    pub aligner: Arc<Aligner>,
    pub stream_options: StreamOptions,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(asr: Arc<dyn AsrClient>, aligner: Arc<Aligner>) -> Self {
        Self {
            asr,
            aligner,
            stream_options: StreamOptions::default(),
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.stream_options = options;
        self
    }
}
