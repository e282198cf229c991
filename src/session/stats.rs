use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters describing one reciting session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the connection was accepted
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds, filled in at teardown
    pub duration_secs: f64,

    /// Audio frames received from the client
    pub frames_received: usize,

    /// Audio frames handed to the speech recognizer
    pub frames_forwarded: usize,

    /// Audio frames the speech recognizer refused
    pub frame_send_failures: usize,

    /// Transcript events aligned against the script
    pub transcripts_processed: usize,

    /// Transcript events dropped while paused
    pub transcripts_discarded: usize,

    /// Confirmation snapshots queued for the client
    pub snapshots_sent: usize,

    /// Reference words confirmed so far
    pub words_confirmed: usize,

    /// Reference script length
    pub script_words: usize,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            duration_secs: 0.0,
            frames_received: 0,
            frames_forwarded: 0,
            frame_send_failures: 0,
            transcripts_processed: 0,
            transcripts_discarded: 0,
            snapshots_sent: 0,
            words_confirmed: 0,
            script_words: 0,
        }
    }

    pub(crate) fn finish(&mut self) {
        let duration = Utc::now().signed_duration_since(self.started_at);
        self.duration_secs = duration.num_milliseconds() as f64 / 1000.0;
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
