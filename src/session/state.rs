use super::messages::WordStatus;
use super::stats::SessionStats;
use crate::alignment::{normalize_word, tokenize, Aligner, AlignmentResult, MatchedSet};
use serde::Serialize;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Waiting for a script
    Idle,
    /// Script loaded, speech recognizer not ready yet
    ScriptLoaded,
    Streaming,
    Paused,
    Ended,
}

/// Reference script and how much of it has been confirmed
#[derive(Debug, Clone)]
pub struct ScriptProgress {
    /// Normalized reference tokens, the alignment coordinate space
    reference: Vec<String>,

    /// Reference words as sent by the client, with their confirmation flag
    confirmations: Vec<WordStatus>,

    /// Lowest unconfirmed index
    cursor: usize,

    matched: MatchedSet,
}

impl ScriptProgress {
    pub fn new(script: &str) -> Self {
        let words = tokenize(script);
        let reference = words.iter().map(|w| normalize_word(w)).collect();
        let confirmations = words
            .into_iter()
            .map(|word| WordStatus {
                word,
                correct: false,
            })
            .collect();

        Self {
            reference,
            confirmations,
            cursor: 0,
            matched: MatchedSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn matched(&self) -> &MatchedSet {
        &self.matched
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == self.reference.len()
    }

    /// Align spoken words against the unconfirmed remainder of the script
    pub fn align(&self, aligner: &Aligner, spoken: &[String]) -> AlignmentResult {
        aligner.align(
            spoken,
            &self.reference[self.cursor..],
            self.cursor,
            &self.matched,
        )
    }

    /// Record the confirmations of an alignment and advance the cursor over
    /// the confirmed prefix. Returns the number of newly confirmed words.
    pub fn apply(&mut self, result: &AlignmentResult) -> usize {
        let mut confirmed = 0;

        for index in result.matched_indices() {
            let Some(entry) = self.confirmations.get_mut(index) else {
                continue;
            };
            if self.matched.insert(index) {
                entry.correct = true;
                confirmed += 1;
            }
        }

        while self
            .confirmations
            .get(self.cursor)
            .is_some_and(|entry| entry.correct)
        {
            self.cursor += 1;
        }

        confirmed
    }

    /// Full confirmation array, one entry per reference word
    pub fn snapshot(&self) -> Vec<WordStatus> {
        self.confirmations.clone()
    }

    pub fn confirmed_count(&self) -> usize {
        self.matched.len()
    }
}

/// Everything a session mutates, guarded by one lock so the dispatch loop
/// and transcript handling never interleave inside an update.
#[derive(Debug)]
pub struct SessionState {
    pub phase: SessionPhase,

    /// Set by `pause`, consulted only when handling transcripts
    pub paused: bool,

    pub progress: Option<ScriptProgress>,

    pub stats: SessionStats,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            paused: false,
            progress: None,
            stats: SessionStats::new(),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.phase == SessionPhase::Ended
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
