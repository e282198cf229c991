use serde::{Deserialize, Serialize};

/// Thresholds and window size used when deciding whether a spoken word
/// confirms a reference position. Scores are on a 0-100 scale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlignmentPolicy {
    /// Number of selectable reference positions searched ahead of the cursor
    pub window: usize,

    /// Minimum combined (fuzzy + phonetic mean) score for a primary match
    pub combined_threshold: f64,

    /// Minimum phonetic score for the phonetic fallback
    pub phonetic_threshold: f64,

    /// Spoken words must be strictly longer than this to use the phonetic fallback
    pub phonetic_min_len: usize,

    /// Words of at most this many characters only match the candidate at the cursor
    pub short_word_max_len: usize,

    /// Minimum fuzzy score for a short word to match
    pub short_word_threshold: f64,
}

impl Default for AlignmentPolicy {
    fn default() -> Self {
        Self {
            window: 4,
            combined_threshold: 85.0,
            phonetic_threshold: 80.0,
            phonetic_min_len: 5,
            short_word_max_len: 2,
            short_word_threshold: 95.0,
        }
    }
}
