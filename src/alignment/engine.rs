use super::policy::AlignmentPolicy;
use super::similarity::{fuzzy_ratio, normalize_word, Scorer, WordScore};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Reference indices that are already confirmed and can no longer be selected
pub type MatchedSet = HashSet<usize>;

/// Outcome for one spoken word
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedWord {
    /// The word as recognized, before normalization
    pub spoken: String,

    /// Absolute reference index this word confirmed, if any
    pub reference_index: Option<usize>,

    pub is_correct: bool,
}

impl AlignedWord {
    fn matched(spoken: &str, index: usize) -> Self {
        Self {
            spoken: spoken.to_string(),
            reference_index: Some(index),
            is_correct: true,
        }
    }

    fn unmatched(spoken: &str) -> Self {
        Self {
            spoken: spoken.to_string(),
            reference_index: None,
            is_correct: false,
        }
    }
}

/// Alignment of one transcript batch, in spoken order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignmentResult {
    pub words: Vec<AlignedWord>,
}

impl AlignmentResult {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Reference indices confirmed by this batch, in spoken order
    pub fn matched_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().filter_map(|w| w.reference_index)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    score: WordScore,
}

/// Maps spoken words onto reference positions.
///
/// One aligner can be shared by every session: it only holds the policy
/// and the phonetic encoder.
pub struct Aligner {
    policy: AlignmentPolicy,
    scorer: Scorer,
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(AlignmentPolicy::default())
    }
}

impl Aligner {
    pub fn new(policy: AlignmentPolicy) -> Self {
        Self {
            policy,
            scorer: Scorer::new(),
        }
    }

    pub fn policy(&self) -> &AlignmentPolicy {
        &self.policy
    }

    /// Align a batch of spoken words against the remaining reference.
    ///
    /// `reference` is the normalized script starting at absolute index
    /// `offset` (the session cursor). Indices in `matched` are never
    /// returned as match targets. The caller's set is left untouched; the
    /// returned result lists the indices it should record.
    pub fn align(
        &self,
        spoken: &[String],
        reference: &[String],
        offset: usize,
        matched: &MatchedSet,
    ) -> AlignmentResult {
        let end = offset + reference.len();
        let mut taken = matched.clone();
        let mut cursor = offset;
        let mut words = Vec::with_capacity(spoken.len());

        for raw in spoken {
            let selected = if cursor >= end {
                None
            } else {
                let normalized = normalize_word(raw);
                self.select(&normalized, reference, offset, cursor, &taken)
            };

            match selected {
                Some(index) => {
                    taken.insert(index);
                    cursor = cursor.max(index + 1);
                    words.push(AlignedWord::matched(raw, index));
                }
                None => words.push(AlignedWord::unmatched(raw)),
            }
        }

        AlignmentResult { words }
    }

    /// Selectable positions of the forward window and the end of the span they cover
    fn window(
        &self,
        offset: usize,
        end: usize,
        cursor: usize,
        taken: &MatchedSet,
    ) -> (Vec<usize>, usize) {
        let mut candidates = Vec::with_capacity(self.policy.window);
        let mut span_end = cursor;

        for index in cursor.max(offset)..end {
            if candidates.len() == self.policy.window {
                break;
            }
            span_end = index + 1;
            if !taken.contains(&index) {
                candidates.push(index);
            }
        }

        (candidates, span_end)
    }

    fn select(
        &self,
        word: &str,
        reference: &[String],
        offset: usize,
        cursor: usize,
        taken: &MatchedSet,
    ) -> Option<usize> {
        if word.is_empty() {
            return None;
        }

        let end = offset + reference.len();
        let (candidates, span_end) = self.window(offset, end, cursor, taken);
        let reference_word = |index: usize| reference[index - offset].as_str();

        let length = word.chars().count();
        if length <= self.policy.short_word_max_len {
            let index = *candidates.first()?;
            let fuzzy = fuzzy_ratio(word, reference_word(index));
            return (fuzzy >= self.policy.short_word_threshold).then_some(index);
        }

        let code = self.scorer.phonetic_code(word);
        let mut best_combined: Option<Candidate> = None;
        let mut best_phonetic: Option<Candidate> = None;

        for &index in &candidates {
            let score = self.scorer.score(word, &code, reference_word(index));
            let candidate = Candidate { index, score };

            if best_combined.map_or(true, |b| score.combined() > b.score.combined()) {
                best_combined = Some(candidate);
            }
            if best_phonetic.map_or(true, |b| score.phonetic > b.score.phonetic) {
                best_phonetic = Some(candidate);
            }
        }

        let best_combined_score = best_combined.map_or(0.0, |c| c.score.combined());

        // Confirmed positions inside the window still count: a word that best
        // fits one of them is a repeat, not a new confirmation.
        let best_blocked = (cursor..span_end)
            .filter(|index| taken.contains(index))
            .map(|index| self.scorer.score(word, &code, reference_word(index)).combined())
            .fold(0.0_f64, f64::max);
        if best_blocked >= self.policy.combined_threshold && best_blocked > best_combined_score {
            debug!("'{}' repeats an already confirmed word", word);
            return None;
        }

        if let Some(best) = best_combined {
            if best.score.combined() >= self.policy.combined_threshold {
                return Some(best.index);
            }
        }

        if length > self.policy.phonetic_min_len {
            if let Some(best) = best_phonetic {
                if best.score.phonetic >= self.policy.phonetic_threshold {
                    return Some(best.index);
                }
            }
        }

        None
    }
}
