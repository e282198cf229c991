use rphonetic::{DoubleMetaphone, Encoder};

/// Strip punctuation and lowercase a word for comparison.
///
/// Only alphanumeric characters survive, so contractions collapse
/// ("I'm" becomes "im") and trailing punctuation from a punctuated
/// transcript is dropped.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split text into whitespace-separated tokens, keeping their original spelling.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Partial-overlap similarity between two normalized words (0-100).
///
/// The shorter word is slid across every equal-length window of the longer
/// one and the best normalized Levenshtein similarity is kept. Words of equal
/// length reduce to a plain ratio.
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    let short: String = short.into_iter().collect();
    let mut best = 0.0_f64;

    for window in long.windows(short.chars().count()) {
        let candidate: String = window.iter().collect();
        let similarity = strsim::normalized_levenshtein(&short, &candidate);
        if similarity > best {
            best = similarity;
            if best >= 1.0 {
                break;
            }
        }
    }

    best * 100.0
}

/// Similarity between two phonetic codes (0-100). Empty codes never match.
pub fn phonetic_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Fuzzy and phonetic similarity of one spoken word against one reference word
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordScore {
    pub fuzzy: f64,
    pub phonetic: f64,
}

impl WordScore {
    /// Arithmetic mean of the fuzzy and phonetic scores
    pub fn combined(&self) -> f64 {
        (self.fuzzy + self.phonetic) / 2.0
    }
}

/// Scores normalized words using Double Metaphone primary codes for the
/// phonetic half.
pub(crate) struct Scorer {
    encoder: DoubleMetaphone,
}

impl Scorer {
    pub(crate) fn new() -> Self {
        Self {
            encoder: DoubleMetaphone::default(),
        }
    }

    pub(crate) fn phonetic_code(&self, normalized: &str) -> String {
        if normalized.is_empty() {
            return String::new();
        }
        self.encoder.encode(normalized)
    }

    /// Score `spoken` against `reference`. `spoken_code` is the precomputed
    /// phonetic code of `spoken`, shared across the candidates of one window.
    pub(crate) fn score(&self, spoken: &str, spoken_code: &str, reference: &str) -> WordScore {
        let reference_code = self.phonetic_code(reference);
        WordScore {
            fuzzy: fuzzy_ratio(spoken, reference),
            phonetic: phonetic_ratio(spoken_code, &reference_code),
        }
    }
}
