//! Word alignment between a spoken transcript and a reference script
//!
//! This module provides the `Aligner` that maps newly recognized words onto
//! positions of a fixed reference script:
//! - Normalization of spoken and reference tokens
//! - Surface (fuzzy) and phonetic similarity scoring
//! - Forward-window candidate selection with a short-word exception
//!
//! Alignment is pure: the aligner holds only its policy and never retains
//! state between calls.

mod engine;
mod policy;
mod similarity;

pub use engine::{AlignedWord, Aligner, AlignmentResult, MatchedSet};
pub use policy::AlignmentPolicy;
pub use similarity::{fuzzy_ratio, normalize_word, phonetic_ratio, tokenize, WordScore};
