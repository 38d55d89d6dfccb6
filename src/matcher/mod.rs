//! Position matchers: the strict byte-faithful matcher, the multi-strategy
//! fuzzy matcher, and the specialized fallbacks.

pub mod fuzzy;
pub mod specialized;
pub mod strict;

pub use fuzzy::{fuzzy_match, FuzzyMatch};
pub use specialized::try_specialized_matchers;
pub use strict::strict_match;

/// Outcome of any matcher: the chosen 0-based position and the confidence
/// it was found with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub position: usize,
    pub confidence: f32,
}
