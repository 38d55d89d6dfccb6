//! Multi-strategy fuzzy matcher: scores every candidate position in a
//! bounded window with eight similarity strategies and accepts the best
//! one above an adaptive threshold.

use similar::TextDiff;

use crate::config::EngineConfig;
use crate::normalize::{dedent, normalize_whitespace, strip_all_whitespace};

use super::MatchResult;

#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatch {
    pub position: usize,
    pub ratio: f32,
    pub content_only_ratio: f32,
    pub whitespace_only: bool,
}

fn sequence_ratio(a: &str, b: &str) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    TextDiff::from_chars(a, b).ratio()
}

fn token_ratio(a: &[String], b: &[String]) -> f32 {
    let ta: Vec<&str> = a.iter().flat_map(|l| l.split_whitespace()).collect();
    let tb: Vec<&str> = b.iter().flat_map(|l| l.split_whitespace()).collect();
    TextDiff::from_slices(&ta, &tb).ratio()
}

fn line_whitespace_stripped_fraction(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() {
        return if b.is_empty() { 1.0 } else { 0.0 };
    }
    let n = a.len();
    let matches = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| strip_all_whitespace(x) == strip_all_whitespace(y))
        .count();
    matches as f32 / n as f32
}

fn structural_ratio(a: &[String], b: &[String]) -> f32 {
    let na: Vec<&String> = a.iter().filter(|l| !l.trim().is_empty()).collect();
    let nb: Vec<&String> = b.iter().filter(|l| !l.trim().is_empty()).collect();
    let joined_a = na.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n");
    let joined_b = nb.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n");
    sequence_ratio(&joined_a, &joined_b)
}

fn indentation_normalized(lines: &[String]) -> String {
    // Re-emit each line with indent normalized to a common 4-space step.
    lines
        .iter()
        .map(|l| {
            let width = crate::normalize::indent_width(l);
            let steps = (width + 2) / 4; // round to nearest step
            format!("{}{}", "    ".repeat(steps), dedent(l))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indentation_aware_ratio(a: &[String], b: &[String]) -> f32 {
    sequence_ratio(&indentation_normalized(a), &indentation_normalized(b))
}

/// Fold reformatting-only differences a strict or content-only comparison
/// would still flag: an empty-body pair split by whitespace (`{ }`, `( )`,
/// `[ ]`) collapsed to its tight form, and a trailing comma right before a
/// closing bracket dropped.
fn semantic_canonical(lines: &[String]) -> String {
    let joined = lines.join("\n");
    let mut out = normalize_whitespace(&joined);
    for (open, close) in [("{", "}"), ("(", ")"), ("[", "]")] {
        out = out.replace(&format!("{open} {close}"), &format!("{open}{close}"));
    }
    for close in [")", "]", "}"] {
        out = out.replace(&format!(", {close}"), close);
        out = out.replace(&format!(",{close}"), close);
    }
    out
}

fn semantic_ratio(a: &[String], b: &[String]) -> f32 {
    sequence_ratio(&semantic_canonical(a), &semantic_canonical(b))
}

/// Best of the eight similarity strategies for one candidate
/// window vs `old_block`.
fn score_candidate(old_block: &[String], candidate: &[String]) -> (f32, f32) {
    let joined_old = old_block.join("\n");
    let joined_cand = candidate.join("\n");

    let direct = sequence_ratio(&joined_old, &joined_cand);
    let ws_normalized = sequence_ratio(&normalize_whitespace(&joined_old), &normalize_whitespace(&joined_cand));
    let content_only = sequence_ratio(&strip_all_whitespace(&joined_old), &strip_all_whitespace(&joined_cand));
    let tokens = token_ratio(old_block, candidate);
    let line_frac = line_whitespace_stripped_fraction(old_block, candidate);
    let structural = structural_ratio(old_block, candidate);
    let indent_aware = indentation_aware_ratio(old_block, candidate);
    let semantic = semantic_ratio(old_block, candidate);

    let best = [
        direct,
        ws_normalized,
        content_only,
        tokens,
        line_frac,
        structural,
        indent_aware,
        semantic,
    ]
    .into_iter()
    .fold(0.0f32, f32::max);

    (best, content_only)
}

/// Adaptive threshold reduction rules.
fn adaptive_threshold(
    base: f32,
    old_block_len: usize,
    best_ratio: f32,
    content_only_ratio: f32,
    whitespace_only: bool,
) -> f32 {
    let mut threshold = base;
    if old_block_len <= 3 {
        threshold *= 0.7;
    }
    if content_only_ratio > 0.8 && best_ratio < content_only_ratio {
        threshold *= 0.6;
    }
    if content_only_ratio > 0.9 {
        threshold *= 0.7;
    }
    if whitespace_only {
        threshold *= 0.7;
    }
    if best_ratio >= threshold * 0.8 {
        threshold *= 0.8;
    }
    threshold
}

/// Search `[max(0, expected-R) .. min(N, expected+R)]` for the best match
/// to `old_block`, accepting above the adaptive threshold.
pub fn fuzzy_match(
    file_lines: &[String],
    old_block: &[String],
    expected: usize,
    config: &EngineConfig,
) -> Option<FuzzyMatch> {
    if old_block.is_empty() || file_lines.is_empty() {
        return None;
    }
    let radius = config.search_radius;
    let n = file_lines.len();
    let block_len = old_block.len();
    if block_len > n {
        return None;
    }

    let max_pos = n - block_len;
    let lo = expected.saturating_sub(radius);
    let hi = (expected + radius).min(max_pos);
    if lo > hi {
        return None;
    }

    let mut best: Option<(usize, f32, f32)> = None;
    for pos in lo..=hi {
        let candidate = &file_lines[pos..pos + block_len];
        let (ratio, content_only) = score_candidate(old_block, candidate);
        if best.map(|(_, b, _)| ratio > b).unwrap_or(true) {
            best = Some((pos, ratio, content_only));
        }
    }

    let (pos, ratio, content_only) = best?;
    let base_threshold = config.confidence_threshold("medium");
    let whitespace_only = file_lines
        .get(pos..pos + block_len)
        .map(|cand| {
            cand.iter()
                .zip(old_block)
                .all(|(a, b)| a == b || crate::normalize::whitespace_only_diff(a, b))
        })
        .unwrap_or(false);
    let threshold = adaptive_threshold(base_threshold, block_len, ratio, content_only, whitespace_only);

    if ratio < threshold {
        return None;
    }

    Some(FuzzyMatch {
        position: pos,
        ratio,
        content_only_ratio: content_only,
        whitespace_only,
    })
}

/// Offset guard: reject if farther than `max_offset` lines from `expected`
///.
pub fn within_offset_guard(position: usize, expected: usize, max_offset: usize) -> bool {
    position.abs_diff(expected) <= max_offset
}

impl From<FuzzyMatch> for MatchResult {
    fn from(m: FuzzyMatch) -> Self {
        MatchResult {
            position: m.position,
            confidence: m.ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_shifted_match_within_radius() {
        let file = v(&["x", "x", "def a():", "    return 1", "x", "x"]);
        let old_block = v(&["def a():", "    return 1"]);
        let config = EngineConfig::default();
        let m = fuzzy_match(&file, &old_block, 0, &config).unwrap();
        assert_eq!(m.position, 2);
        assert!(m.ratio >= 0.99);
    }

    #[test]
    fn rejects_when_nothing_similar_enough() {
        let file = v(&["completely", "unrelated", "content", "here"]);
        let old_block = v(&["def a():", "    return 1"]);
        let config = EngineConfig::default();
        assert!(fuzzy_match(&file, &old_block, 0, &config).is_none());
    }

    #[test]
    fn offset_guard_rejects_far_match() {
        assert!(!within_offset_guard(600, 0, 500));
        assert!(within_offset_guard(400, 0, 500));
    }

    #[test]
    fn short_block_gets_lower_threshold() {
        let t = adaptive_threshold(0.52, 2, 0.4, 0.3, false);
        assert!((t - 0.52 * 0.7).abs() < 1e-6);
    }
}
