//! Specialized fallback matchers, run in order until one accepts
//!.

use crate::config::EngineConfig;
use crate::normalize::{dedent, normalize_line_for_comparison, normalize_whitespace, strip_all_whitespace};

use super::fuzzy::fuzzy_match;
use super::MatchResult;

/// Detect a language from a file extension, for comment-aware matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Python,
    CStyle, // js/ts/tsx/jsx/c/cpp/h/java
    Shell,
    Sql,
    Html,
    Css,
    Markdown,
    Unknown,
}

pub fn detect_lang(path: &std::path::Path) -> Lang {
    match path.extension().and_then(|e| e.to_str()) {
        Some("py") => Lang::Python,
        Some("js") | Some("ts") | Some("tsx") | Some("jsx") | Some("c") | Some("cpp") | Some("h")
        | Some("java") => Lang::CStyle,
        Some("sh") => Lang::Shell,
        Some("sql") => Lang::Sql,
        Some("html") => Lang::Html,
        Some("css") => Lang::Css,
        Some("md") => Lang::Markdown,
        _ => Lang::Unknown,
    }
}

/// Strip a trailing same-line comment for the given language; returns the
/// line unchanged if the language has no single-line comment syntax or none
/// is present.
fn strip_trailing_comment(line: &str, lang: Lang) -> (&str, bool) {
    let marker = match lang {
        Lang::Python | Lang::Shell => Some("#"),
        Lang::CStyle => Some("//"),
        Lang::Sql => Some("--"),
        _ => None,
    };
    if let Some(m) = marker {
        if let Some(idx) = line.find(m) {
            return (line[..idx].trim_end(), true);
        }
    }
    (line, false)
}

fn is_comment_only_line(line: &str, lang: Lang) -> bool {
    let trimmed = line.trim();
    match lang {
        Lang::Python | Lang::Shell => trimmed.starts_with('#'),
        Lang::CStyle => trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*"),
        Lang::Sql => trimmed.starts_with("--"),
        Lang::Html | Lang::Markdown => trimmed.starts_with("<!--"),
        Lang::Css => trimmed.starts_with("/*"),
        Lang::Unknown => false,
    }
}

/// 1. Normalized — re-run fuzzy matching on whitespace-normalized lines.
pub fn normalized_fallback(
    file_lines: &[String],
    old_block: &[String],
    expected: usize,
    config: &EngineConfig,
) -> Option<MatchResult> {
    let norm_file: Vec<String> = file_lines.iter().map(|l| normalize_whitespace(l)).collect();
    let norm_block: Vec<String> = old_block.iter().map(|l| normalize_whitespace(l)).collect();
    fuzzy_match(&norm_file, &norm_block, expected, config).map(Into::into)
}

/// 2. Relaxed — line-by-line whitespace-stripped equality fraction, lower
/// threshold.
pub fn relaxed_fallback(
    file_lines: &[String],
    old_block: &[String],
    expected: usize,
    config: &EngineConfig,
) -> Option<MatchResult> {
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

    let threshold = config.confidence_threshold("low");
    let mut best: Option<(usize, f32)> = None;
    for pos in lo..=hi {
        let candidate = &file_lines[pos..pos + block_len];
        let matches = candidate
            .iter()
            .zip(old_block)
            .filter(|(a, b)| strip_all_whitespace(a) == strip_all_whitespace(b))
            .count();
        let ratio = matches as f32 / block_len as f32;
        if best.map(|(_, b)| ratio > b).unwrap_or(true) {
            best = Some((pos, ratio));
        }
    }
    let (pos, ratio) = best?;
    if ratio >= threshold {
        Some(MatchResult {
            position: pos,
            confidence: ratio,
        })
    } else {
        None
    }
}

/// 3. Wide search — triple the search radius.
pub fn wide_search_fallback(
    file_lines: &[String],
    old_block: &[String],
    expected: usize,
    config: &EngineConfig,
) -> Option<MatchResult> {
    let mut widened = config.clone();
    widened.search_radius *= 3;
    fuzzy_match(file_lines, old_block, expected, &widened).map(Into::into)
}

/// 4. Comment-aware — give comment-only differences partial credit.
pub fn comment_aware_fallback(
    file_lines: &[String],
    old_block: &[String],
    expected: usize,
    config: &EngineConfig,
    path: &std::path::Path,
) -> Option<MatchResult> {
    let lang = detect_lang(path);
    if lang == Lang::Unknown {
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

    let threshold = config.confidence_threshold("medium") * 0.8;
    let mut best: Option<(usize, f32, bool)> = None;
    for pos in lo..=hi {
        let candidate = &file_lines[pos..pos + block_len];
        let mut score = 0.0f32;
        let mut comment_diffs = 0usize;
        for (a, b) in candidate.iter().zip(old_block) {
            let a_comment = is_comment_only_line(a, lang);
            let b_comment = is_comment_only_line(b, lang);
            let (a_code, _) = strip_trailing_comment(a, lang);
            let (b_code, _) = strip_trailing_comment(b, lang);

            if a_comment && b_comment {
                score += 0.7;
                comment_diffs += 1;
            } else if a_comment != b_comment {
                score += 0.3;
                comment_diffs += 1;
            } else if normalize_line_for_comparison(a_code) == normalize_line_for_comparison(b_code) {
                score += 1.0;
                if a != b {
                    comment_diffs += 1;
                }
            }
        }
        let ratio = score / block_len as f32;
        let mostly_comments = comment_diffs * 2 >= block_len;
        let boosted = if mostly_comments { ratio * 1.1 } else { ratio };
        if best.map(|(_, b, _)| boosted > b).unwrap_or(true) {
            best = Some((pos, boosted.min(1.0), mostly_comments));
        }
    }
    let (pos, ratio, _) = best?;
    if ratio >= threshold {
        Some(MatchResult {
            position: pos,
            confidence: ratio,
        })
    } else {
        None
    }
}

/// 5. Whitespace-aware — force acceptance at `expected` when the hunk is a
/// whitespace-only change.
pub fn whitespace_aware_fallback(
    file_lines: &[String],
    old_block: &[String],
    new_lines: &[String],
    expected: usize,
) -> Option<MatchResult> {
    if expected + old_block.len() > file_lines.len() {
        return None;
    }
    let candidate = &file_lines[expected..expected + old_block.len()];
    let is_ws_only = candidate.iter().zip(old_block).all(|(a, b)| {
        crate::normalize::lines_equal(a, b) || crate::normalize::whitespace_only_diff(a, b) || a == b
    });
    let content_preserved = old_block
        .iter()
        .zip(new_lines.iter())
        .all(|(o, n)| dedent(o).trim_end() == dedent(n).trim_end())
        || old_block.len() != new_lines.len();

    if is_ws_only && content_preserved {
        Some(MatchResult {
            position: expected,
            confidence: 0.9,
        })
    } else {
        None
    }
}

/// Run the specialized fallbacks in order until one accepts.
pub fn try_specialized_matchers(
    file_lines: &[String],
    old_block: &[String],
    new_lines: &[String],
    expected: usize,
    config: &EngineConfig,
    path: &std::path::Path,
) -> Option<MatchResult> {
    if let Some(m) = normalized_fallback(file_lines, old_block, expected, config) {
        return Some(m);
    }
    if let Some(m) = relaxed_fallback(file_lines, old_block, expected, config) {
        return Some(m);
    }
    if let Some(m) = wide_search_fallback(file_lines, old_block, expected, config) {
        return Some(m);
    }
    if config.use_enhanced_matching {
        if let Some(m) = comment_aware_fallback(file_lines, old_block, expected, config, path) {
            return Some(m);
        }
    }
    if let Some(m) = whitespace_aware_fallback(file_lines, old_block, new_lines, expected) {
        return Some(m);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn whitespace_only_forces_expected_position() {
        let file = v(&["foo()", "    bar()", "baz()"]);
        let old_block = v(&["        bar()"]);
        let new_lines = v(&["    bar()"]);
        let m = whitespace_aware_fallback(&file, &old_block, &new_lines, 1).unwrap();
        assert_eq!(m.position, 1);
        assert_eq!(m.confidence, 0.9);
    }

    #[test]
    fn comment_aware_matches_despite_comment_changes() {
        let file = v(&["x = 1  // old note", "y = 2"]);
        let old_block = v(&["x = 1  // new note"]);
        let config = EngineConfig::default();
        let m = comment_aware_fallback(&file, &old_block, 0, &config, std::path::Path::new("f.js"));
        assert!(m.is_some());
    }
}
