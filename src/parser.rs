//! Unified-diff parser: reassembles [`Hunk`]s from raw patch text, tolerant
//! of LLM-mangled markers, preamble variations, and multi-file patches
//!.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PatchError;
use crate::model::Hunk;

static HUNK_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(?:\s*(.*))?$").unwrap()
});

/// Transport systems sometimes escape backtick sequences inside JS template
/// literal markdown fences (`` ` `` inside `` ``` ` ``). Undo that single
/// pattern without touching genuine multi-backtick literals.
fn unescape_template_fence_backticks(text: &str) -> String {
    // Only engage when the JS template-literal markdown fence marker is
    // present anywhere in the patch; genuine multi-backtick sequences
    // (` `` `) never contain the escaping backslash, so a global
    // `\\\`` -> `` ` `` replace is safe once the marker is confirmed.
    if !text.contains("```${") {
        return text.to_string();
    }
    text.replace(r"\`", "`")
}

struct RawHunk {
    header: String,
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
    number: Option<usize>,
    body: Vec<(char, String)>,
    missing_newline: bool,
}

/// Split a combined multi-file patch on `diff --git` boundaries. Each piece
/// keeps its own `diff --git`/`index`/`---`/`+++` preamble.
pub fn split_combined_diff(patch: &str) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in patch.split_inclusive('\n') {
        if line.starts_with("diff --git") && !current.trim().is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.trim().is_empty() {
        pieces.push(current);
    }
    if pieces.is_empty() {
        vec![patch.to_string()]
    } else {
        pieces
    }
}

/// Extract the `b/...` target path from a `diff --git a/X b/X` line, if any.
pub fn extract_target_file_from_diff(patch: &str) -> Option<String> {
    for line in patch.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some((_, b)) = rest.split_once(" b/") {
                return Some(b.trim().to_string());
            }
        }
        if let Some(rest) = line.strip_prefix("+++ b/") {
            return Some(rest.trim().to_string());
        }
    }
    None
}

/// Repair a missing `--- a/X` or `+++ b/X` header by copying the path from
/// the `diff --git` line.
pub fn repair_headers(patch: &str) -> String {
    let diff_git_path = patch.lines().find_map(|l| {
        l.strip_prefix("diff --git ")
            .and_then(|rest| rest.split_once(" b/"))
            .map(|(_, b)| b.trim().to_string())
    });
    let Some(path) = diff_git_path else {
        return patch.to_string();
    };
    let has_minus = patch.lines().any(|l| l.starts_with("--- "));
    let has_plus = patch.lines().any(|l| l.starts_with("+++ "));
    if has_minus && has_plus {
        return patch.to_string();
    }

    let mut out = String::new();
    let mut inserted = false;
    for line in patch.split_inclusive('\n') {
        out.push_str(line);
        if !inserted && line.starts_with("diff --git") {
            if !has_minus {
                out.push_str(&format!("--- a/{path}\n"));
            }
            if !has_plus {
                out.push_str(&format!("+++ b/{path}\n"));
            }
            inserted = true;
        }
    }
    out
}

/// Build a diff containing only the hunks whose 1-based hunk number is in
/// `keep`, preserving every preamble line (`diff --git`/`---`/`+++`/`index`/
/// mode lines) so the result stays a well-formed patch for a host binary.
/// Used to hand a later stage only the hunks an earlier stage left Pending,
/// instead of re-offering hunks it already resolved.
pub fn extract_hunks(diff_text: &str, keep: &std::collections::HashSet<usize>) -> String {
    let mut out = String::new();
    let mut hunk_idx = 0usize;
    let mut in_kept_hunk = false;
    for line in diff_text.split_inclusive('\n') {
        if line.starts_with("@@") {
            hunk_idx += 1;
            in_kept_hunk = keep.contains(&hunk_idx);
            if in_kept_hunk {
                out.push_str(line);
            }
            continue;
        }
        let is_preamble = line.starts_with("diff --git")
            || line.starts_with("--- ")
            || line.starts_with("+++ ")
            || line.starts_with("index ")
            || line.starts_with("new file mode")
            || line.starts_with("deleted file mode");
        if is_preamble || in_kept_hunk {
            out.push_str(line);
        }
    }
    out
}

/// Parse a unified diff into its hunks. `target_file` is used only to
/// normalize/repair path headers, never to read the file from disk.
pub fn parse_unified_diff(patch: &str, _target_file: Option<&str>) -> Result<Vec<Hunk>, PatchError> {
    let patch = unescape_template_fence_backticks(patch);
    let mut raw_hunks: Vec<RawHunk> = Vec::new();
    let mut current: Option<RawHunk> = None;
    let mut position_counter = 0usize;

    for line in patch.lines() {
        if line.starts_with("diff --git") {
            // New file entry starts; stop collecting hunks from a prior file
            // in this call — callers that want multi-file parsing should
            // use `split_combined_diff` first.
            if current.is_some() {
                break;
            }
            continue;
        }

        if line.starts_with("@@") {
            if let Some(h) = current.take() {
                raw_hunks.push(h);
            }
            let caps = HUNK_HEADER_RE
                .captures(line)
                .ok_or_else(|| PatchError::Malformed(format!("unparsable hunk header: {line}")))?;
            let old_start: usize = caps[1].parse().unwrap_or(1);
            let old_count: usize = caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(1))
                .unwrap_or(1);
            let new_start: usize = caps[3].parse().unwrap_or(1);
            let new_count: usize = caps
                .get(4)
                .map(|m| m.as_str().parse().unwrap_or(1))
                .unwrap_or(1);
            let tail = caps.get(5).map(|m| m.as_str()).unwrap_or("");
            let number = tail
                .split("Hunk #")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|n| n.parse::<usize>().ok());

            position_counter += 1;
            current = Some(RawHunk {
                header: line.to_string(),
                old_start,
                old_count,
                new_start,
                new_count,
                number,
                body: Vec::new(),
                missing_newline: false,
            });
            continue;
        }

        if let Some(hunk) = current.as_mut() {
            if let Some(rest) = line.strip_prefix('\\') {
                if rest.trim().starts_with("No newline at end of file") {
                    hunk.missing_newline = true;
                }
                // Any other `\`-prefixed line is a body continuation marker
                // we don't otherwise interpret; it never terminates the hunk.
                continue;
            }
            match line.chars().next() {
                Some(' ') => hunk.body.push((' ', line[1..].to_string())),
                Some('+') => hunk.body.push(('+', line[1..].to_string())),
                Some('-') => hunk.body.push(('-', line[1..].to_string())),
                None => hunk.body.push((' ', String::new())),
                _ => {
                    // Any other line shape ends the current hunk's body.
                    raw_hunks.push(current.take().unwrap());
                }
            }
            continue;
        }
        // Preamble lines (---/+++/index/new file mode/etc.) outside a hunk:
        // silently skipped.
    }
    if let Some(h) = current.take() {
        raw_hunks.push(h);
    }

    if raw_hunks.is_empty() {
        return Ok(Vec::new());
    }

    let mut hunks = Vec::with_capacity(raw_hunks.len());
    for (idx, raw) in raw_hunks.into_iter().enumerate() {
        let number = raw.number.unwrap_or(idx + 1);
        hunks.push(finalize_hunk(raw, number)?);
    }
    Ok(hunks)
}

fn finalize_hunk(raw: RawHunk, number: usize) -> Result<Hunk, PatchError> {
    if raw.body.is_empty() && (raw.old_count > 0 || raw.new_count > 0) {
        return Err(PatchError::Malformed(format!(
            "hunk #{number} has an empty body"
        )));
    }

    let mut old_block = Vec::new();
    let mut new_lines = Vec::new();
    let mut removed_lines = Vec::new();
    let mut added_lines = Vec::new();

    for (kind, text) in &raw.body {
        match kind {
            ' ' => {
                old_block.push(text.clone());
                new_lines.push(text.clone());
            }
            '-' => {
                old_block.push(text.clone());
                removed_lines.push(text.clone());
            }
            '+' => {
                new_lines.push(text.clone());
                added_lines.push(text.clone());
            }
            _ => unreachable!("body only ever holds ' '/'+'/'-' lines"),
        }
    }

    // Single-line trailing-empty-artifact trim: when
    // both blocks end in an empty string and the header counts already
    // match, trim that one trailing artifact from both.
    if old_block.last().map(String::as_str) == Some("")
        && new_lines.last().map(String::as_str) == Some("")
        && old_block.len() == raw.old_count
        && new_lines.len() == raw.new_count
    {
        old_block.pop();
        new_lines.pop();
    }

    if old_block.len() != raw.old_count {
        return Err(PatchError::Malformed(format!(
            "hunk #{number}: old block has {} lines, header declares {}",
            old_block.len(),
            raw.old_count
        )));
    }
    if new_lines.len() != raw.new_count {
        return Err(PatchError::Malformed(format!(
            "hunk #{number}: new block has {} lines, header declares {}",
            new_lines.len(),
            raw.new_count
        )));
    }
    if (raw.old_count > 0 && old_block.is_empty()) || (raw.new_count > 0 && new_lines.is_empty()) {
        return Err(PatchError::Malformed(format!(
            "hunk #{number}: non-empty count with empty block"
        )));
    }

    Ok(Hunk {
        number,
        old_start: raw.old_start,
        old_count: raw.old_count,
        new_start: raw.new_start,
        new_count: raw.new_count,
        old_block,
        new_lines,
        removed_lines,
        added_lines,
        missing_newline: raw.missing_newline,
        header: raw.header,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_hunk() {
        let patch = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n context\n-old\n+new\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        assert_eq!(hunks.len(), 1);
        let h = &hunks[0];
        assert_eq!(h.old_start, 1);
        assert_eq!(h.old_count, 3);
        assert_eq!(h.old_block, vec!["context", "old"]);
        assert_eq!(h.new_lines, vec!["context", "new"]);
    }

    #[test]
    fn parses_multiple_hunks_and_numbers_by_position() {
        let patch = "@@ -2,1 +2,1 @@\n-a\n+b\n@@ -5,1 +5,1 @@\n-c\n+d\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].number, 1);
        assert_eq!(hunks[1].number, 2);
        assert_eq!(hunks[1].old_start, 5);
    }

    #[test]
    fn defaults_missing_counts_to_one() {
        let patch = "@@ -1 +1 @@\n-x\n+y\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        assert_eq!(hunks[0].old_count, 1);
        assert_eq!(hunks[0].new_count, 1);
    }

    #[test]
    fn missing_newline_marker_is_recorded() {
        let patch = "@@ -1,1 +1,1 @@\n-old\n+new\n\\ No newline at end of file\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        assert!(hunks[0].missing_newline);
    }

    #[test]
    fn malformed_header_is_rejected() {
        let patch = "@@ not a header @@\n-x\n+y\n";
        let err = parse_unified_diff(patch, None).unwrap_err();
        assert!(matches!(err, PatchError::Malformed(_)));
    }

    #[test]
    fn blank_lines_inside_hunk_are_context() {
        let patch = "@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        assert_eq!(hunks[0].old_block, vec!["a", "", "b"]);
    }

    #[test]
    fn repairs_missing_plus_header() {
        let patch = "diff --git a/foo.rs b/foo.rs\n--- a/foo.rs\n@@ -1,1 +1,1 @@\n-x\n+y\n";
        let repaired = repair_headers(patch);
        assert!(repaired.contains("+++ b/foo.rs"));
    }

    #[test]
    fn splits_combined_diff_on_file_boundaries() {
        let patch = "diff --git a/a b/a\n--- a/a\n+++ b/a\n@@ -1,1 +1,1 @@\n-x\n+y\ndiff --git a/b b/b\n--- a/b\n+++ b/b\n@@ -1,1 +1,1 @@\n-p\n+q\n";
        let pieces = split_combined_diff(patch);
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].contains("a/a"));
        assert!(pieces[1].contains("a/b"));
    }
}
