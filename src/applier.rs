//! The hunk applier: position calculation, strict/fuzzy matching with
//! fallbacks, verification, duplicate safety, indentation adaptation, and
//! splicing.

use std::path::Path;

use crate::config::EngineConfig;
use crate::duplicate::detect_unexpected_duplicates;
use crate::error::PatchError;
use crate::matcher::{fuzzy_match, strict_match, try_specialized_matchers};
use crate::model::{Hunk, LineTerminator};
use crate::normalize::{dedent, indent_width, lines_equal, normalize_line_for_comparison};

/// One previously-applied hunk, tracked for position-calculation purposes
///.
#[derive(Debug, Clone, Copy)]
pub struct AppliedHunkRecord {
    pub old_start: usize,
    pub old_end: usize, // old_start + old_count, exclusive
    pub delta: isize,   // added - removed
}

/// Result of successfully applying one hunk.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub position: usize,
    pub confidence: f32,
    pub lines_removed: usize,
    pub lines_added: usize,
}

/// Compute the initial expected 0-based position for `hunk`, applying the
/// cumulative-offset rule: for each prior applied hunk whose
/// range lies entirely before this hunk's original start, add its
/// `(added - removed)` delta; otherwise fall back to the simple running sum.
fn initial_position(hunk: &Hunk, applied: &[AppliedHunkRecord]) -> usize {
    let mut offset: isize = 0;
    let mut used_simple_sum = true;
    for rec in applied {
        if rec.old_end <= hunk.old_start {
            offset += rec.delta;
            used_simple_sum = false;
        }
    }
    if used_simple_sum {
        offset = applied.iter().map(|r| r.delta).sum();
    }
    let expected = hunk.old_start as isize - 1 + offset;
    expected.max(0) as usize
}

/// Step 1: if added content is short (avg stripped length <= 5), scan the
/// whole file for an exact match of `old_block` and use that position,
/// short-circuiting the rest of the procedure.
fn short_content_shortcut(file_lines: &[String], hunk: &Hunk) -> Option<usize> {
    if hunk.added_lines.is_empty() {
        return None;
    }
    let avg_len: f64 = hunk
        .added_lines
        .iter()
        .map(|l| l.trim().len() as f64)
        .sum::<f64>()
        / hunk.added_lines.len() as f64;
    if avg_len > 5.0 {
        return None;
    }
    let block_len = hunk.old_block.len();
    if block_len == 0 || block_len > file_lines.len() {
        return None;
    }
    (0..=file_lines.len() - block_len).find(|&pos| {
        file_lines[pos..pos + block_len]
            .iter()
            .zip(&hunk.old_block)
            .all(|(a, b)| lines_equal(a, b))
    })
}

/// Steps 2-3: strict match, then fuzzy + fallbacks.
fn locate_position(
    file_lines: &[String],
    hunk: &Hunk,
    expected: usize,
    config: &EngineConfig,
    path: &Path,
) -> Result<(usize, f32), PatchError> {
    if let Some(shortcut) = short_content_shortcut(file_lines, hunk) {
        return Ok((shortcut, 1.0));
    }

    if let Some(m) = strict_match(file_lines, &hunk.old_block, expected) {
        return Ok((m.position, m.confidence));
    }

    if let Some(m) = fuzzy_match(file_lines, &hunk.old_block, expected, config) {
        if !crate::matcher::fuzzy::within_offset_guard(m.position, expected, config.max_offset) {
            return Err(PatchError::LargeOffset {
                offset: m.position.abs_diff(expected),
                max: config.max_offset,
            });
        }
        return Ok((m.position, m.ratio));
    }

    if let Some(m) = try_specialized_matchers(file_lines, &hunk.old_block, &hunk.new_lines, expected, config, path)
    {
        if !crate::matcher::fuzzy::within_offset_guard(m.position, expected, config.max_offset) {
            return Err(PatchError::LargeOffset {
                offset: m.position.abs_diff(expected),
                max: config.max_offset,
            });
        }
        return Ok((m.position, m.confidence));
    }

    Err(PatchError::PositionUndetermined)
}

/// Step 4: post-match quality verification — fraction of lines equal under
/// normalization at the chosen position.
fn verify_match_quality(file_lines: &[String], old_block: &[String], pos: usize) -> f32 {
    if old_block.is_empty() {
        return 1.0;
    }
    if pos + old_block.len() > file_lines.len() {
        return 0.0;
    }
    let slice = &file_lines[pos..pos + old_block.len()];
    let matches = slice
        .iter()
        .zip(old_block)
        .filter(|(a, b)| lines_equal(a, b))
        .count();
    matches as f32 / old_block.len() as f32
}

/// Step 7: indentation adaptation. Rewrites `new_lines`'s non-context
/// portion to match the indentation actually present in the replaced
/// region, when there's a clear indentation-delta signal.
fn adapt_indentation(replaced: &[String], new_lines: &[String]) -> Vec<String> {
    if replaced.is_empty() || new_lines.is_empty() {
        return new_lines.to_vec();
    }

    let non_empty_new: Vec<&String> = new_lines.iter().filter(|l| !l.trim().is_empty()).collect();
    if non_empty_new.is_empty() {
        return new_lines.to_vec();
    }

    let matched_pairs: Vec<(usize, usize)> = non_empty_new
        .iter()
        .enumerate()
        .filter_map(|(ni, nl)| {
            replaced
                .iter()
                .position(|rl| dedent(rl).trim_end() == dedent(nl).trim_end())
                .map(|ri| (ni, ri))
        })
        .collect();

    let match_fraction = matched_pairs.len() as f32 / non_empty_new.len() as f32;
    if match_fraction < 0.6 {
        return new_lines.to_vec();
    }

    let deltas: Vec<isize> = matched_pairs
        .iter()
        .map(|(ni, ri)| indent_width(&replaced[*ri]) as isize - indent_width(non_empty_new[*ni]) as isize)
        .collect();
    let uniform_one_space_loss = !deltas.is_empty()
        && deltas.iter().filter(|d| **d == 1).count() as f32 / deltas.len() as f32 >= 0.5;

    let modal_indent = {
        let mut counts = std::collections::HashMap::new();
        for line in replaced.iter().filter(|l| !l.trim().is_empty()) {
            *counts.entry(indent_width(line)).or_insert(0usize) += 1;
        }
        counts.into_iter().max_by_key(|(_, c)| *c).map(|(w, _)| w).unwrap_or(0)
    };

    let avg_delta = if deltas.is_empty() {
        0.0
    } else {
        deltas.iter().sum::<isize>() as f64 / deltas.len() as f64
    };

    let mut result = Vec::with_capacity(new_lines.len());
    let mut match_iter = matched_pairs.iter().peekable();
    let mut non_empty_idx = 0usize;
    for line in new_lines {
        if line.trim().is_empty() {
            result.push(line.clone());
            continue;
        }
        let matched = match_iter
            .peek()
            .filter(|(ni, _)| *ni == non_empty_idx)
            .map(|(_, ri)| *ri);
        if let Some(ri) = matched {
            match_iter.next();
            if uniform_one_space_loss {
                let target_indent = indent_width(&replaced[ri]);
                result.push(format!("{}{}", " ".repeat(target_indent), dedent(line)));
            } else if avg_delta.abs() > 8.0 {
                let target_indent = indent_width(&replaced[ri]);
                result.push(format!("{}{}", " ".repeat(target_indent), dedent(line)));
            } else {
                result.push(line.clone());
            }
        } else if avg_delta.abs() > 8.0 {
            result.push(format!("{}{}", " ".repeat(modal_indent), dedent(line)));
        } else {
            result.push(line.clone());
        }
        non_empty_idx += 1;
    }
    result
}

/// Step 8: surgical in-line replacement for a single-line removal, only
/// attempted when the match was fuzzy and the hunk is a one-line-for-one-line
/// replacement (not a pure add/delete).
fn try_surgical_application(
    file_lines: &[String],
    pos: usize,
    hunk: &Hunk,
) -> Option<Vec<String>> {
    if hunk.removed_lines.len() != 1 || hunk.added_lines.len() != 1 {
        return None;
    }
    let removed = normalize_line_for_comparison(&hunk.removed_lines[0]);
    let added = &hunk.added_lines[0];
    if removed.is_empty() {
        return None;
    }

    let lo = pos.saturating_sub(10);
    let hi = (pos + 20).min(file_lines.len());
    let mut candidates: Vec<usize> = Vec::new();
    for i in lo..hi {
        if file_lines[i].contains(removed.trim()) {
            candidates.push(i);
        }
    }
    if candidates.len() != 1 {
        return None;
    }
    let idx = candidates[0];
    let rewritten = file_lines[idx].replacen(hunk.removed_lines[0].trim(), added.trim(), 1);
    if rewritten == file_lines[idx] {
        return None;
    }
    let mut result = file_lines.to_vec();
    result[idx] = rewritten;
    Some(result)
}

/// Result of applying one hunk to the full in-memory line buffer.
pub struct AppliedHunk {
    pub file_lines: Vec<String>,
    pub outcome: ApplyOutcome,
    pub record: AppliedHunkRecord,
}

/// Apply `hunk` to `file_lines`, following the full match-locate-verify-splice procedure.
pub fn apply_hunk(
    file_lines: &[String],
    hunk: &Hunk,
    applied_so_far: &[AppliedHunkRecord],
    config: &EngineConfig,
    path: &Path,
) -> Result<AppliedHunk, PatchError> {
    let expected = initial_position(hunk, applied_so_far);
    let (mut pos, mut confidence) = locate_position(file_lines, hunk, expected, config, path)?;
    let fuzzy_chosen = confidence < 1.0;

    let quality = verify_match_quality(file_lines, &hunk.old_block, pos);
    if quality < 0.7 {
        return Err(PatchError::VerificationFailed { quality });
    }

    // Step 5: boundary correction. For a pure-addition hunk that carries
    // surrounding context, the fuzzy/specialized matchers above may have
    // landed on a position where that context is only an approximate match;
    // if an exact match of the same context exists elsewhere in the file,
    // retarget to it so the insertion lands at the right boundary.
    let old_block_len = hunk.old_block.len();
    if hunk.is_pure_addition() && old_block_len > 0 {
        let exact_at_pos = file_lines
            .get(pos..pos + old_block_len)
            .map(|window| window == hunk.old_block.as_slice())
            .unwrap_or(false);
        if !exact_at_pos {
            if let Some(found) = (0..=file_lines.len().saturating_sub(old_block_len))
                .find(|&p| file_lines[p..p + old_block_len] == hunk.old_block[..])
            {
                pos = found;
            }
        }
    }

    // Step 6: preview + duplicate check.
    let mut preview = file_lines.to_vec();
    let splice_end = (pos + old_block_len).min(preview.len());
    preview.splice(pos..splice_end, hunk.new_lines.iter().cloned());
    let report = detect_unexpected_duplicates(file_lines, &preview, pos, config.context_size("small"));
    if !report.is_clean() {
        return Err(PatchError::UnexpectedDuplicates(format!(
            "{} adjacent pair(s), {} repeated block(s)",
            report.adjacent_pairs.len(),
            report.repeated_blocks.len()
        )));
    }

    // Step 7: indentation adaptation on the region actually being replaced.
    let replaced_region: Vec<String> = file_lines
        .get(pos..splice_end)
        .map(|s| s.to_vec())
        .unwrap_or_default();
    let adapted_new_lines = adapt_indentation(&replaced_region, &hunk.new_lines);

    // Step 8: surgical application, only for fuzzy-matched single-line
    // replacements.
    let is_pure_add_or_delete = hunk.is_pure_addition() || hunk.is_pure_deletion();
    let mut result_lines = if fuzzy_chosen && !is_pure_add_or_delete {
        try_surgical_application(file_lines, pos, hunk)
    } else {
        None
    };

    let lines_removed = old_block_len;
    let lines_added = adapted_new_lines.len();

    if result_lines.is_none() {
        // Step 9: standard splice application.
        let mut spliced = file_lines.to_vec();
        let end = (pos + old_block_len).min(spliced.len());
        if end <= spliced.len() {
            spliced.splice(pos..end, adapted_new_lines.iter().cloned());
        } else {
            spliced.truncate(pos);
            spliced.extend(adapted_new_lines.iter().cloned());
        }
        result_lines = Some(spliced);
    }

    let record = AppliedHunkRecord {
        old_start: hunk.old_start,
        old_end: hunk.old_start + hunk.old_count,
        delta: hunk.new_lines.len() as isize - hunk.old_block.len() as isize,
    };

    Ok(AppliedHunk {
        file_lines: result_lines.unwrap(),
        outcome: ApplyOutcome {
            position: pos,
            confidence,
            lines_removed,
            lines_added,
        },
        record,
    })
}

/// Remove trailing blank lines, then restore at most one final newline
/// according to the original file's trailing-newline state and the diff's
/// no-newline marker.
pub fn finalize_content(
    lines: &[String],
    terminator: LineTerminator,
    had_trailing_newline: bool,
    diff_removed_trailing_newline: bool,
) -> String {
    let mut lines = lines.to_vec();
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    let body = lines.join(terminator.as_str());
    let should_end_with_newline = had_trailing_newline && !diff_removed_trailing_newline;
    if should_end_with_newline && !body.is_empty() {
        format!("{body}{}", terminator.as_str())
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    fn hunk(old_start: usize, old_block: &[&str], new_lines: &[&str]) -> Hunk {
        let ob = v(old_block);
        let nl = v(new_lines);
        let removed: Vec<String> = ob.iter().filter(|l| !nl.contains(l)).cloned().collect();
        let added: Vec<String> = nl.iter().filter(|l| !ob.contains(l)).cloned().collect();
        Hunk {
            number: 1,
            old_start,
            old_count: ob.len(),
            new_start: old_start,
            new_count: nl.len(),
            old_block: ob,
            new_lines: nl,
            removed_lines: removed,
            added_lines: added,
            missing_newline: false,
            header: format!("@@ -{},1 +{},1 @@", old_start, old_start),
        }
    }

    #[test]
    fn applies_strict_match_at_expected_position() {
        let file = v(&["def a():", "    return 1", "", "def b():", "    return 2"]);
        let h = hunk(2, &["    return 1"], &["    return 11"]);
        let config = EngineConfig::default();
        let result = apply_hunk(&file, &h, &[], &config, Path::new("f.py")).unwrap();
        assert_eq!(result.file_lines[1], "    return 11");
        assert_eq!(result.outcome.position, 1);
    }

    #[test]
    fn applies_fuzzy_match_when_header_is_off() {
        let file = v(&["a", "b", "c", "d", "e"]);
        // Header claims line 4, real content ("b") is at line 2 (index 1).
        let h = hunk(4, &["b"], &["B"]);
        let config = EngineConfig::default();
        let result = apply_hunk(&file, &h, &[], &config, Path::new("f.txt")).unwrap();
        assert_eq!(result.outcome.position, 1);
        assert_eq!(result.file_lines[1], "B");
    }

    #[test]
    fn cumulative_offset_shifts_later_hunk() {
        let applied = vec![AppliedHunkRecord {
            old_start: 2,
            old_end: 3,
            delta: 1,
        }];
        let h = hunk(5, &["x"], &["y"]);
        assert_eq!(initial_position(&h, &applied), 5); // 5-1+1
    }

    #[test]
    fn finalize_content_preserves_trailing_newline() {
        let lines = v(&["a", "b"]);
        let out = finalize_content(&lines, LineTerminator::Lf, true, false);
        assert_eq!(out, "a\nb\n");
    }

    #[test]
    fn finalize_content_drops_newline_when_diff_removed_it() {
        let lines = v(&["a", "b"]);
        let out = finalize_content(&lines, LineTerminator::Lf, true, true);
        assert_eq!(out, "a\nb");
    }
}
