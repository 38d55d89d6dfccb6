//! Reverse-patch application: undo a previously-applied unified diff. Tries,
//! in order: the host `patch -R`; a fuzzy search for each hunk's `new_lines`
//! block replaced by `old_lines`, validated by re-applying the forward hunks
//! to the result and requiring it reproduce the pre-reverse file, discarding
//! the attempt on mismatch; a direct byte-faithful in-process reverse
//! replacement with no fuzz; and finally the full matching engine on the
//! hunk-swapped diff with the already-applied short-circuit disabled.

use std::path::Path;

use tracing::instrument;

use crate::applier::{apply_hunk, finalize_content, AppliedHunkRecord};
use crate::config::EngineConfig;
use crate::error::PatchError;
use crate::fileops::{cleanup_patch_artifacts, read_file, write_file};
use crate::host::try_host_patch_reverse;
use crate::model::{Hunk, HunkStatus, PipelineResult, PipelineStage};
use crate::ordering::{application_order, merge_overlapping};
use crate::parser::parse_unified_diff;

/// Swap old/new sides of one hunk to build its reverse.
fn reverse_hunk(hunk: &Hunk) -> Hunk {
    Hunk {
        number: hunk.number,
        old_start: hunk.new_start,
        old_count: hunk.new_count,
        new_start: hunk.old_start,
        new_count: hunk.old_count,
        old_block: hunk.new_lines.clone(),
        new_lines: hunk.old_block.clone(),
        removed_lines: hunk.added_lines.clone(),
        added_lines: hunk.removed_lines.clone(),
        missing_newline: hunk.missing_newline,
        header: format!(
            "@@ -{},{} +{},{} @@",
            hunk.new_start, hunk.new_count, hunk.old_start, hunk.old_count
        ),
    }
}

/// Attempt exact, byte-faithful reverse replacement: every reversed hunk's
/// `old_block` (the original `new_lines`) must be found verbatim. Any
/// mismatch aborts the whole attempt without touching `file_lines`.
fn try_direct_reverse(file_lines: &[String], hunks: &[Hunk]) -> Option<Vec<String>> {
    let mut lines = file_lines.to_vec();
    let mut offset: isize = 0;
    for hunk in hunks {
        let reversed = reverse_hunk(hunk);
        let pos = (reversed.old_start as isize - 1 + offset).max(0) as usize;
        if pos + reversed.old_block.len() > lines.len() {
            return None;
        }
        let slice = &lines[pos..pos + reversed.old_block.len()];
        if slice != reversed.old_block.as_slice() {
            return None;
        }
        lines.splice(pos..pos + reversed.old_block.len(), reversed.new_lines.iter().cloned());
        offset += reversed.new_lines.len() as isize - reversed.old_block.len() as isize;
    }
    Some(lines)
}

/// Fuzzy-locate each hunk's `new_lines` block and replace it with
/// `old_lines`, then validate the result by re-applying the original
/// (forward) hunks to it and requiring that reproduce `file_lines` exactly —
/// the "expected forward result". Discards the whole attempt on any hunk's
/// reverse-apply failure or on a validation mismatch, never touching
/// `file_lines`.
fn try_fuzzy_reverse_with_validation(
    file_lines: &[String],
    hunks: &[Hunk],
    config: &EngineConfig,
    path: &Path,
) -> Option<Vec<String>> {
    let mut lines = file_lines.to_vec();
    let mut applied_records: Vec<AppliedHunkRecord> = Vec::new();
    for hunk in hunks {
        let reversed = reverse_hunk(hunk);
        let applied = apply_hunk(&lines, &reversed, &applied_records, config, path).ok()?;
        lines = applied.file_lines;
        applied_records.push(applied.record);
    }

    let mut forward_check = lines.clone();
    let mut forward_records: Vec<AppliedHunkRecord> = Vec::new();
    for hunk in hunks {
        let applied = apply_hunk(&forward_check, hunk, &forward_records, config, path).ok()?;
        forward_check = applied.file_lines;
        forward_records.push(applied.record);
    }

    if forward_check == file_lines {
        Some(lines)
    } else {
        None
    }
}

/// Reverse a patch's effect on `path`. Mirrors [`crate::pipeline::run`]'s
/// structure but operates on the swapped hunks and never reports
/// already-applied (a reverse either finds the forward result to undo or it
/// doesn't).
#[instrument(skip(diff_text, config), fields(path = %path.display()))]
pub fn run_reverse(path: &Path, diff_text: &str, config: &EngineConfig) -> PipelineResult {
    let mut result = PipelineResult::new(path.to_path_buf(), diff_text.to_string());

    let hunks = match parse_unified_diff(diff_text, path.to_str()) {
        Ok(h) => h,
        Err(e) => {
            result.error = Some(e.to_string());
            result.complete(PipelineStage::Init, Some(e.to_string()));
            return result;
        }
    };
    if hunks.is_empty() {
        result.error = Some("no hunks found in patch".to_string());
        result.complete(PipelineStage::Init, result.error.clone());
        return result;
    }
    let hunks = merge_overlapping(hunks);
    result.initialize_hunks(hunks.clone());
    result.complete(PipelineStage::Init, None);

    let repo_root = path.parent().unwrap_or_else(|| Path::new("."));
    if !config.force_difflib {
        if let Some(host_result) = try_host_patch_reverse(repo_root, "", diff_text) {
            if host_result.exit_success {
                for t in result.hunks.values_mut() {
                    t.record(PipelineStage::SystemPatch, HunkStatus::Succeeded, 1.0, None, None);
                }
                result.changes_written = true;
                result.complete(PipelineStage::Complete, None);
                cleanup_patch_artifacts(path);
                return result;
            }
        }
    }
    result.complete(PipelineStage::SystemPatch, None);

    let (file_lines, had_trailing_newline, terminator) = match read_file(path) {
        Ok(v) => v,
        Err(e) => {
            let msg = e.to_string();
            result.error = Some(msg.clone());
            result.complete(PipelineStage::Init, Some(msg));
            return result;
        }
    };

    // Fuzzy search for each hunk's new-content block, replaced with its old
    // content, validated against the expected forward result.
    if let Some(reversed_lines) = try_fuzzy_reverse_with_validation(&file_lines, &hunks, config, path) {
        for t in result.hunks.values_mut() {
            t.record(PipelineStage::Difflib, HunkStatus::Succeeded, 1.0, None, None);
        }
        finish(&mut result, path, &reversed_lines, terminator, had_trailing_newline, hunks.last().map_or(false, |h| h.missing_newline));
        return result;
    }

    // Direct reverse replacement: byte-faithful, no fuzz.
    if let Some(reversed_lines) = try_direct_reverse(&file_lines, &hunks) {
        for t in result.hunks.values_mut() {
            t.record(PipelineStage::Difflib, HunkStatus::Succeeded, 1.0, None, None);
        }
        finish(&mut result, path, &reversed_lines, terminator, had_trailing_newline, hunks.last().map_or(false, |h| h.missing_newline));
        return result;
    }

    // Full matching engine against the reversed diff, without the
    // already-applied short-circuit (we expect the forward state, not the
    // pre-patch state, to be sitting in the file).
    let reversed_hunks: Vec<Hunk> = hunks.iter().map(reverse_hunk).collect();
    let mut lines = file_lines.clone();
    let mut applied_records: Vec<AppliedHunkRecord> = Vec::new();
    let mut any_failed = false;
    for idx in application_order(&reversed_hunks) {
        let hunk = &reversed_hunks[idx];
        match apply_hunk(&lines, hunk, &applied_records, config, path) {
            Ok(applied) => {
                lines = applied.file_lines;
                applied_records.push(applied.record);
                result.hunks.get_mut(&hunk.number).unwrap().record(
                    PipelineStage::Difflib,
                    HunkStatus::Succeeded,
                    applied.outcome.confidence,
                    Some(applied.outcome.position),
                    None,
                );
            }
            Err(e) => {
                any_failed = true;
                result.hunks.get_mut(&hunk.number).unwrap().record(
                    PipelineStage::Difflib,
                    HunkStatus::Failed,
                    0.0,
                    None,
                    Some(e.to_string()),
                );
            }
        }
    }

    if any_failed {
        result.error = Some(PatchError::PositionUndetermined.to_string());
        result.complete(PipelineStage::Complete, result.error.clone());
        return result;
    }

    finish(&mut result, path, &lines, terminator, had_trailing_newline, false);
    result
}

fn finish(
    result: &mut PipelineResult,
    path: &Path,
    lines: &[String],
    terminator: crate::model::LineTerminator,
    had_trailing_newline: bool,
    diff_removed_trailing_newline: bool,
) {
    let content = finalize_content(lines, terminator, had_trailing_newline, diff_removed_trailing_newline);
    match write_file(path, &content) {
        Ok(()) => {
            result.changes_written = true;
            cleanup_patch_artifacts(path);
        }
        Err(e) => result.error = Some(e.to_string()),
    }
    result.complete(PipelineStage::Complete, result.error.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reverses_a_simple_replacement() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.py");
        std::fs::write(&path, "def a():\n    return 2\n").unwrap();
        let patch = "@@ -1,2 +1,2 @@\n def a():\n-    return 1\n+    return 2\n";
        let config = EngineConfig::default();
        let result = run_reverse(&path, patch, &config);
        assert!(result.changes_written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def a():\n    return 1\n");
    }

    #[test]
    fn direct_reverse_roundtrips_an_addition() {
        let file = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let patch = "@@ -1,2 +1,3 @@\n a\n+b\n c\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let reversed = try_direct_reverse(&file, &hunks).unwrap();
        assert_eq!(reversed, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn fuzzy_reverse_finds_shifted_content_and_validates_roundtrip() {
        let file: Vec<String> = vec![
            "x".to_string(),
            "x".to_string(),
            "def a():".to_string(),
            "    return 2".to_string(),
            "x".to_string(),
        ];
        let patch = "@@ -1,2 +1,2 @@\n def a():\n-    return 1\n+    return 2\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let config = EngineConfig::default();
        let reversed = try_fuzzy_reverse_with_validation(&file, &hunks, &config, Path::new("f.py")).unwrap();
        assert_eq!(reversed[3], "    return 1");
    }

    #[test]
    fn fuzzy_reverse_discards_on_validation_mismatch() {
        // File content no longer matches either side of the hunk, so the
        // reverse search can find nothing sound to undo.
        let file: Vec<String> = vec!["totally".to_string(), "unrelated".to_string()];
        let patch = "@@ -1,2 +1,2 @@\n def a():\n-    return 1\n+    return 2\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let config = EngineConfig::default();
        assert!(try_fuzzy_reverse_with_validation(&file, &hunks, &config, Path::new("f.py")).is_none());
    }
}
