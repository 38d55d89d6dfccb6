//! Forward pipeline manager: drives hunks through
//! `Init -> SystemPatch -> GitApply -> Difflib -> LlmResolver -> Complete`,
//! resetting `Failed` hunks back to `Pending` at each stage boundary so a
//! later stage gets another try.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::applier::{apply_hunk, finalize_content, AppliedHunkRecord};
use crate::config::EngineConfig;
use crate::error::{ErrorTracker, HunkErrorInfo, PatchError};
use std::collections::HashSet;

use crate::fileops::{cleanup_patch_artifacts, create_new_file, read_file, write_file};
use crate::host::{try_git_apply, try_git_apply_check, try_host_patch, HostHunkOutcome};
use crate::model::{HunkStatus, PipelineResult, PipelineStage};
use crate::ordering::{application_order, merge_overlapping};
use crate::parser::{extract_hunks, parse_unified_diff, repair_headers};
use crate::validators::{is_hunk_already_applied, is_new_file_creation};

/// Run the full forward pipeline against one (file, patch) pair.
#[instrument(skip(diff_text, config), fields(path = %path.display()))]
pub fn run(path: &Path, diff_text: &str, config: &EngineConfig) -> PipelineResult {
    let mut result = PipelineResult::new(path.to_path_buf(), diff_text.to_string());
    let repaired = repair_headers(diff_text);

    if is_new_file_creation(&repaired) {
        return run_new_file_creation(path, &repaired, &mut result);
    }

    let hunks = match parse_unified_diff(&repaired, path.to_str()) {
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

    let (mut file_lines, had_trailing_newline, terminator) = match read_file(path) {
        Ok(v) => v,
        Err(e) => {
            let msg = e.to_string();
            result.error = Some(msg.clone());
            result.complete(PipelineStage::Init, Some(msg));
            return result;
        }
    };

    let mut tracker = ErrorTracker::new();

    // Stage: SystemPatch / GitApply — optional accelerators, bypassed by
    // ZIYA_FORCE_DIFFLIB.
    if !config.force_difflib {
        run_host_stage(path, &repaired, &mut result, &mut tracker);
        reset_failed_hunks(&mut result);
    }

    // Stage: Difflib — the in-process matcher/applier, over whatever hunks
    // remain Pending.
    run_difflib_stage(
        &mut file_lines,
        &hunks,
        &mut result,
        &mut tracker,
        config,
        path,
    );
    reset_failed_hunks(&mut result);

    // Stage: LlmResolver — no external resolver is wired up; anything still
    // Pending here is marked Failed with PositionUndetermined.
    run_llm_resolver_stage(&mut result, &mut tracker);

    let any_succeeded = !result.succeeded().is_empty();
    if any_succeeded {
        let diff_removed_trailing_newline = hunks
            .iter()
            .max_by_key(|h| h.old_start)
            .map_or(false, |h| h.missing_newline);
        let content = finalize_content(&file_lines, terminator, had_trailing_newline, diff_removed_trailing_newline);
        if let Err(e) = write_file(path, &content) {
            result.error = Some(e.to_string());
        } else {
            result.changes_written = true;
            cleanup_patch_artifacts(path);
        }
    }

    result.complete(PipelineStage::Complete, result.error.clone());
    attach_errors(&mut result, &tracker);
    info!(
        succeeded = result.succeeded().len(),
        failed = result.failed().len(),
        already_applied = result.already_applied().len(),
        "pipeline complete"
    );
    result
}

fn run_new_file_creation(path: &Path, diff_text: &str, result: &mut PipelineResult) -> PipelineResult {
    let hunks = match parse_unified_diff(diff_text, path.to_str()) {
        Ok(h) => h,
        Err(e) => {
            result.error = Some(e.to_string());
            result.complete(PipelineStage::Init, Some(e.to_string()));
            return result.clone();
        }
    };
    result.initialize_hunks(hunks.clone());
    if hunks.is_empty() {
        result.error = Some("new-file patch had no hunks".to_string());
        result.complete(PipelineStage::Init, result.error.clone());
        return result.clone();
    }
    match create_new_file(path, &hunks) {
        Ok(()) => {
            for hunk in &hunks {
                if let Some(t) = result.hunks.get_mut(&hunk.number) {
                    t.record(PipelineStage::Init, HunkStatus::Succeeded, 1.0, Some(0), None);
                }
            }
            result.changes_written = true;
        }
        Err(e) => {
            for hunk in &hunks {
                if let Some(t) = result.hunks.get_mut(&hunk.number) {
                    t.record(
                        PipelineStage::Init,
                        HunkStatus::Failed,
                        0.0,
                        None,
                        Some(e.to_string()),
                    );
                }
            }
            result.error = Some(e.to_string());
        }
    }
    result.complete(PipelineStage::Complete, result.error.clone());
    result.clone()
}

fn run_host_stage(
    path: &Path,
    diff_text: &str,
    result: &mut PipelineResult,
    tracker: &mut ErrorTracker,
) {
    let repo_root = path.parent().unwrap_or_else(|| Path::new("."));
    let relative = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if let Some(host_result) = try_host_patch(repo_root, relative, diff_text) {
        apply_host_outcomes(PipelineStage::SystemPatch, &host_result.hunk_outcomes, result, tracker);
        if host_result.exit_success {
            result.complete(PipelineStage::SystemPatch, None);
            return;
        }
    }
    result.complete(PipelineStage::SystemPatch, None);

    // Only offer `git apply` the hunks the `patch` stage left Pending —
    // the file on disk (and the hunks already Succeeded/AlreadyApplied) must
    // not be re-patched.
    let pending: HashSet<usize> = result
        .hunks
        .iter()
        .filter(|(_, t)| t.status == HunkStatus::Pending)
        .map(|(number, _)| *number)
        .collect();
    if pending.is_empty() {
        result.complete(PipelineStage::GitApply, None);
        return;
    }
    let remaining_diff = extract_hunks(diff_text, &pending);

    if let Some(check_result) = try_git_apply_check(repo_root, &remaining_diff) {
        if check_result.exit_success {
            if let Some(host_result) = try_git_apply(repo_root, &remaining_diff) {
                if host_result.exit_success {
                    for number in &pending {
                        if let Some(t) = result.hunks.get_mut(number) {
                            t.record(PipelineStage::GitApply, HunkStatus::Succeeded, 1.0, None, None);
                        }
                    }
                }
            }
        }
    }
    result.complete(PipelineStage::GitApply, None);
}

fn apply_host_outcomes(
    stage: PipelineStage,
    outcomes: &[(usize, HostHunkOutcome)],
    result: &mut PipelineResult,
    tracker: &mut ErrorTracker,
) {
    for (number, outcome) in outcomes {
        let Some(t) = result.hunks.get_mut(number) else { continue };
        match outcome {
            HostHunkOutcome::Succeeded => t.record(stage, HunkStatus::Succeeded, 1.0, None, None),
            HostHunkOutcome::AlreadyApplied => {
                t.record(stage, HunkStatus::AlreadyApplied, 1.0, None, None)
            }
            HostHunkOutcome::Failed => {
                let err = PatchError::PositionUndetermined;
                tracker.add_hunk_error(HunkErrorInfo::from_error(*number, stage, &err));
                t.record(stage, HunkStatus::Failed, 0.0, None, Some(err.to_string()));
            }
        }
    }
}

fn run_difflib_stage(
    file_lines: &mut Vec<String>,
    hunks: &[crate::model::Hunk],
    result: &mut PipelineResult,
    tracker: &mut ErrorTracker,
    config: &EngineConfig,
    path: &Path,
) {
    let mut applied_records: Vec<AppliedHunkRecord> = Vec::new();
    for idx in application_order(hunks) {
        let hunk = &hunks[idx];
        let Some(t) = result.hunks.get(&hunk.number) else { continue };
        if t.status != HunkStatus::Pending {
            continue;
        }

        let expected = hunk.expected_index();
        if is_hunk_already_applied(file_lines.as_slice(), hunk, expected) {
            result
                .hunks
                .get_mut(&hunk.number)
                .unwrap()
                .record(PipelineStage::Difflib, HunkStatus::AlreadyApplied, 1.0, Some(expected), None);
            continue;
        }

        match apply_hunk(file_lines.as_slice(), hunk, &applied_records, config, path) {
            Ok(applied) => {
                *file_lines = applied.file_lines;
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
                tracker.add_hunk_error(HunkErrorInfo::from_error(hunk.number, PipelineStage::Difflib, &e));
                result.hunks.get_mut(&hunk.number).unwrap().record(
                    PipelineStage::Difflib,
                    HunkStatus::Failed,
                    0.0,
                    None,
                    Some(e.to_string()),
                );
                warn!(hunk = hunk.number, error = %e, "hunk failed in difflib stage");
            }
        }
    }
    result.complete(PipelineStage::Difflib, None);
}

fn run_llm_resolver_stage(result: &mut PipelineResult, tracker: &mut ErrorTracker) {
    let pending: Vec<usize> = result.pending();
    for id in pending {
        let err = PatchError::PositionUndetermined;
        tracker.add_hunk_error(HunkErrorInfo::from_error(id, PipelineStage::LlmResolver, &err));
        result.hunks.get_mut(&id).unwrap().record(
            PipelineStage::LlmResolver,
            HunkStatus::Failed,
            0.0,
            None,
            Some(err.to_string()),
        );
    }
    result.complete(PipelineStage::LlmResolver, None);
}

/// At a stage boundary, give any hunk still `Failed` another chance at the
/// next stage.
fn reset_failed_hunks(result: &mut PipelineResult) {
    for t in result.hunks.values_mut() {
        t.reset_if_failed();
    }
}

fn attach_errors(result: &mut PipelineResult, tracker: &ErrorTracker) {
    for info in tracker.all_most_specific() {
        if let Some(t) = result.hunks.get_mut(&info.hunk_id) {
            if t.status == HunkStatus::Failed {
                t.error_details = Some(info);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn applies_clean_hunk_end_to_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.py");
        std::fs::write(&path, "def a():\n    return 1\n").unwrap();
        let patch = "@@ -1,2 +1,2 @@\n def a():\n-    return 1\n+    return 2\n";
        let config = EngineConfig::default();
        let result = run(&path, patch, &config);
        assert_eq!(result.succeeded(), vec![1]);
        assert!(result.changes_written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def a():\n    return 2\n");
    }

    #[test]
    fn detects_already_applied_hunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.py");
        std::fs::write(&path, "use a;\nuse b;\n").unwrap();
        let patch = "@@ -1,1 +1,2 @@\n use a;\n+use b;\n";
        let config = EngineConfig::default();
        let result = run(&path, patch, &config);
        assert_eq!(result.already_applied(), vec![1]);
    }

    #[test]
    fn creates_new_file_from_dev_null_patch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.rs");
        let patch = "--- /dev/null\n+++ b/new.rs\nnew file mode 100644\n@@ -0,0 +1,1 @@\n+fn main() {}\n";
        let config = EngineConfig::default();
        let result = run(&path, patch, &config);
        assert!(result.changes_written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fn main() {}\n");
    }
}
