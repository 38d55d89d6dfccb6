//! Core data model: [`Hunk`], [`HunkTracker`], [`PipelineResult`] and the
//! closed [`PipelineStage`] enum.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::HunkErrorInfo;

/// Stable identifier for a hunk within one patch (1-based by parse order).
pub type HunkId = usize;

/// One `@@` block plus body from a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub number: HunkId,
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    /// Context + removed lines, in file order — what must be present.
    pub old_block: Vec<String>,
    /// Context + added lines, in file order — what the file should contain after.
    pub new_lines: Vec<String>,
    pub removed_lines: Vec<String>,
    pub added_lines: Vec<String>,
    pub missing_newline: bool,
    pub header: String,
}

impl Hunk {
    /// 0-based index into the file implied by the header, with no offset
    /// correction applied.
    pub fn expected_index(&self) -> usize {
        self.old_start.saturating_sub(1)
    }

    pub fn is_pure_addition(&self) -> bool {
        self.removed_lines.is_empty() && !self.added_lines.is_empty()
    }

    pub fn is_pure_deletion(&self) -> bool {
        self.added_lines.is_empty() && !self.removed_lines.is_empty()
    }

    pub fn net_delta(&self) -> isize {
        self.new_lines.len() as isize - self.old_block.len() as isize
    }
}

/// Status of a hunk as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HunkStatus {
    Pending,
    Succeeded,
    Failed,
    AlreadyApplied,
    Skipped,
}

/// Closed pipeline stage enum. Order here is the specificity
/// order used by the error tracker: later stages are more
/// specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    SystemPatch,
    GitApply,
    Difflib,
    LlmResolver,
    Complete,
}

/// One entry in a hunk's stage-result log.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: PipelineStage,
    pub status: HunkStatus,
    pub confidence: f32,
    pub position: Option<usize>,
    pub error: Option<String>,
}

/// Per-hunk state machine.
#[derive(Debug, Clone)]
pub struct HunkTracker {
    pub hunk_id: HunkId,
    pub hunk: Hunk,
    pub status: HunkStatus,
    pub current_stage: PipelineStage,
    pub stage_results: Vec<StageResult>,
    pub confidence: f32,
    pub position: Option<usize>,
    pub error_details: Option<HunkErrorInfo>,
}

impl HunkTracker {
    pub fn new(hunk: Hunk) -> Self {
        HunkTracker {
            hunk_id: hunk.number,
            hunk,
            status: HunkStatus::Pending,
            current_stage: PipelineStage::Init,
            stage_results: Vec::new(),
            confidence: 0.0,
            position: None,
            error_details: None,
        }
    }

    /// Record a stage outcome. Once a hunk is `Succeeded` or `AlreadyApplied`
    /// later stages must not call this again.
    pub fn record(
        &mut self,
        stage: PipelineStage,
        status: HunkStatus,
        confidence: f32,
        position: Option<usize>,
        error: Option<String>,
    ) {
        self.current_stage = stage;
        self.status = status;
        self.confidence = confidence;
        if position.is_some() {
            self.position = position;
        }
        self.stage_results.push(StageResult {
            stage,
            status,
            confidence,
            position,
            error,
        });
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, HunkStatus::Succeeded | HunkStatus::AlreadyApplied)
    }

    /// Reset a `Failed` hunk back to `Pending` so the next stage can retry it
    ///.
    pub fn reset_if_failed(&mut self) {
        if self.status == HunkStatus::Failed {
            self.status = HunkStatus::Pending;
        }
    }
}

/// Overall pipeline outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Success,
    Partial,
    Error,
}

/// Top-level result of running the pipeline over one patch/file pair
///.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub file_path: std::path::PathBuf,
    pub original_diff: String,
    pub hunks: BTreeMap<HunkId, HunkTracker>,
    pub stages_completed: Vec<PipelineStage>,
    pub current_stage: PipelineStage,
    pub changes_written: bool,
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn new(file_path: std::path::PathBuf, original_diff: String) -> Self {
        PipelineResult {
            file_path,
            original_diff,
            hunks: BTreeMap::new(),
            stages_completed: Vec::new(),
            current_stage: PipelineStage::Init,
            changes_written: false,
            error: None,
        }
    }

    pub fn initialize_hunks(&mut self, hunks: Vec<Hunk>) {
        for hunk in hunks {
            self.hunks.insert(hunk.number, HunkTracker::new(hunk));
        }
    }

    pub fn succeeded(&self) -> Vec<HunkId> {
        self.ids_with_status(HunkStatus::Succeeded)
    }

    pub fn failed(&self) -> Vec<HunkId> {
        self.ids_with_status(HunkStatus::Failed)
    }

    pub fn already_applied(&self) -> Vec<HunkId> {
        self.ids_with_status(HunkStatus::AlreadyApplied)
    }

    pub fn pending(&self) -> Vec<HunkId> {
        self.ids_with_status(HunkStatus::Pending)
    }

    fn ids_with_status(&self, status: HunkStatus) -> Vec<HunkId> {
        let mut ids: Vec<HunkId> = self
            .hunks
            .values()
            .filter(|t| t.status == status)
            .map(|t| t.hunk_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Derive the overall status from the hunk outcomes and write state.
    pub fn status(&self) -> PipelineStatus {
        if self.error.is_some() && !self.changes_written {
            return PipelineStatus::Error;
        }
        let any_failed = !self.failed().is_empty();
        let any_succeeded = !self.succeeded().is_empty();
        let any_already = !self.already_applied().is_empty();

        if any_failed && (any_succeeded || any_already) {
            return PipelineStatus::Partial;
        }
        if self.changes_written && self.hunks.is_empty() {
            return PipelineStatus::Success;
        }
        if any_failed && !any_succeeded && !any_already {
            return PipelineStatus::Error;
        }
        if !any_failed && (any_succeeded || any_already) {
            return PipelineStatus::Success;
        }
        PipelineStatus::Success
    }

    pub fn complete(&mut self, stage: PipelineStage, error: Option<String>) {
        self.current_stage = stage;
        self.stages_completed.push(stage);
        if error.is_some() {
            self.error = error;
        }
    }
}

/// Dominant line terminator detected in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerminator {
    Lf,
    CrLf,
}

impl LineTerminator {
    pub fn as_str(self) -> &'static str {
        match self {
            LineTerminator::Lf => "\n",
            LineTerminator::CrLf => "\r\n",
        }
    }

    /// Detect the more common of `\r\n` and `\n`; defaults to `\n` for empty
    /// or tied input.
    pub fn detect(content: &str) -> Self {
        let crlf = content.matches("\r\n").count();
        let total_lf = content.matches('\n').count();
        // every \r\n also matches \n, so bare lf count excludes those
        let bare_lf = total_lf.saturating_sub(crlf);
        if crlf > bare_lf {
            LineTerminator::CrLf
        } else {
            LineTerminator::Lf
        }
    }
}
