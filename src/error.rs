//! Closed error taxonomy for the diff application engine, plus the
//! per-hunk error tracker that preserves the most specific failure a
//! hunk accumulated across pipeline stages.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::model::PipelineStage;

/// A single hunk-or-pipeline-level failure.
///
/// Each variant names one failure mode a hunk or whole patch can hit;
/// stage/confidence/position are carried separately on [`HunkErrorInfo`]
/// rather than stuffed into the message so the error tracker can compare them.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
pub enum PatchError {
    #[error("patch is malformed: {0}")]
    Malformed(String),

    #[error("match accepted {offset} lines from the expected position (max {max})")]
    LargeOffset { offset: usize, max: usize },

    #[error("no candidate position met the confidence threshold (best ratio {best_ratio:.3})")]
    LowConfidence { best_ratio: f32 },

    #[error("chosen position failed post-match verification (quality {quality:.3})")]
    VerificationFailed { quality: f32 },

    #[error("applying would introduce unexpected duplicate content: {0}")]
    UnexpectedDuplicates(String),

    #[error("no matcher produced a valid position for this hunk")]
    PositionUndetermined,

    #[error("target file not found: {0}")]
    FileNotFound(String),

    #[error("a new file already exists at: {0}")]
    NewFileExists(String),

    #[error("stage exceeded its wall-clock budget")]
    Timeout,

    #[error("unexpected pipeline failure in stage {stage:?}: {message}")]
    Pipeline {
        stage: PipelineStage,
        message: String,
    },
}

impl PatchError {
    /// The stable string tag used in the result surface's `error_details`.
    pub fn tag(&self) -> &'static str {
        match self {
            PatchError::Malformed(_) => "Malformed",
            PatchError::LargeOffset { .. } => "LargeOffset",
            PatchError::LowConfidence { .. } => "LowConfidence",
            PatchError::VerificationFailed { .. } => "VerificationFailed",
            PatchError::UnexpectedDuplicates(_) => "UnexpectedDuplicates",
            PatchError::PositionUndetermined => "PositionUndetermined",
            PatchError::FileNotFound(_) => "FileNotFound",
            PatchError::NewFileExists(_) => "NewFileExists",
            PatchError::Timeout => "Timeout",
            PatchError::Pipeline { .. } => "Pipeline",
        }
    }
}

/// Detailed per-(hunk, stage) error record, mirroring the source's
/// `HunkErrorInfo` dataclass.
#[derive(Debug, Clone, Serialize)]
pub struct HunkErrorInfo {
    pub hunk_id: usize,
    pub stage: PipelineStage,
    pub error_type: &'static str,
    pub message: String,
    pub confidence: Option<f32>,
    pub position: Option<usize>,
}

impl HunkErrorInfo {
    pub fn from_error(hunk_id: usize, stage: PipelineStage, err: &PatchError) -> Self {
        let confidence = match err {
            PatchError::LowConfidence { best_ratio } => Some(*best_ratio),
            PatchError::VerificationFailed { quality } => Some(*quality),
            _ => None,
        };
        HunkErrorInfo {
            hunk_id,
            stage,
            error_type: err.tag(),
            message: err.to_string(),
            confidence,
            position: None,
        }
    }

    pub fn with_position(mut self, position: Option<usize>) -> Self {
        self.position = position;
        self
    }
}

impl fmt::Display for HunkErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}/{}] hunk {}: {}",
            self.stage, self.error_type, self.hunk_id, self.message
        )
    }
}

/// Accumulates per-hunk error history across stages without letting a later,
/// less specific failure clobber an earlier, more specific one. Also keeps a
/// list of patch-level (not tied to a single hunk) errors.
///
/// Stage priority, most to least specific at reporting time:
/// `Init < SystemPatch < GitApply < Difflib < LlmResolver < Complete`; within
/// a stage, records carrying a confidence value win, and among those the
/// highest confidence wins.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    hunk_errors: HashMap<usize, HashMap<PipelineStage, HunkErrorInfo>>,
    pipeline_errors: Vec<(PipelineStage, String)>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hunk_error(&mut self, info: HunkErrorInfo) {
        self.hunk_errors
            .entry(info.hunk_id)
            .or_default()
            .insert(info.stage, info);
    }

    pub fn add_pipeline_error(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.pipeline_errors.push((stage, message.into()));
    }

    pub fn pipeline_errors(&self) -> &[(PipelineStage, String)] {
        &self.pipeline_errors
    }

    /// Pick the most specific recorded error for a hunk, by stage priority
    /// and then by confidence.
    pub fn most_specific_error(&self, hunk_id: usize) -> Option<&HunkErrorInfo> {
        let by_stage = self.hunk_errors.get(&hunk_id)?;
        by_stage
            .values()
            .max_by(|a, b| {
                a.stage
                    .cmp(&b.stage)
                    .then_with(|| a.confidence.is_some().cmp(&b.confidence.is_some()))
                    .then_with(|| {
                        a.confidence
                            .unwrap_or(0.0)
                            .partial_cmp(&b.confidence.unwrap_or(0.0))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
    }

    pub fn all_most_specific(&self) -> Vec<HunkErrorInfo> {
        self.hunk_errors
            .keys()
            .filter_map(|id| self.most_specific_error(*id).cloned())
            .collect()
    }
}
