//! A robust unified-diff application engine that keeps looking for where a
//! patch belongs even when line numbers, whitespace, or surrounding context
//! have drifted, and refuses to guess when it can't verify the result.

pub mod applier;
pub mod config;
pub mod duplicate;
pub mod engine;
pub mod error;
pub mod fileops;
pub mod host;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod ordering;
pub mod parser;
pub mod pipeline;
pub mod reverse;
pub mod tool_seam;
pub mod validators;

pub use config::EngineConfig;
pub use engine::DiffEngine;
pub use error::{ErrorTracker, HunkErrorInfo, PatchError};
pub use model::{Hunk, HunkId, HunkStatus, HunkTracker, PipelineResult, PipelineStage, PipelineStatus};
pub use tool_seam::PatchTool;

/// Install a `tracing` subscriber reading `RUST_LOG`, falling back to
/// `info` for this crate's own spans. Call once from a binary's `main`;
/// library consumers that already have a subscriber installed should skip
/// this.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
