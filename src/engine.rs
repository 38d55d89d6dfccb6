//! Public facade: [`DiffEngine`] is the one entry point library callers and
//! the CLI binary both go through, centralizing each operation's external
//! surface behind a single struct.

use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::model::PipelineResult;
use crate::pipeline;
use crate::reverse;

/// A configured diff-application engine. Cheap to construct; holds only
/// its [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct DiffEngine {
    config: EngineConfig,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DiffEngine {
    pub fn new(config: EngineConfig) -> Self {
        DiffEngine { config }
    }

    /// Build an engine from `ZIYA_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply `diff_text` to the file at `path`, writing the result in place
    /// when at least one hunk succeeds.
    pub fn apply(&self, path: impl AsRef<Path>, diff_text: &str) -> PipelineResult {
        pipeline::run(path.as_ref(), diff_text, &self.config)
    }

    /// Undo the effect of `diff_text` on the file at `path`.
    pub fn apply_reverse(&self, path: impl AsRef<Path>, diff_text: &str) -> PipelineResult {
        reverse::run_reverse(path.as_ref(), diff_text, &self.config)
    }

    /// Apply a combined multi-file patch, one [`PipelineResult`] per file.
    pub fn apply_combined(&self, base_dir: impl AsRef<Path>, diff_text: &str) -> Vec<PipelineResult> {
        let base_dir = base_dir.as_ref();
        crate::parser::split_combined_diff(diff_text)
            .into_iter()
            .filter_map(|piece| {
                let target = crate::parser::extract_target_file_from_diff(&piece)?;
                let path: PathBuf = base_dir.join(target);
                Some(self.apply(path, &piece))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn apply_then_reverse_restores_original_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.py");
        std::fs::write(&path, "def a():\n    return 1\n").unwrap();
        let patch = "@@ -1,2 +1,2 @@\n def a():\n-    return 1\n+    return 2\n";

        let engine = DiffEngine::default();
        let forward = engine.apply(&path, patch);
        assert!(forward.changes_written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def a():\n    return 2\n");

        let backward = engine.apply_reverse(&path, patch);
        assert!(backward.changes_written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def a():\n    return 1\n");
    }

    #[test]
    fn apply_combined_routes_each_piece_to_its_own_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "y = 1\n").unwrap();
        let patch = "diff --git a/a.py b/a.py\n--- a/a.py\n+++ b/a.py\n@@ -1,1 +1,1 @@\n-x = 1\n+x = 2\ndiff --git a/b.py b/b.py\n--- a/b.py\n+++ b/b.py\n@@ -1,1 +1,1 @@\n-y = 1\n+y = 2\n";

        let engine = DiffEngine::default();
        let results = engine.apply_combined(dir.path(), patch);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.changes_written));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.py")).unwrap(), "x = 2\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("b.py")).unwrap(), "y = 2\n");
    }
}
