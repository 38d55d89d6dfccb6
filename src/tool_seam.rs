//! A minimal stand-in for the seam an external assistant loop would plug
//! into: a struct shaped like a registry tool (name, description, JSON
//! input schema, `execute`) wrapping [`crate::engine::DiffEngine`]. No
//! registry or dispatch loop is implemented here — just the contract an
//! HTTP layer or tool registry would call through.

use std::path::Path;

use serde_json::Value;

use crate::engine::DiffEngine;

/// JSON-schema-shaped description of a tool's expected input, matching the
/// `{type, properties, required}` triple a tool-calling loop would send to
/// a model.
#[derive(Debug, Clone)]
pub struct ToolInputSchema {
    pub schema_type: &'static str,
    pub properties: Value,
    pub required: Vec<&'static str>,
}

/// Apply-a-diff tool, callable with a `{file_path, patch}` JSON object.
pub struct PatchTool {
    engine: DiffEngine,
}

impl PatchTool {
    pub fn new(engine: DiffEngine) -> Self {
        PatchTool { engine }
    }

    pub fn name(&self) -> &str {
        "patch"
    }

    pub fn description(&self) -> &str {
        "Apply a unified diff to a file. Accepts standard unified diff format \
         with @@ hunk headers, context lines (space prefix), removed lines \
         (- prefix), and added lines (+ prefix). Tolerates shifted line \
         numbers and minor whitespace drift; refuses to guess when a hunk's \
         target location is ambiguous."
    }

    pub fn input_schema(&self) -> ToolInputSchema {
        ToolInputSchema {
            schema_type: "object",
            properties: serde_json::json!({
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to patch"
                },
                "patch": {
                    "type": "string",
                    "description": "The unified diff to apply, with @@ hunk headers"
                }
            }),
            required: vec!["file_path", "patch"],
        }
    }

    /// Run the tool against a `{file_path, patch}` input object, returning a
    /// human-readable summary or an error message.
    pub fn execute(&self, input: &Value) -> Result<String, String> {
        let file_path = input["file_path"]
            .as_str()
            .ok_or("missing file_path parameter")?;
        let patch_text = input["patch"].as_str().ok_or("missing patch parameter")?;

        let result = self.engine.apply(Path::new(file_path), patch_text);
        if let Some(err) = &result.error {
            if !result.changes_written {
                return Err(err.clone());
            }
        }

        let succeeded = result.succeeded().len();
        let already_applied = result.already_applied().len();
        let failed = result.failed().len();
        Ok(format!(
            "{}: {} hunk(s) applied, {} already applied, {} failed",
            file_path, succeeded, already_applied, failed
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn executes_a_clean_patch_via_the_json_seam() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.py");
        std::fs::write(&path, "def a():\n    return 1\n").unwrap();
        let tool = PatchTool::new(DiffEngine::default());
        let input = serde_json::json!({
            "file_path": path.to_str().unwrap(),
            "patch": "@@ -1,2 +1,2 @@\n def a():\n-    return 1\n+    return 2\n",
        });
        let summary = tool.execute(&input).unwrap();
        assert!(summary.contains("1 hunk(s) applied"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "def a():\n    return 2\n");
    }

    #[test]
    fn reports_missing_parameters() {
        let tool = PatchTool::new(DiffEngine::default());
        let err = tool.execute(&serde_json::json!({})).unwrap_err();
        assert!(err.contains("file_path"));
    }
}
