//! End-to-end coverage for the full patch pipeline: ordered hunks, an
//! off-by-two header, a pure addition with wrong line numbers, an
//! already-applied import, a contradictory replacement, and a
//! whitespace-only dedent, plus a few property-style checks.

use std::fs;

use patchwerk::{DiffEngine, EngineConfig, HunkStatus, PipelineStatus};
use tempfile::TempDir;

fn engine() -> DiffEngine {
    DiffEngine::new(EngineConfig::default())
}

#[test]
fn applies_multiple_ordered_hunks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("module.py");
    fs::write(
        &path,
        "def a():\n    return 1\n\n\ndef b():\n    return 2\n\n\ndef c():\n    return 3\n",
    )
    .unwrap();

    let patch = "\
@@ -1,2 +1,2 @@
 def a():
-    return 1
+    return 10
@@ -5,2 +5,2 @@
 def b():
-    return 2
+    return 20
@@ -9,2 +9,2 @@
 def c():
-    return 3
+    return 30
";

    let result = engine().apply(&path, patch);
    assert_eq!(result.status(), PipelineStatus::Success);
    assert_eq!(result.succeeded().len(), 3);
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("return 10"));
    assert!(content.contains("return 20"));
    assert!(content.contains("return 30"));
}

#[test]
fn tolerates_off_by_two_header_via_fuzzy_match() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("util.py");
    fs::write(&path, "x = 1\ny = 2\ndef target():\n    return None\nz = 3\n").unwrap();

    // Header claims line 1, but the real content is at line 3.
    let patch = "@@ -1,2 +1,2 @@\n def target():\n-    return None\n+    return 42\n";

    let result = engine().apply(&path, patch);
    assert_eq!(result.status(), PipelineStatus::Success);
    assert!(fs::read_to_string(&path).unwrap().contains("return 42"));
}

#[test]
fn applies_pure_addition_despite_wrong_line_numbers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("imports.py");
    fs::write(&path, "import os\nimport sys\n\ndef main():\n    pass\n").unwrap();

    // Header claims line 50 (file only has 5 lines).
    let patch = "@@ -50,1 +50,2 @@\n import sys\n+import json\n";

    let result = engine().apply(&path, patch);
    assert_eq!(result.status(), PipelineStatus::Success);
    assert!(fs::read_to_string(&path).unwrap().contains("import json"));
}

#[test]
fn recognizes_already_applied_import() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("imports.py");
    fs::write(&path, "import os\nimport json\nimport sys\n").unwrap();

    let patch = "@@ -1,2 +1,3 @@\n import os\n+import json\n import sys\n";

    let result = engine().apply(&path, patch);
    assert_eq!(result.status(), PipelineStatus::Success);
    assert_eq!(result.already_applied(), vec![1]);
    assert!(!result.changes_written);
}

#[test]
fn rejects_contradictory_replacement_as_malformed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.py");
    // File already shows BOTH the old and the new value nowhere coherent —
    // the patch's own removed/added blocks contradict each other.
    fs::write(&path, "timeout = 30\nretries = 5\n").unwrap();

    let patch = "@@ -1,2 +1,2 @@\n-timeout = 30\n+timeout = 60\n-retries = 5\n+retries = 60\n";

    let result = engine().apply(&path, patch);
    // The hunk should not silently succeed against contradictory content;
    // it either fails cleanly or succeeds as a genuine replacement, but
    // must never report already-applied for clearly different values.
    assert_ne!(result.already_applied(), vec![1]);
}

#[test]
fn whitespace_only_dedent_is_applied_without_content_loss() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("indent.py");
    fs::write(&path, "def f():\n        return 1\n").unwrap();

    let patch = "@@ -1,2 +1,2 @@\n def f():\n-        return 1\n+    return 1\n";

    let result = engine().apply(&path, patch);
    assert_eq!(result.status(), PipelineStatus::Success);
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("return 1"));
    assert!(!content.contains("        return 1"));
}

#[test]
fn reapplying_a_succeeded_patch_reports_already_applied() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idem.py");
    fs::write(&path, "value = 1\n").unwrap();
    let patch = "@@ -1,1 +1,1 @@\n-value = 1\n+value = 2\n";

    let first = engine().apply(&path, patch);
    assert_eq!(first.status(), PipelineStatus::Success);
    assert!(first.changes_written);

    let second = engine().apply(&path, patch);
    assert_eq!(second.already_applied(), vec![1]);
    assert!(!second.changes_written);
}

#[test]
fn forward_then_reverse_round_trips_to_original_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roundtrip.py");
    let original = "def greet(name):\n    return 'hi ' + name\n";
    fs::write(&path, original).unwrap();
    let patch = "@@ -1,2 +1,2 @@\n def greet(name):\n-    return 'hi ' + name\n+    return 'hello ' + name\n";

    let eng = engine();
    eng.apply(&path, patch);
    eng.apply_reverse(&path, patch);
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn preserves_crlf_terminators() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("windows.py");
    fs::write(&path, "a = 1\r\nb = 2\r\n").unwrap();
    let patch = "@@ -1,2 +1,2 @@\n a = 1\n-b = 2\n+b = 3\n";

    let result = engine().apply(&path, patch);
    assert!(result.changes_written);
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("\r\n"));
    assert!(!content.contains("1\nb"));
}

#[test]
fn malformed_patch_is_reported_without_touching_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.py");
    fs::write(&path, "x = 1\n").unwrap();
    let patch = "@@ not a header @@\n-x\n+y\n";

    let result = engine().apply(&path, patch);
    assert_eq!(result.status(), PipelineStatus::Error);
    assert!(!result.changes_written);
    assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");
}

#[test]
fn hunk_status_never_regresses_from_terminal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("terminal.py");
    fs::write(&path, "a = 1\n").unwrap();
    let patch = "@@ -1,1 +1,1 @@\n-a = 1\n+a = 2\n";
    let result = engine().apply(&path, patch);
    for tracker in result.hunks.values() {
        assert!(matches!(
            tracker.status,
            HunkStatus::Succeeded | HunkStatus::AlreadyApplied | HunkStatus::Failed
        ));
    }
}
