//! Filesystem side effects: new-file creation from pure-addition patches,
//! and cleanup of stray `.rej`/`.orig` artifacts a host `patch` binary may
//! leave behind.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::PatchError;
use crate::model::{Hunk, LineTerminator};

/// Build the full text of a brand-new file from its hunks, in order. A
/// new-file patch is valid with more than one hunk (each hunk still carries
/// only added/context lines); every hunk's `new_lines` is folded in so no
/// hunk is silently dropped.
pub fn content_for_new_file(hunks: &[Hunk], terminator: LineTerminator) -> String {
    let mut ordered: Vec<&Hunk> = hunks.iter().collect();
    ordered.sort_by_key(|h| h.new_start);
    let body = ordered
        .iter()
        .flat_map(|h| h.new_lines.iter())
        .cloned()
        .collect::<Vec<_>>()
        .join(terminator.as_str());
    let missing_newline = ordered.last().map_or(false, |h| h.missing_newline);
    if missing_newline || body.is_empty() {
        body
    } else {
        format!("{body}{}", terminator.as_str())
    }
}

/// Create `path` with the content implied by a new-file-creation patch's
/// hunks. Refuses if the file already exists.
pub fn create_new_file(path: &Path, hunks: &[Hunk]) -> Result<(), PatchError> {
    if path.exists() {
        return Err(PatchError::NewFileExists(path.display().to_string()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| PatchError::Malformed(format!("cannot create parent dirs: {e}")))?;
        }
    }
    let content = content_for_new_file(hunks, LineTerminator::Lf);
    fs::write(path, content)
        .map_err(|e| PatchError::Malformed(format!("cannot write new file {}: {e}", path.display())))
}

/// Read a file's content, remembering whether it ended in a newline, so the
/// applier can faithfully reproduce the original terminator policy.
pub fn read_file(path: &Path) -> Result<(Vec<String>, bool, LineTerminator)> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read file: {}", path.display()))?;
    let terminator = LineTerminator::detect(&content);
    let had_trailing_newline = content.ends_with('\n') || content.ends_with("\r\n");
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    Ok((lines, had_trailing_newline, terminator))
}

pub fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Remove `.rej`/`.orig` artifacts a host `patch` invocation may have left
/// next to `path` after a partial or rejected application.
pub fn cleanup_patch_artifacts(path: &Path) {
    for ext in ["rej", "orig"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(format!(".{ext}"));
        let candidate = Path::new(&candidate);
        if candidate.exists() {
            let _ = fs::remove_file(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;
    use tempfile::TempDir;

    #[test]
    fn builds_new_file_content_with_trailing_newline() {
        let patch = "@@ -0,0 +1,2 @@\n+fn main() {}\n+\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let content = content_for_new_file(&hunks, LineTerminator::Lf);
        assert_eq!(content, "fn main() {}\n\n");
    }

    #[test]
    fn folds_every_hunk_of_a_multi_hunk_new_file() {
        let patch = "@@ -0,0 +1,2 @@\n+fn main() {}\n+\n@@ -0,0 +3,2 @@\n+fn other() {}\n+\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let content = content_for_new_file(&hunks, LineTerminator::Lf);
        assert_eq!(content, "fn main() {}\n\nfn other() {}\n\n");
    }

    #[test]
    fn refuses_to_overwrite_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("existing.rs");
        fs::write(&path, "old\n").unwrap();
        let patch = "@@ -0,0 +1,1 @@\n+new\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let err = create_new_file(&path, &hunks).unwrap_err();
        assert!(matches!(err, PatchError::NewFileExists(_)));
    }

    #[test]
    fn creates_file_and_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/sub/new.rs");
        let patch = "@@ -0,0 +1,1 @@\n+fn main() {}\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        create_new_file(&path, &hunks).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "fn main() {}\n");
    }

    #[test]
    fn cleanup_removes_reject_and_orig_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.rs");
        fs::write(&path, "content\n").unwrap();
        fs::write(dir.path().join("f.rs.rej"), "rejected\n").unwrap();
        fs::write(dir.path().join("f.rs.orig"), "orig\n").unwrap();
        cleanup_patch_artifacts(&path);
        assert!(!dir.path().join("f.rs.rej").exists());
        assert!(!dir.path().join("f.rs.orig").exists());
    }
}
