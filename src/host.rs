//! Optional accelerators: shell out to the host `patch` or `git apply`
//! binary before falling back to the in-process matcher, draining child
//! output the same way as any other subprocess invocation.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, warn};

const HOST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-hunk outcome reported by a host binary's stderr/stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostHunkOutcome {
    Succeeded,
    AlreadyApplied,
    Failed,
}

#[derive(Debug)]
pub struct HostRunResult {
    pub exit_success: bool,
    pub stdout: String,
    pub stderr: String,
    /// 1-based hunk number -> outcome, parsed from `patch`'s "Hunk #N ..."
    /// lines. Empty if the binary gave no such detail (e.g. `git apply`).
    pub hunk_outcomes: Vec<(usize, HostHunkOutcome)>,
}

/// Run `program` with `args`, feeding `stdin_data` on stdin, and enforce a
/// wall-clock timeout using a watchdog thread + channel (no external timeout
/// dependency, matching the rest of the dependency-light process layer).
fn run_with_timeout(
    program: &str,
    args: &[&str],
    cwd: &Path,
    stdin_data: &str,
) -> std::io::Result<Option<std::process::Output>> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(stdin_data.as_bytes());
    }
    let pid = child.id();

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let output = child.wait_with_output();
        let _ = tx.send(output);
    });

    match rx.recv_timeout(HOST_TIMEOUT) {
        Ok(result) => result.map(Some),
        Err(_) => {
            warn!(program, pid, "host binary exceeded timeout, killing");
            #[cfg(unix)]
            {
                let _ = Command::new("kill").arg("-9").arg(pid.to_string()).status();
            }
            Ok(None)
        }
    }
}

fn parse_patch_hunk_outcomes(output: &str) -> Vec<(usize, HostHunkOutcome)> {
    let mut outcomes = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix("Hunk #") else {
            continue;
        };
        let mut parts = rest.splitn(2, ' ');
        let Some(num_str) = parts.next() else { continue };
        let Ok(num) = num_str.parse::<usize>() else { continue };
        let tail = parts.next().unwrap_or("");
        let outcome = if tail.contains("already applied") {
            HostHunkOutcome::AlreadyApplied
        } else if tail.contains("succeeded") {
            HostHunkOutcome::Succeeded
        } else if tail.contains("FAILED") {
            HostHunkOutcome::Failed
        } else {
            continue;
        };
        outcomes.push((num, outcome));
    }
    outcomes
}

/// Try the host `patch` binary: `patch -p1 --fuzz=3 --no-backup-if-mismatch`.
pub fn try_host_patch(repo_root: &Path, relative_path: &str, diff_text: &str) -> Option<HostRunResult> {
    run_host_patch(repo_root, relative_path, diff_text, false)
}

/// Try the host `patch` binary in reverse mode (`patch -R`), for undoing a
/// previously-applied diff.
pub fn try_host_patch_reverse(repo_root: &Path, relative_path: &str, diff_text: &str) -> Option<HostRunResult> {
    run_host_patch(repo_root, relative_path, diff_text, true)
}

fn patch_args(reverse: bool, dry_run: bool) -> Vec<&'static str> {
    let mut args = vec!["-p1", "--fuzz=3", "--no-backup-if-mismatch", "--input=-"];
    if reverse {
        args.push("-R");
    }
    if dry_run {
        args.push("--dry-run");
    }
    args
}

/// `patch` mutates the file on disk as it goes, hunk by hunk, so a dry run
/// is the only way to know every hunk would succeed before committing to
/// any of them. Only run for real if the dry run's exit status is success.
fn run_host_patch(
    repo_root: &Path,
    relative_path: &str,
    diff_text: &str,
    reverse: bool,
) -> Option<HostRunResult> {
    debug!(relative_path, reverse, "dry-running host patch binary");
    match run_with_timeout("patch", &patch_args(reverse, true), repo_root, diff_text) {
        Ok(Some(output)) => {
            if !output.status.success() {
                return None;
            }
        }
        Ok(None) => return None, // timed out
        Err(e) => {
            debug!(error = %e, "host patch binary unavailable");
            return None;
        }
    }

    debug!(relative_path, reverse, "invoking host patch binary");
    match run_with_timeout("patch", &patch_args(reverse, false), repo_root, diff_text) {
        Ok(Some(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let hunk_outcomes = parse_patch_hunk_outcomes(&stdout);
            Some(HostRunResult {
                exit_success: output.status.success(),
                stdout,
                stderr,
                hunk_outcomes,
            })
        }
        Ok(None) => None, // timed out
        Err(e) => {
            debug!(error = %e, "host patch binary unavailable");
            None
        }
    }
}

fn run_git_apply(repo_root: &Path, diff_text: &str, check_only: bool) -> Option<HostRunResult> {
    let mut args = vec!["apply", "--whitespace=nowarn", "-p1", "--recount"];
    if check_only {
        args.push("--check");
    } else {
        args.push("--reject");
    }
    args.push("-");
    debug!(check_only, "invoking host git apply");
    match run_with_timeout("git", &args, repo_root, diff_text) {
        Ok(Some(output)) => Some(HostRunResult {
            exit_success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            hunk_outcomes: Vec::new(),
        }),
        Ok(None) => None,
        Err(e) => {
            debug!(error = %e, "host git binary unavailable");
            None
        }
    }
}

/// Dry-run `git apply --check`, mutating nothing. Gate for [`try_git_apply`].
pub fn try_git_apply_check(repo_root: &Path, diff_text: &str) -> Option<HostRunResult> {
    run_git_apply(repo_root, diff_text, true)
}

/// Try `git apply --whitespace=nowarn -p1 --reject` for a repository-rooted
/// patch. Callers should gate this on a prior successful
/// [`try_git_apply_check`].
pub fn try_git_apply(repo_root: &Path, diff_text: &str) -> Option<HostRunResult> {
    run_git_apply(repo_root, diff_text, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_hunk_outcomes() {
        let output = "patching file foo.rs\nHunk #1 succeeded at 10.\nHunk #2 FAILED at 20.\nHunk #3 already applied.\n";
        let outcomes = parse_patch_hunk_outcomes(output);
        assert_eq!(outcomes, vec![
            (1, HostHunkOutcome::Succeeded),
            (2, HostHunkOutcome::Failed),
            (3, HostHunkOutcome::AlreadyApplied),
        ]);
    }

    #[test]
    fn missing_host_binary_returns_none_without_panicking() {
        let dir = std::env::temp_dir();
        assert!(run_with_timeout("definitely-not-a-real-binary", &[], &dir, "").is_err());
    }
}
