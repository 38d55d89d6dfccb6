//! Validators: new-file detection, already-applied detection, and
//! malformed-state (contradictory patch) detection.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Hunk;
use crate::normalize::{lines_equal, normalize_line_for_comparison};

/// Detect new-file creation: both `--- /dev/null` and `new file mode`, or a
/// `@@ -0,0 +N,M @@` header, with no removal lines and exactly one hunk.
pub fn is_new_file_creation(diff_text: &str) -> bool {
    let lines: Vec<&str> = diff_text.lines().collect();
    if lines.is_empty() {
        return false;
    }

    let has_zero_header = lines.iter().take(10).any(|l| l.starts_with("@@ -0,0"));
    let has_dev_null = lines.iter().take(10).any(|l| *l == "--- /dev/null");
    let has_new_file_mode = lines.iter().take(10).any(|l| l.contains("new file mode"));
    if !has_zero_header && !(has_dev_null && has_new_file_mode) {
        return false;
    }

    let has_removals = lines
        .iter()
        .any(|l| l.starts_with('-') && !l.starts_with("---"));
    if has_removals {
        return false;
    }
    let hunk_count = lines.iter().filter(|l| l.starts_with("@@")).count();
    hunk_count == 1
}

/// Character offset of a line within a joined block, used for proximity
/// checks in malformed-state detection.
fn char_offset_of<'a>(lines: &[&'a str], upto: usize) -> usize {
    lines.iter().take(upto).map(|l| l.len() + 1).sum()
}

fn find_block_offset(file_text: &str, block: &str) -> Option<usize> {
    if block.is_empty() {
        return None;
    }
    file_text.find(block)
}

/// Detect a contradictory patch state. Returns true when the patch should
/// be rejected outright rather than applied or marked already-applied.
pub fn is_malformed_state(hunk: &Hunk, file_lines: &[String]) -> bool {
    let file_text = file_lines.join("\n");

    if !hunk.removed_lines.is_empty() && !hunk.added_lines.is_empty() {
        let removed_block = hunk.removed_lines.join("\n");
        let added_block = hunk.added_lines.join("\n");

        if let (Some(r_off), Some(a_off)) = (
            find_block_offset(&file_text, &removed_block),
            find_block_offset(&file_text, &added_block),
        ) {
            let distance = r_off.abs_diff(a_off);
            let max_len = removed_block.len().max(added_block.len()).max(1);
            let within_proximity = distance <= max_len * 3;

            let neither_substring =
                !removed_block.contains(&added_block) && !added_block.contains(&removed_block);

            let is_whitespace_only_change = crate::normalize::whitespace_only_diff(
                &removed_block.replace('\n', " "),
                &added_block.replace('\n', " "),
            );

            let added_subset_of_removed = hunk
                .added_lines
                .iter()
                .all(|l| hunk.removed_lines.iter().any(|r| lines_equal(l, r)));

            if within_proximity
                && neither_substring
                && !is_whitespace_only_change
                && !added_subset_of_removed
            {
                return true;
            }
        }
    }

    if hunk.added_lines.len() > 2 && hunk.removed_lines.len() > 2 {
        let added_block = hunk.added_lines.join("\n");
        let removed_block = hunk.removed_lines.join("\n");

        let expected_offset = char_offset_of(
            &file_lines.iter().map(String::as_str).collect::<Vec<_>>(),
            hunk.expected_index(),
        );
        if let Some(a_off) = find_block_offset(&file_text, &added_block) {
            let max_len = added_block.len().max(1);
            let near_expected = a_off.abs_diff(expected_offset) <= max_len * 10;
            let removed_present = find_block_offset(&file_text, &removed_block).is_some();
            if near_expected && !removed_present {
                return true;
            }
        }
    }

    false
}

/// Does a contiguous window of `file_lines` starting at `pos` equal `block`
/// under normalization?
fn window_matches(file_lines: &[String], pos: usize, block: &[String]) -> bool {
    if pos + block.len() > file_lines.len() {
        return false;
    }
    file_lines[pos..pos + block.len()]
        .iter()
        .zip(block)
        .all(|(a, b)| lines_equal(a, b))
}

/// First 0-based position where `block` appears as a contiguous window of
/// `file_lines` under normalization, searching the whole file.
fn find_block_position(file_lines: &[String], block: &[String]) -> Option<usize> {
    if block.is_empty() || block.len() > file_lines.len() {
        return None;
    }
    (0..=file_lines.len() - block.len()).find(|&pos| window_matches(file_lines, pos, block))
}

fn contains_block_anywhere(file_lines: &[String], block: &[String]) -> bool {
    find_block_position(file_lines, block).is_some()
}

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:import\s+(?:\{([^}]*)\}\s+from\s+['"]([^'"]+)['"]|(\S+)\s+from\s+['"]([^'"]+)['"]|['"]([^'"]+)['"])|from\s+(\S+)\s+import\s+(.+)|const\s+(\w+)\s*=\s*require\(['"]([^'"]+)['"]\))"#,
    )
    .unwrap()
});

struct ImportStatement {
    module: String,
    symbols: Vec<String>,
}

fn parse_import(line: &str) -> Option<ImportStatement> {
    let caps = IMPORT_RE.captures(line)?;
    if let Some(m) = caps.get(2) {
        let symbols = caps
            .get(1)
            .map(|s| {
                s.as_str()
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        return Some(ImportStatement {
            module: m.as_str().to_string(),
            symbols,
        });
    }
    if let (Some(sym), Some(module)) = (caps.get(3), caps.get(4)) {
        return Some(ImportStatement {
            module: module.as_str().to_string(),
            symbols: vec![sym.as_str().to_string()],
        });
    }
    if let Some(module) = caps.get(6) {
        let symbols = caps
            .get(7)
            .map(|s| {
                s.as_str()
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .collect()
            })
            .unwrap_or_default();
        return Some(ImportStatement {
            module: module.as_str().to_string(),
            symbols,
        });
    }
    if let (Some(_), Some(module)) = (caps.get(8), caps.get(9)) {
        return Some(ImportStatement {
            module: module.as_str().to_string(),
            symbols: Vec::new(),
        });
    }
    None
}

/// An added import line is already applied if the file already imports
/// from the same module with an overlapping symbol set.
fn import_already_present(added_line: &str, file_lines: &[String]) -> bool {
    let Some(added) = parse_import(added_line) else {
        return false;
    };
    file_lines.iter().any(|line| {
        let Some(existing) = parse_import(line) else {
            return false;
        };
        if existing.module != added.module {
            return false;
        }
        if added.symbols.is_empty() || existing.symbols.is_empty() {
            return true;
        }
        added.symbols.iter().any(|s| existing.symbols.contains(s))
    })
}

/// Is this hunk already applied?
pub fn is_hunk_already_applied(file_lines: &[String], hunk: &Hunk, pos: usize) -> bool {
    if hunk.old_block.is_empty() && hunk.new_lines.is_empty() {
        return false;
    }
    if is_malformed_state(hunk, file_lines) {
        return false;
    }

    if hunk.is_pure_addition() {
        let ctx_lines: Vec<String> = hunk
            .old_block
            .iter()
            .cloned()
            .collect();
        if ctx_lines.is_empty() {
            if contains_block_anywhere(file_lines, &hunk.added_lines) {
                return true;
            }
            return hunk
                .added_lines
                .iter()
                .all(|l| import_already_present(l, file_lines));
        }
        // Context + added lines appear as a contiguous block somewhere.
        if window_matches(file_lines, pos, &hunk.new_lines) {
            return true;
        }
        if contains_block_anywhere(file_lines, &hunk.new_lines) {
            return true;
        }
        return hunk
            .added_lines
            .iter()
            .all(|l| import_already_present(l, file_lines));
    }

    // Hunks with removals: the new content can have already landed at any
    // position in the file, not just the hunk's expected one — an earlier
    // unrelated edit can shift it. Search the whole file for `new_lines`
    // and confirm `old_block` is absent at that same position.
    let Some(found_pos) = find_block_position(file_lines, &hunk.new_lines) else {
        return false;
    };
    let removal_would_be_noop = !window_matches(file_lines, found_pos, &hunk.old_block);
    if !removal_would_be_noop {
        return false;
    }

    if hunk.removed_lines.len() >= 3 {
        let n = hunk.removed_lines.len();
        let mid_start = n / 4;
        let mid_end = (n - n / 4).max(mid_start + 1);
        let middle_half = &hunk.removed_lines[mid_start..mid_end];
        if !middle_half.is_empty() && contains_block_anywhere(file_lines, middle_half) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;

    #[test]
    fn detects_new_file_creation() {
        let diff = "--- /dev/null\n+++ b/new.rs\nnew file mode 100644\n@@ -0,0 +1,2 @@\n+fn main() {}\n+\n";
        assert!(is_new_file_creation(diff));
    }

    #[test]
    fn rejects_new_file_with_removals() {
        let diff = "--- /dev/null\n+++ b/new.rs\nnew file mode 100644\n@@ -0,0 +1,2 @@\n+fn main() {}\n-stale\n";
        assert!(!is_new_file_creation(diff));
    }

    #[test]
    fn pure_addition_already_applied_anywhere() {
        let hunks =
            parse_unified_diff("@@ -1,1 +1,2 @@\n use crate::x;\n+use crate::y;\n", None).unwrap();
        let file_lines: Vec<String> = vec!["use crate::x;".into(), "use crate::y;".into()];
        assert!(is_hunk_already_applied(&file_lines, &hunks[0], 0));
    }

    #[test]
    fn malformed_replacement_is_detected() {
        let patch = "@@ -1,2 +1,2 @@\n-foo = 1\n+foo = 2\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let file_lines: Vec<String> = vec!["foo = 1".into(), "foo = 2".into()];
        assert!(is_malformed_state(&hunks[0], &file_lines));
    }

    #[test]
    fn already_applied_with_removal_requires_distinctive_check() {
        let patch = "@@ -1,3 +1,3 @@\n-return 1\n-return 2\n-return 3\n+changed 1\n+changed 2\n+changed 3\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        // File already shows the changed content, and the middle of the
        // original removed block is nowhere else in the file.
        let file_lines: Vec<String> = vec!["changed 1".into(), "changed 2".into(), "changed 3".into()];
        assert!(is_hunk_already_applied(&file_lines, &hunks[0], 0));
    }
}
