//! Byte-faithful match at the header-specified position.

use crate::normalize::lines_equal;

use super::MatchResult;

/// Succeeds iff `file_lines[pos .. pos+|old_block|]` equals `old_block`
/// under `normalize_line_for_comparison`.
pub fn strict_match(file_lines: &[String], old_block: &[String], pos: usize) -> Option<MatchResult> {
    if old_block.is_empty() {
        return None;
    }
    if pos + old_block.len() > file_lines.len() {
        return None;
    }
    let slice = &file_lines[pos..pos + old_block.len()];
    if slice.iter().zip(old_block).all(|(a, b)| lines_equal(a, b)) {
        Some(MatchResult {
            position: pos,
            confidence: 1.0,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_slice() {
        let file: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let block: Vec<String> = vec!["b".into(), "c".into()];
        let m = strict_match(&file, &block, 1).unwrap();
        assert_eq!(m.position, 1);
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn tolerates_surrounding_whitespace_via_normalization() {
        let file: Vec<String> = vec!["  b  ".into()];
        let block: Vec<String> = vec!["b".into()];
        assert!(strict_match(&file, &block, 0).is_some());
    }

    #[test]
    fn rejects_mismatch() {
        let file: Vec<String> = vec!["x".into()];
        let block: Vec<String> = vec!["y".into()];
        assert!(strict_match(&file, &block, 0).is_none());
    }

    #[test]
    fn rejects_out_of_bounds() {
        let file: Vec<String> = vec!["a".into()];
        let block: Vec<String> = vec!["a".into(), "b".into()];
        assert!(strict_match(&file, &block, 0).is_none());
    }
}
