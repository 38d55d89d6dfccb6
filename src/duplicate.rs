//! Unexpected-duplicate detector: rejects a proposed application preview
//! that would introduce adjacent-duplicate or over-repeated content the
//! original file did not already have nearby.

const WINDOW: usize = 5;
const BLOCK_MIN: usize = 3;
const BLOCK_MAX: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    pub adjacent_pairs: Vec<(usize, String)>,
    pub repeated_blocks: Vec<(usize, usize, Vec<String>)>,
}

impl DuplicateReport {
    pub fn is_clean(&self) -> bool {
        self.adjacent_pairs.is_empty() && self.repeated_blocks.is_empty()
    }
}

fn window_bounds(len: usize, center: usize, radius: usize) -> (usize, usize) {
    let start = center.saturating_sub(radius);
    let end = (center + radius).min(len);
    (start, end)
}

fn adjacent_identical_pairs(lines: &[String], start: usize, end: usize) -> Vec<(usize, String)> {
    let mut pairs = Vec::new();
    for i in start..end.saturating_sub(1) {
        if i + 1 < lines.len() && !lines[i].trim().is_empty() && lines[i] == lines[i + 1] {
            pairs.push((i, lines[i].clone()));
        }
    }
    pairs
}

fn count_block_occurrences(lines: &[String], start: usize, end: usize, block_len: usize) -> Vec<(usize, Vec<String>)> {
    let mut counts: std::collections::HashMap<Vec<String>, Vec<usize>> = std::collections::HashMap::new();
    if end < block_len {
        return Vec::new();
    }
    for i in start..=(end - block_len).min(lines.len().saturating_sub(block_len)) {
        if i + block_len > lines.len() {
            break;
        }
        let block = lines[i..i + block_len].to_vec();
        if block.iter().all(|l| l.trim().is_empty()) {
            continue;
        }
        counts.entry(block).or_default().push(i);
    }
    counts
        .into_iter()
        .filter(|(_, positions)| positions.len() >= 2)
        .map(|(block, positions)| (positions.len(), block))
        .collect()
}

/// Scan a window `pos ± 5` and report duplicate content introduced by
/// applying `preview` that wasn't already present (within `pos ±
/// context_lines`) in `original`.
pub fn detect_unexpected_duplicates(
    original: &[String],
    preview: &[String],
    pos: usize,
    context_lines: usize,
) -> DuplicateReport {
    let (win_start, win_end) = window_bounds(preview.len(), pos, WINDOW);
    let (orig_start, orig_end) = window_bounds(original.len(), pos, context_lines.max(WINDOW));

    let mut report = DuplicateReport::default();

    let preview_pairs = adjacent_identical_pairs(preview, win_start, win_end);
    let original_pairs: std::collections::HashSet<String> =
        adjacent_identical_pairs(original, orig_start, orig_end)
            .into_iter()
            .map(|(_, l)| l)
            .collect();
    for (idx, line) in preview_pairs {
        if !original_pairs.contains(&line) {
            report.adjacent_pairs.push((idx, line));
        }
    }

    for block_len in BLOCK_MIN..=BLOCK_MAX {
        let preview_blocks = count_block_occurrences(preview, win_start, win_end, block_len);
        for (preview_count, block) in preview_blocks {
            let orig_count = count_block_occurrences(original, orig_start, orig_end, block_len)
                .into_iter()
                .find(|(_, b)| *b == block)
                .map(|(c, _)| c)
                .unwrap_or(0);
            // One extra occurrence is allowed for the intended change.
            if preview_count > orig_count + 1 {
                report.repeated_blocks.push((block_len, preview_count, block));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn clean_preview_has_no_duplicates() {
        let original = v(&["a", "b", "c", "d"]);
        let preview = v(&["a", "B", "c", "d"]);
        let report = detect_unexpected_duplicates(&original, &preview, 1, 5);
        assert!(report.is_clean());
    }

    #[test]
    fn new_adjacent_duplicate_is_flagged() {
        let original = v(&["a", "b", "c", "d"]);
        let preview = v(&["a", "b", "b", "c", "d"]);
        let report = detect_unexpected_duplicates(&original, &preview, 1, 5);
        assert!(!report.adjacent_pairs.is_empty());
    }

    #[test]
    fn pre_existing_adjacent_duplicate_is_not_flagged() {
        let original = v(&["a", "b", "b", "c"]);
        let preview = v(&["a", "b", "b", "c"]);
        let report = detect_unexpected_duplicates(&original, &preview, 1, 5);
        assert!(report.adjacent_pairs.is_empty());
    }
}
