//! Hunk ordering and overlap merging: detect hunks whose old ranges overlap
//! or touch, merge them into one, and otherwise sort hunks into a safe
//! application order.

use crate::model::Hunk;

/// True if two hunks' old-file ranges overlap or are adjacent enough that
/// applying them independently would be unsafe.
fn ranges_touch(a: &Hunk, b: &Hunk) -> bool {
    let a_start = a.old_start;
    let a_end = a.old_start + a.old_count;
    let b_start = b.old_start;
    let b_end = b.old_start + b.old_count;
    a_start <= b_end && b_start <= a_end
}

/// Merge one pair of overlapping hunks into a single hunk spanning both,
/// assuming `first.old_start <= second.old_start`.
fn merge_pair(first: &Hunk, second: &Hunk, number: usize) -> Hunk {
    let old_start = first.old_start.min(second.old_start);
    let gap = second.old_start.saturating_sub(first.old_start + first.old_count);

    let mut old_block = first.old_block.clone();
    let mut new_lines = first.new_lines.clone();
    // `gap` context lines between the two hunks are implicitly shared; a
    // conservative merge assumes the source diff carried them as context in
    // one of the two hunks already when gap == 0, and otherwise simply
    // concatenates (gap > 0 means a fresh parse will be required upstream —
    // this implementation only merges genuinely touching/overlapping hunks).
    let _ = gap;
    old_block.extend(second.old_block.iter().cloned());
    new_lines.extend(second.new_lines.iter().cloned());

    let mut removed_lines = first.removed_lines.clone();
    removed_lines.extend(second.removed_lines.iter().cloned());
    let mut added_lines = first.added_lines.clone();
    added_lines.extend(second.added_lines.iter().cloned());

    Hunk {
        number,
        old_start,
        old_count: old_block.len(),
        new_start: first.new_start.min(second.new_start),
        new_count: new_lines.len(),
        old_block,
        new_lines,
        removed_lines,
        added_lines,
        missing_newline: second.missing_newline,
        header: format!(
            "@@ -{},{} +{},{} @@",
            old_start,
            first.old_count + second.old_count,
            first.new_start.min(second.new_start),
            first.new_count + second.new_count
        ),
    }
}

/// Sort hunks by `old_start` and merge any whose ranges overlap or touch.
/// Returns hunks renumbered 1..N in application order.
pub fn merge_overlapping(hunks: Vec<Hunk>) -> Vec<Hunk> {
    let mut sorted = hunks;
    sorted.sort_by_key(|h| h.old_start);

    let mut merged: Vec<Hunk> = Vec::new();
    for hunk in sorted {
        if let Some(last) = merged.last() {
            if ranges_touch(last, &hunk) {
                let combined = merge_pair(last, &hunk, last.number);
                *merged.last_mut().unwrap() = combined;
                continue;
            }
        }
        merged.push(hunk);
    }

    for (idx, h) in merged.iter_mut().enumerate() {
        h.number = idx + 1;
    }
    merged
}

/// Application order: ascending by `old_start`, so the cumulative-offset
/// bookkeeping in the applier stays monotone.
pub fn application_order(hunks: &[Hunk]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..hunks.len()).collect();
    indices.sort_by_key(|&i| hunks[i].old_start);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;

    #[test]
    fn merges_touching_hunks() {
        let patch = "@@ -1,2 +1,2 @@\n a\n-b\n+B\n@@ -2,2 +2,2 @@\n-b\n+B\n c\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let merged = merge_overlapping(hunks);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn leaves_disjoint_hunks_separate() {
        let patch = "@@ -1,1 +1,1 @@\n-a\n+A\n@@ -10,1 +10,1 @@\n-b\n+B\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let merged = merge_overlapping(hunks);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn application_order_is_ascending() {
        let patch = "@@ -10,1 +10,1 @@\n-b\n+B\n@@ -1,1 +1,1 @@\n-a\n+A\n";
        let hunks = parse_unified_diff(patch, None).unwrap();
        let order = application_order(&hunks);
        assert_eq!(hunks[order[0]].old_start, 1);
        assert_eq!(hunks[order[1]].old_start, 10);
    }
}
