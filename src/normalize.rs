//! Text normalizers used to compare file content against hunk bodies
//!.

use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Invisible/zero-width Unicode codepoints that should be stripped before
/// comparison.
const INVISIBLE_CHARS: &[char] = &[
    '\u{200B}', // zero width space
    '\u{200C}', // zero width non-joiner
    '\u{200D}', // zero width joiner
    '\u{FEFF}', // BOM / zero width no-break space
    '\u{200E}', // left-to-right mark
    '\u{200F}', // right-to-left mark
    '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}', '\u{202E}', // bidi embedding/override
    '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}', // bidi isolates
    '\u{2028}', // line separator
    '\u{2029}', // paragraph separator
];

fn strip_invisible(text: &str) -> String {
    if !text.chars().any(|c| INVISIBLE_CHARS.contains(&c)) {
        return text.to_string();
    }
    text.chars().filter(|c| !INVISIBLE_CHARS.contains(c)).collect()
}

static NORMALIZE_CACHE: Lazy<Mutex<HashMap<String, String>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Normalize one line for comparison: strip invisible Unicode, preserve
/// literal escape sequences (do not interpret `\n` etc as control chars),
/// then trim leading/trailing whitespace. Memoized per unique input line,
/// matching the source's module-level memoization.
pub fn normalize_line_for_comparison(line: &str) -> String {
    if let Some(hit) = NORMALIZE_CACHE.lock().unwrap().get(line) {
        return hit.clone();
    }
    let stripped = strip_invisible(line);
    let normalized = stripped.trim().to_string();
    NORMALIZE_CACHE
        .lock()
        .unwrap()
        .insert(line.to_string(), normalized.clone());
    normalized
}

/// Two lines compare equal under normalization.
pub fn lines_equal(a: &str, b: &str) -> bool {
    normalize_line_for_comparison(a) == normalize_line_for_comparison(b)
}

/// Whitespace-normalized form: tabs become 4 spaces, internal runs of
/// whitespace collapse to one space, then trimmed.
pub fn normalize_whitespace(text: &str) -> String {
    let tabs_expanded = text.replace('\t', "    ");
    let collapsed = tabs_expanded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
}

/// All whitespace removed entirely (content-only comparison).
pub fn strip_all_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Leading-whitespace length of a line, tabs counted as 4 columns.
pub fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

/// Line with leading whitespace removed.
pub fn dedent(line: &str) -> &str {
    line.trim_start_matches([' ', '\t'])
}

/// True iff two lines differ only in leading/trailing/internal whitespace.
pub fn whitespace_only_diff(a: &str, b: &str) -> bool {
    a != b && normalize_whitespace(a) == normalize_whitespace(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_invisible_and_trims() {
        let line = "  \u{200B}hello world\u{FEFF}  ";
        assert_eq!(normalize_line_for_comparison(line), "hello world");
    }

    #[test]
    fn preserves_escape_literals() {
        // `\n` here is the two literal characters backslash-n, not a newline.
        let line = r"foo\nbar";
        assert_eq!(normalize_line_for_comparison(line), r"foo\nbar");
    }

    #[test]
    fn detects_whitespace_only_diff() {
        assert!(whitespace_only_diff("    foo(bar)", "foo(bar)"));
        assert!(!whitespace_only_diff("foo(bar)", "foo(baz)"));
    }

    #[test]
    fn memoizes_repeated_lookups() {
        let line = "repeat me";
        let first = normalize_line_for_comparison(line);
        let second = normalize_line_for_comparison(line);
        assert_eq!(first, second);
    }
}
