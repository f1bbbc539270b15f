//! Whitespace metrics used to turn indentation changes into horizontal shifts.
//!
//! Character widths follow UAX #11, tabs advance to the next tab stop. The pixel width of a
//! single whitespace column is measured once by the host renderer and cached process-wide.

use std::sync::OnceLock;
use unicode_width::UnicodeWidthChar;

/// Default tab width (in columns) used when a caller does not specify one.
pub const DEFAULT_TAB_WIDTH: usize = 4;

static WHITESPACE_WIDTH: OnceLock<f64> = OnceLock::new();

/// Visual width of a character in columns (0, 1 or 2).
pub fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(1)
}

/// Visual width of `ch` when it starts at column `column`. Tabs advance to the next stop.
pub fn cell_width_at(ch: char, column: usize, tab_width: usize) -> usize {
    if ch == '\t' {
        let tab_width = tab_width.max(1);
        tab_width - column % tab_width
    } else {
        char_width(ch)
    }
}

/// Number of columns covered by the leading whitespace of `line`.
pub fn indent_columns(line: &str, tab_width: usize) -> usize {
    let mut x = 0usize;
    for ch in line.chars().take_while(|ch| ch.is_whitespace()) {
        x = x.saturating_add(cell_width_at(ch, x, tab_width));
    }
    x
}

/// Cached pixel width of one whitespace column, if it has been measured.
pub fn whitespace_width() -> Option<f64> {
    WHITESPACE_WIDTH.get().copied()
}

/// Store the pixel width of one whitespace column.
///
/// The first measurement wins; later calls return the cached value unchanged.
/// Non-finite or non-positive widths are ignored.
pub fn set_whitespace_width(width: f64) -> Option<f64> {
    if width.is_finite() && width > 0.0 {
        Some(*WHITESPACE_WIDTH.get_or_init(|| width))
    } else {
        whitespace_width()
    }
}

/// Derive the whitespace width from a rendered line: `offset_left` is the pixel offset of the
/// line's first non-whitespace character.
///
/// Lines with fewer than two leading whitespace characters do not give a reliable sample and
/// are skipped.
pub fn calibrate_whitespace_width(line: &str, offset_left: f64) -> Option<f64> {
    if let Some(width) = whitespace_width() {
        return Some(width);
    }

    let leading = crate::count_leading_whitespace(line);
    if leading > 1 && offset_left > 0.0 {
        let width = set_whitespace_width(offset_left / leading as f64);
        tracing::debug!(?width, leading, "calibrated whitespace width");
        width
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_columns() {
        assert_eq!(indent_columns("code", 4), 0);
        assert_eq!(indent_columns("    code", 4), 4);
        assert_eq!(indent_columns("\tcode", 4), 4);
        assert_eq!(indent_columns("  \tcode", 4), 4);
        assert_eq!(indent_columns("  \tcode", 8), 8);
        // Ideographic space is a wide whitespace character.
        assert_eq!(indent_columns("\u{3000}x", 4), 2);
    }

    #[test]
    fn test_cell_width_at() {
        assert_eq!(cell_width_at('a', 3, 4), 1);
        assert_eq!(cell_width_at('\t', 3, 4), 1);
        assert_eq!(cell_width_at('\t', 0, 0), 1);
        assert_eq!(cell_width_at('中', 0, 4), 2);
    }

    #[test]
    fn test_whitespace_width_first_write_wins() {
        // The cache is process-wide, so everything runs in a single test.
        assert_eq!(calibrate_whitespace_width(" x", 8.0), whitespace_width());
        assert_eq!(set_whitespace_width(f64::NAN), whitespace_width());

        let first = set_whitespace_width(7.5);
        assert!(first.is_some());
        assert_eq!(set_whitespace_width(9.0), first);
        assert_eq!(calibrate_whitespace_width("    x", 40.0), first);
    }
}
