//! Per-line data a renderer needs to animate from one code version to the next.

use crate::diff::CodeDiff;
use crate::line::split_lines;
use crate::metrics::{DEFAULT_TAB_WIDTH, indent_columns, whitespace_width};

/// Delay before added lines start appearing, when other lines move or disappear first.
pub const ADDED_LEAD_IN_MS: f64 = 400.0;
/// Base delay between two consecutive added lines.
pub const ADDED_STAGGER_MS: f64 = 75.0;

/// Knobs for [`TransitionPlan::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionOptions {
    /// Pixel width of one whitespace column. Horizontal shifts are zero when unknown.
    pub whitespace_width: Option<f64>,
    /// Tab width used to measure indentation.
    pub tab_width: usize,
}

impl Default for TransitionOptions {
    /// Uses the process-wide cached whitespace width, if measured.
    fn default() -> Self {
        Self {
            whitespace_width: whitespace_width(),
            tab_width: DEFAULT_TAB_WIDTH,
        }
    }
}

/// A paired line that changes position or indentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineShift {
    /// Line number in the old version.
    pub from: usize,
    /// Line number in the new version.
    pub to: usize,
    /// Horizontal offset (pixels) from the new position back to the old one.
    pub translate_x: f64,
}

/// A line that only exists in the new version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AddedLine {
    /// Line number in the new version.
    pub line: usize,
    /// Delay before the line fades in.
    pub delay_ms: f64,
}

/// Everything that changes visually between two versions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPlan {
    /// Paired lines that slide to a new place.
    pub moved: Vec<LineShift>,
    /// Lines that fade in, in line order.
    pub added: Vec<AddedLine>,
    /// Old lines that fade out, in line order.
    pub removed: Vec<usize>,
}

impl TransitionPlan {
    /// Build a plan from a diff of `from_content` to `to_content`.
    pub fn new(
        diff: &CodeDiff,
        from_content: &str,
        to_content: &str,
        options: TransitionOptions,
    ) -> Self {
        let from_lines = split_lines(from_content);
        let to_lines = split_lines(to_content);
        let column_width = options.whitespace_width.unwrap_or(0.0);

        let indent_of = |lines: &[&str], line: usize| {
            lines
                .get(line.wrapping_sub(1))
                .map_or(0, |text| indent_columns(text, options.tab_width))
        };

        let moved: Vec<LineShift> = diff
            .paired_lines
            .values()
            .filter_map(|pair| {
                let from_cols = indent_of(&from_lines, pair.from);
                let to_cols = indent_of(&to_lines, pair.to);
                (pair.from != pair.to || from_cols != to_cols).then(|| LineShift {
                    from: pair.from,
                    to: pair.to,
                    translate_x: (from_cols as f64 - to_cols as f64) * column_width,
                })
            })
            .collect();

        let removed: Vec<usize> = diff.removed_lines.iter().copied().collect();

        let lead_in = if moved.is_empty() && removed.is_empty() {
            0.0
        } else {
            ADDED_LEAD_IN_MS
        };
        let count = diff.added_lines.len().max(1) as f64;
        let stagger = ADDED_STAGGER_MS * (10.0 / count).clamp(0.25, 1.0);

        let added = diff
            .added_lines
            .iter()
            .enumerate()
            .map(|(i, &line)| AddedLine {
                line,
                delay_ms: lead_in + i as f64 * stagger,
            })
            .collect();

        Self {
            moved,
            added,
            removed,
        }
    }

    /// `true` if nothing needs to be animated.
    pub fn is_empty(&self) -> bool {
        self.moved.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_code;
    use pretty_assertions::assert_eq;

    fn options(width: f64) -> TransitionOptions {
        TransitionOptions {
            whitespace_width: Some(width),
            tab_width: 4,
        }
    }

    #[test]
    fn test_identical_versions_have_empty_plan() {
        let text = "fn main() {\n    run();\n}";
        let plan = TransitionPlan::new(&diff_code(text, text), text, text, options(8.0));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_added_lines_without_lead_in() {
        let plan = TransitionPlan::new(&diff_code("a", "a\nb\nc"), "a", "a\nb\nc", options(8.0));
        assert!(plan.moved.is_empty());
        assert_eq!(
            plan.added,
            vec![
                AddedLine {
                    line: 2,
                    delay_ms: 0.0
                },
                AddedLine {
                    line: 3,
                    delay_ms: 75.0
                },
            ]
        );
    }

    #[test]
    fn test_indent_change_shifts_horizontally() {
        let from = "if x {\nrun();\n}";
        let to = "if x {\n    run();\n}";
        let plan = TransitionPlan::new(&diff_code(from, to), from, to, options(8.0));
        assert_eq!(
            plan.moved,
            vec![LineShift {
                from: 2,
                to: 2,
                translate_x: -32.0
            }]
        );
    }

    #[test]
    fn test_added_lines_wait_for_moves() {
        let from = "b\nc";
        let to = "a\nb\nc";
        let plan = TransitionPlan::new(&diff_code(from, to), from, to, options(8.0));
        assert_eq!(plan.moved.len(), 2);
        assert_eq!(plan.added[0].delay_ms, ADDED_LEAD_IN_MS);
    }

    #[test]
    fn test_stagger_shrinks_for_many_lines() {
        let to = (0..40).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let plan = TransitionPlan::new(&diff_code("", &to), "", &to, options(8.0));
        assert_eq!(plan.added.len(), 40);
        assert_eq!(plan.added[1].delay_ms, ADDED_STAGGER_MS * 0.25);
    }
}
