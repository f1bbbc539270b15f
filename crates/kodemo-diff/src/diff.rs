//! Confidence-scored line pairing.
//!
//! # Algorithm
//!
//! 1. Every line gets a comparison key ([`format_line_for_diff`](crate::format_line_for_diff))
//!    and a leading whitespace count.
//! 2. New-version lines are grouped by key. Blank keys are never candidates.
//! 3. For each old line, every same-key candidate is scored by how many of the up to 6
//!    preceding and 2 following lines also match, both by key and by the indentation delta to
//!    their neighbour. Equal leading whitespace adds `0.5`. Candidates with equal leading
//!    whitespace (or keys longer than 3 characters) are also kept as zero-confidence fallbacks.
//! 4. Old lines are stably sorted by their best confidence, descending, and then claim their
//!    best still-available candidate in that order.
//! 5. Unclaimed old lines are removed, unclaimed new lines are added.
//!
//! The greedy order matters: strong block matches are locked in before ambiguous single
//! lines compete for the same candidates. It is a heuristic, not a minimum edit distance.

use crate::line::DiffLine;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How many lines before a candidate are inspected (the line itself excluded).
const PRECEDING_CONTEXT: usize = 6;
/// How many lines after a candidate are inspected.
const FOLLOWING_CONTEXT: usize = 2;
/// Bonus for candidates with exactly the same leading whitespace.
const SAME_INDENT_BONUS: f64 = 0.5;

/// A resolved pairing between an old and a new line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePair {
    /// Line number in the old version.
    pub from: usize,
    /// Line number in the new version.
    pub to: usize,
    /// Leading whitespace characters of the new line.
    pub leading_indent: usize,
}

/// Result of [`diff_code`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeDiff {
    /// New-version lines without a counterpart.
    pub added_lines: BTreeSet<usize>,
    /// Old-version lines without a counterpart.
    pub removed_lines: BTreeSet<usize>,
    /// Pairs keyed by new-version line number.
    pub paired_lines: BTreeMap<usize, LinePair>,
}

impl CodeDiff {
    /// `true` if every non-blank line is paired with itself.
    pub fn is_unchanged(&self) -> bool {
        self.added_lines.is_empty()
            && self.removed_lines.is_empty()
            && self.paired_lines.values().all(|pair| pair.from == pair.to)
    }

    /// The old line paired with new line `to`, if any.
    pub fn source_line(&self, to: usize) -> Option<usize> {
        self.paired_lines.get(&to).map(|pair| pair.from)
    }
}

#[derive(Debug)]
struct FromMatches {
    /// Index into the old lines.
    idx: usize,
    /// Best positive confidence among this line's candidates (0 when none).
    confidence: f64,
    /// Candidate slots (within the key's candidate list) ordered by confidence, descending.
    slots: Vec<usize>,
}

/// Compare two versions of a text file line by line.
pub fn diff_code(from_content: &str, to_content: &str) -> CodeDiff {
    let from_lines = DiffLine::collect(from_content);
    let to_lines = DiffLine::collect(to_content);

    // Key -> to-line indices. A claimed candidate becomes `None`; slots never shift.
    let mut candidates: HashMap<&str, Vec<Option<usize>>> = HashMap::new();
    for (idx, to) in to_lines.iter().enumerate() {
        if to.has_valid_key() {
            candidates.entry(to.key).or_default().push(Some(idx));
        }
    }

    let mut ranked: Vec<FromMatches> = from_lines
        .iter()
        .enumerate()
        .map(|(idx, from)| match candidates.get(from.key) {
            Some(slots) if !slots.is_empty() => {
                score_candidates(idx, slots, &from_lines, &to_lines)
            }
            _ => FromMatches {
                idx,
                confidence: 0.0,
                slots: Vec::new(),
            },
        })
        .collect();

    // Stable: equally confident lines keep their file order.
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut diff = CodeDiff::default();

    for matches in &ranked {
        let from = &from_lines[matches.idx];
        if !from.has_valid_key() {
            continue;
        }

        let claimed = candidates.get_mut(from.key).and_then(|slots| {
            matches
                .slots
                .iter()
                .find_map(|&slot| slots.get_mut(slot).and_then(Option::take))
        });

        match claimed {
            Some(to_idx) => {
                let to = &to_lines[to_idx];
                diff.paired_lines.insert(
                    to.line,
                    LinePair {
                        from: from.line,
                        to: to.line,
                        leading_indent: to.leading,
                    },
                );
            }
            None => {
                diff.removed_lines.insert(from.line);
            }
        }
    }

    for slots in candidates.values() {
        for to_idx in slots.iter().flatten() {
            diff.added_lines.insert(to_lines[*to_idx].line);
        }
    }

    tracing::trace!(
        added = diff.added_lines.len(),
        removed = diff.removed_lines.len(),
        paired = diff.paired_lines.len(),
        "diffed code versions"
    );

    diff
}

fn score_candidates(
    from_idx: usize,
    slots: &[Option<usize>],
    from_lines: &[DiffLine<'_>],
    to_lines: &[DiffLine<'_>],
) -> FromMatches {
    let from = &from_lines[from_idx];
    let mut scored: Vec<(f64, usize)> = Vec::new();
    let mut best = 0.0_f64;

    for (slot, to_idx) in slots.iter().enumerate() {
        let Some(to_idx) = *to_idx else {
            continue;
        };
        let to = &to_lines[to_idx];

        let mut confidence = (count_adjacent_pairs(
            Direction::Backward,
            PRECEDING_CONTEXT,
            from_lines,
            to_lines,
            from_idx,
            to_idx,
        ) + count_adjacent_pairs(
            Direction::Forward,
            FOLLOWING_CONTEXT,
            from_lines,
            to_lines,
            from_idx,
            to_idx,
        )) as f64;

        if confidence > 0.0 {
            if from.leading == to.leading {
                confidence += SAME_INDENT_BONUS;
            }
            best = best.max(confidence);
            scored.push((confidence, slot));
        }
    }

    // Zero-confidence fallbacks: same indentation, or a key long enough to be distinctive.
    for (slot, to_idx) in slots.iter().enumerate() {
        let Some(to_idx) = *to_idx else {
            continue;
        };
        let to = &to_lines[to_idx];
        if from.leading == to.leading || to.key.chars().count() > 3 {
            scored.push((0.0, slot));
        }
    }

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    FromMatches {
        idx: from_idx,
        confidence: best,
        slots: scored.into_iter().map(|(_, slot)| slot).collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

impl Direction {
    /// Index `distance` lines away from `origin`, if it exists.
    fn step(self, origin: usize, distance: usize, len: usize) -> Option<usize> {
        let idx = match self {
            Direction::Backward => origin.checked_sub(distance)?,
            Direction::Forward => origin.checked_add(distance)?,
        };
        (idx < len).then_some(idx)
    }
}

/// Count consecutive neighbouring lines (walking away from the anchor pair) that match by key
/// and by indentation relative to the line before them in the walk.
fn count_adjacent_pairs(
    direction: Direction,
    context: usize,
    from_lines: &[DiffLine<'_>],
    to_lines: &[DiffLine<'_>],
    from_idx: usize,
    to_idx: usize,
) -> usize {
    let mut result = 0;

    for distance in 1..=context {
        let (Some(from_cur), Some(to_cur)) = (
            direction.step(from_idx, distance, from_lines.len()),
            direction.step(to_idx, distance, to_lines.len()),
        ) else {
            break;
        };
        let (Some(from_prev), Some(to_prev)) = (
            direction.step(from_idx, distance - 1, from_lines.len()),
            direction.step(to_idx, distance - 1, to_lines.len()),
        ) else {
            break;
        };

        let from = &from_lines[from_cur];
        let to = &to_lines[to_cur];
        let from_delta = from.leading as isize - from_lines[from_prev].leading as isize;
        let to_delta = to.leading as isize - to_lines[to_prev].leading as isize;

        if from.key == to.key && from_delta == to_delta {
            result += 1;
        } else {
            break;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pure_addition() {
        let diff = diff_code("a\nb", "a\nb\nc");
        assert_eq!(diff.added_lines, BTreeSet::from([3]));
        assert_eq!(diff.paired_lines.len(), 2);
        assert!(diff.removed_lines.is_empty());
    }

    #[test]
    fn test_pure_removal() {
        let diff = diff_code("a\nb\nc", "a\nc");
        assert!(diff.added_lines.is_empty());
        assert_eq!(diff.paired_lines.len(), 2);
        assert_eq!(diff.removed_lines, BTreeSet::from([2]));
        assert_eq!(diff.source_line(2), Some(3));
    }

    #[test]
    fn test_identical_input() {
        let diff = diff_code("a\nb\nc", "a\nb\nc");
        assert!(diff.added_lines.is_empty());
        assert!(diff.removed_lines.is_empty());
        assert_eq!(diff.paired_lines.len(), 3);
        assert!(diff.is_unchanged());
    }

    #[test]
    fn test_adjacent_context_counts_both_directions() {
        let from = ["a", "b", "c", "d"].map(|s| DiffLine {
            line: 0,
            key: s,
            leading: 0,
        });
        // Anchor at "b": one line before, two after.
        assert_eq!(
            count_adjacent_pairs(Direction::Backward, PRECEDING_CONTEXT, &from, &from, 1, 1),
            1
        );
        assert_eq!(
            count_adjacent_pairs(Direction::Forward, FOLLOWING_CONTEXT, &from, &from, 1, 1),
            2
        );
    }

    #[test]
    fn test_relative_indent_must_match() {
        let from = DiffLine::collect("if x {\n    y\n}");
        let to = DiffLine::collect("if x {\ny\n}");
        // "y" lost its indentation relative to "if x {", so walking back from "}" stops there.
        assert_eq!(
            count_adjacent_pairs(Direction::Backward, PRECEDING_CONTEXT, &from, &to, 2, 2),
            0
        );
    }
}
