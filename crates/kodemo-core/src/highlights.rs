//! Line highlight sets for code subjects.
//!
//! Highlights are kept as a sparse list of flags indexed by line number and exchanged as a
//! compact string of comma separated lines and inclusive ranges, e.g. `"1-2, 4, 6-7"`.

use regex::Regex;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Highest line number accepted when parsing a highlight string.
pub const MAX_HIGHLIGHT_LINE: usize = 10_000;

static HIGHLIGHT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:-(\d+))?").expect("valid highlight token regex"));

/// A set of highlighted lines.
///
/// Line numbers are 1-based, but index 0 is kept so that `"0"` survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeHighlights {
    highlights: Vec<bool>,
}

impl CodeHighlights {
    /// Create an empty highlight set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highlight every line in `from..=to`. The bounds may be given in either order and are
    /// capped at [`MAX_HIGHLIGHT_LINE`].
    pub fn activate_lines(&mut self, from: usize, to: usize) {
        let (from, to) = ordered(from, to);
        if self.highlights.len() <= to {
            self.highlights.resize(to + 1, false);
        }
        self.highlights[from..=to].fill(true);
    }

    /// Remove the highlight from every line in `from..=to`. Never grows the set.
    pub fn deactivate_lines(&mut self, from: usize, to: usize) {
        let (from, to) = ordered(from, to);
        let end = (to + 1).min(self.highlights.len());
        if from < end {
            self.highlights[from..end].fill(false);
        }
    }

    /// Flip `from..=to` as a block, based on the current state of line `to`.
    pub fn toggle_lines(&mut self, from: usize, to: usize) {
        if self.is_highlighted(to.min(MAX_HIGHLIGHT_LINE)) {
            self.deactivate_lines(from, to);
        } else {
            self.activate_lines(from, to);
        }
    }

    /// Whether `line` is highlighted.
    pub fn is_highlighted(&self, line: usize) -> bool {
        self.highlights.get(line).copied().unwrap_or(false)
    }

    /// `true` if no line is highlighted.
    pub fn is_empty(&self) -> bool {
        !self.highlights.contains(&true)
    }

    /// The raw flags, index 0 included. Unset lines are `None`.
    pub fn to_array(&self) -> Vec<Option<bool>> {
        self.highlights
            .iter()
            .map(|&lit| lit.then_some(true))
            .collect()
    }

    /// Highlighted line numbers in ascending order.
    pub fn lines(&self) -> impl Iterator<Item = usize> + '_ {
        self.highlights
            .iter()
            .enumerate()
            .filter_map(|(line, &lit)| lit.then_some(line))
    }

    /// Parse a compact highlight string.
    ///
    /// Every `N` or `N-M` token is applied, everything else is ignored. Line numbers are
    /// capped at [`MAX_HIGHLIGHT_LINE`]. Parsing never fails.
    pub fn parse(text: &str) -> Self {
        let mut highlights = Self::new();

        for caps in HIGHLIGHT_TOKEN.captures_iter(text) {
            let Some(from) = caps.get(1).and_then(|m| parse_line(m.as_str())) else {
                tracing::warn!("Failed to parse code highlight {text:?}");
                continue;
            };
            let to = match caps.get(2) {
                Some(m) => match parse_line(m.as_str()) {
                    Some(to) => to,
                    None => {
                        tracing::warn!("Failed to parse code highlight {text:?}");
                        continue;
                    }
                },
                None => from,
            };
            highlights.activate_lines(from, to);
        }

        highlights
    }

    /// Runs of consecutive highlighted lines as inclusive ranges.
    fn runs(&self) -> Vec<(usize, usize)> {
        let mut runs = Vec::new();
        let mut start = None;

        for (line, &lit) in self.highlights.iter().enumerate() {
            match (lit, start) {
                (true, None) => start = Some(line),
                (false, Some(first)) => {
                    runs.push((first, line - 1));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(first) = start {
            runs.push((first, self.highlights.len() - 1));
        }

        runs
    }
}

/// Bounds in ascending order, capped at [`MAX_HIGHLIGHT_LINE`].
fn ordered(a: usize, b: usize) -> (usize, usize) {
    let (a, b) = (a.min(MAX_HIGHLIGHT_LINE), b.min(MAX_HIGHLIGHT_LINE));
    if a <= b { (a, b) } else { (b, a) }
}

/// Digits only. Overflowing numbers are past the ceiling anyway.
fn parse_line(digits: &str) -> Option<usize> {
    match digits.parse::<usize>() {
        Ok(line) => Some(line.min(MAX_HIGHLIGHT_LINE)),
        Err(err) if matches!(err.kind(), std::num::IntErrorKind::PosOverflow) => {
            Some(MAX_HIGHLIGHT_LINE)
        }
        Err(_) => None,
    }
}

impl fmt::Display for CodeHighlights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (first, last)) in self.runs().into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if first == last {
                write!(f, "{first}")?;
            } else {
                write!(f, "{first}-{last}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for CodeHighlights {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
