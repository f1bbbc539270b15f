//! Per-line normalisation used to compare lines across versions.

/// Characters dropped from the end of a (long enough) line before comparison.
const IGNORED_TRAILING: [char; 3] = [',', ';', '>'];

/// Lines with at most this many characters are compared verbatim.
const SHORT_LINE_LEN: usize = 3;

/// Format a line of code for diffing.
///
/// Surrounding whitespace is trimmed. Lines longer than three characters also lose one
/// trailing `,`, `;` or `>`, so that e.g. appending an item to a list still pairs the
/// previously-last item. Short lines such as `}` or `],` are left alone.
pub fn format_line_for_diff(line: &str) -> &str {
    let trimmed = line.trim();
    if trimmed.chars().count() > SHORT_LINE_LEN {
        trimmed
            .strip_suffix(IGNORED_TRAILING.as_slice())
            .unwrap_or(trimmed)
    } else {
        trimmed
    }
}

/// Number of leading whitespace characters. Whitespace-only lines count as zero.
pub fn count_leading_whitespace(line: &str) -> usize {
    line.chars().position(|ch| !ch.is_whitespace()).unwrap_or(0)
}

/// Split text into lines the way the pairing engine numbers them.
///
/// Both `\n` and `\r` end a line, so `\r\n` yields an extra (blank) line. Blank lines never
/// pair, so this only shifts numbering, and both sides are split the same way.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split(&['\n', '\r'][..]).collect()
}

/// A line prepared for comparison.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DiffLine<'a> {
    /// 1-based line number.
    pub(crate) line: usize,
    pub(crate) key: &'a str,
    pub(crate) leading: usize,
}

impl<'a> DiffLine<'a> {
    pub(crate) fn collect(text: &'a str) -> Vec<DiffLine<'a>> {
        split_lines(text)
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| DiffLine {
                line: idx + 1,
                key: format_line_for_diff(raw),
                leading: count_leading_whitespace(raw),
            })
            .collect()
    }

    /// Whether this line may take part in pairing (contains something besides whitespace).
    pub(crate) fn has_valid_key(&self) -> bool {
        !self.key.is_empty()
    }
}
