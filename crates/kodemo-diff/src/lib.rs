//! `kodemo-diff` - line pairing between two versions of a code file.
//!
//! The engine answers "what moved where" rather than "what is the shortest edit script":
//! every line of the new version is either **paired** with a line of the old version or
//! **added**, and every unpaired line of the old version is **removed**. Renderers use the
//! pairs to slide retained lines into their new position.
//!
//! ```rust
//! use kodemo_diff::diff_code;
//!
//! let diff = diff_code("a\nb", "a\nb\nc");
//! assert!(diff.added_lines.contains(&3));
//! assert_eq!(diff.paired_lines.len(), 2);
//! assert!(diff.removed_lines.is_empty());
//! ```
//!
//! Line numbers are 1-based throughout.

pub mod diff;
pub mod line;
pub mod metrics;
pub mod transition;

pub use diff::{CodeDiff, LinePair, diff_code};
pub use line::{count_leading_whitespace, format_line_for_diff};
pub use transition::{AddedLine, LineShift, TransitionOptions, TransitionPlan};
