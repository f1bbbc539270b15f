use kodemo_core::CodeHighlights;
use kodemo_core::highlights::MAX_HIGHLIGHT_LINE;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_canonical_string_round_trips() {
    let highlights = CodeHighlights::parse("1-2, 4, 6-7");
    assert_eq!(highlights.to_string(), "1-2, 4, 6-7");
}

#[test]
fn test_overlapping_and_unordered_tokens_normalize() {
    assert_eq!(CodeHighlights::parse("6-7,1-2 , 2-1, 4, 5").to_string(), "1-2, 4-7");
}

#[test]
fn test_array_keeps_index_zero() {
    assert_eq!(
        CodeHighlights::parse("0, 4").to_array(),
        vec![Some(true), None, None, None, Some(true)]
    );
}

#[test]
fn test_toggle_twice_restores_empty() {
    let mut highlights = CodeHighlights::new();
    highlights.toggle_lines(3, 4);
    assert_eq!(highlights.to_string(), "3-4");
    highlights.toggle_lines(3, 4);
    assert_eq!(highlights.to_string(), "");
    assert!(highlights.is_empty());
}

#[test]
fn test_disjoint_toggles_accumulate() {
    let mut highlights = CodeHighlights::new();
    highlights.toggle_lines(3, 4);
    highlights.toggle_lines(9, 10);
    assert_eq!(highlights.to_string(), "3-4, 9-10");
}

#[test]
fn test_toggle_follows_last_line() {
    let mut highlights = CodeHighlights::parse("4");
    // Line 5 is off, so the whole block turns on.
    highlights.toggle_lines(3, 5);
    assert_eq!(highlights.to_string(), "3-5");
    // Line 5 is on, so the whole block turns off.
    highlights.toggle_lines(1, 5);
    assert_eq!(highlights.to_string(), "");
}

#[test]
fn test_malformed_input_degrades() {
    assert_eq!(CodeHighlights::parse("").to_string(), "");
    assert_eq!(CodeHighlights::parse("abc, -, 3-").to_string(), "3");
    let huge = CodeHighlights::parse("99999999999999999999999");
    assert_eq!(huge.lines().collect::<Vec<_>>(), vec![MAX_HIGHLIGHT_LINE]);
}

#[test]
fn test_extreme_bounds_are_capped() {
    let mut highlights = CodeHighlights::parse("1-3");
    highlights.deactivate_lines(0, usize::MAX);
    assert!(highlights.is_empty());

    highlights.toggle_lines(1, usize::MAX);
    assert!(highlights.is_highlighted(1));
    assert!(highlights.is_highlighted(MAX_HIGHLIGHT_LINE));
    assert_eq!(highlights.to_array().len(), MAX_HIGHLIGHT_LINE + 1);

    highlights.toggle_lines(1, usize::MAX);
    assert!(highlights.is_empty());

    highlights.activate_lines(1 << 40, 1 << 41);
    assert_eq!(highlights.lines().collect::<Vec<_>>(), vec![MAX_HIGHLIGHT_LINE]);
}

fn ranges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..300, 0usize..20), 0..12)
}

proptest! {
    #[test]
    fn prop_serialized_form_is_a_fixed_point(ranges in ranges()) {
        let text = ranges
            .iter()
            .map(|&(start, len)| format!("{}-{}", start, start + len))
            .collect::<Vec<_>>()
            .join(", ");

        let canonical = CodeHighlights::parse(&text).to_string();
        prop_assert_eq!(CodeHighlights::parse(&canonical).to_string(), canonical);
    }

    #[test]
    fn prop_parse_preserves_lines(ranges in ranges()) {
        let mut expected = CodeHighlights::new();
        for &(start, len) in &ranges {
            expected.activate_lines(start, start + len);
        }

        let parsed = CodeHighlights::parse(&expected.to_string());
        prop_assert_eq!(
            parsed.lines().collect::<Vec<_>>(),
            expected.lines().collect::<Vec<_>>()
        );
    }
}
