//! Effect markers embedded in story HTML.
//!
//! The story is HTML in which any element may carry `data-effect-*` attributes. This module
//! scans start tags with a small regex tokenizer; it does not build a DOM and does not care
//! about nesting.

use crate::effect::{ATTR_EFFECT_ID, Effect};
use crate::timeline::{SegmentMeasure, TimelineSegment};
use regex::Regex;
use std::sync::LazyLock;

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<([a-zA-Z][\w:-]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*/?>"#,
    )
    .expect("valid start tag regex")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid attribute regex")
});

/// A start tag found in the story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryElement {
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes in source order, names lowercased, values entity-decoded.
    pub attributes: Vec<(String, String)>,
    /// Byte offset of the tag in the story.
    pub offset: usize,
}

impl StoryElement {
    /// Value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether this element is an effect marker.
    pub fn is_effect_marker(&self) -> bool {
        self.attribute(ATTR_EFFECT_ID).is_some()
    }
}

/// All start tags in `html`, in document order.
pub fn story_elements(html: &str) -> Vec<StoryElement> {
    START_TAG
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let attributes = caps
                .get(2)
                .map(|m| parse_attributes(m.as_str()))
                .unwrap_or_default();
            Some(StoryElement {
                tag: caps[1].to_ascii_lowercase(),
                attributes,
                offset: whole.start(),
            })
        })
        .collect()
}

fn parse_attributes(source: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(source)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

/// Decode the character references that appear in attribute values.
///
/// Unknown or malformed references are left as written.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').and_then(|semi| {
            let name = &rest[1..semi];
            decode_reference(name).map(|ch| (ch, semi + 1))
        });
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Effects of all markers in `html`, in document order.
pub fn effects_in_story(html: &str) -> Vec<Effect> {
    story_elements(html)
        .into_iter()
        .filter(StoryElement::is_effect_marker)
        .map(|element| Effect::from_attributes(element.attributes))
        .collect()
}

/// Build one timeline segment per visible marker in `html`.
///
/// `measure_for` receives each effect and returns the callback that measures its marker.
/// Invisible effects select subjects without occupying the timeline and are skipped.
pub fn segments_from_story<F, M>(html: &str, mut measure_for: F) -> Vec<TimelineSegment>
where
    F: FnMut(&Effect) -> M,
    M: Fn() -> SegmentMeasure + Send + Sync + 'static,
{
    effects_in_story(html)
        .into_iter()
        .filter(|effect| !effect.is_invisible())
        .map(|effect| {
            let measure = measure_for(&effect);
            TimelineSegment::new(effect, measure)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STORY: &str = concat!(
        r#"<h1>Intro</h1><p>Start <span data-effect-id="e1" data-effect-subject="s1" "#,
        r#"data-effect-payload="{&quot;codeHighlights&quot;:&quot;1-2&quot;}">here</span></p>"#,
        r#"<p data-effect-id='e2' data-effect-subject=s2 data-effect-payload="0.1 0.2 0.3 0.4">x</p>"#,
        r#"<img src="a.png" alt="a &amp; b"/><em data-effect-id="e3" data-effect-type="invisible">"#,
    );

    #[test]
    fn test_effects_in_document_order() {
        let effects = effects_in_story(STORY);
        let ids: Vec<&str> = effects.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3"]);

        assert_eq!(effects[0].subject.as_deref(), Some("s1"));
        assert_eq!(effects[0].code_highlights().to_string(), "1-2");
        assert_eq!(effects[1].subject.as_deref(), Some("s2"));
        assert_eq!(effects[1].image_highlights().len(), 1);
        assert!(effects[2].is_invisible());
    }

    #[test]
    fn test_attribute_decoding() {
        let elements = story_elements(STORY);
        let img = elements.iter().find(|e| e.tag == "img").map(|e| e.attribute("alt"));
        assert_eq!(img, Some(Some("a & b")));
        assert_eq!(decode_entities("&#65;&#x42;&unknown;&"), "AB&unknown;&");
    }

    #[test]
    fn test_segments_skip_invisible_effects() {
        let segments = segments_from_story(STORY, |effect| {
            let top = if effect.id == "e1" { 10.0 } else { 200.0 };
            move || SegmentMeasure::at(top)
        });
        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].measure)().top, Some(10.0));
        assert!(segments[0].id.starts_with("segment-"));
    }
}
