//! Effects: points of interest in the story.
//!
//! An effect ties a story marker to a subject, optionally a specific version, and optionally a
//! highlight payload. Effects are cheap to clone; the payload is shared behind an [`Arc`] and
//! two effects only count as the same when they share the payload allocation.

use crate::highlights::CodeHighlights;
use crate::ids;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

/// Effect type of markers that select a subject without being shown in the timeline.
pub const EFFECT_TYPE_INVISIBLE: &str = "invisible";

/// Attribute carrying the effect id.
pub const ATTR_EFFECT_ID: &str = "data-effect-id";
/// Attribute carrying the effect type.
pub const ATTR_EFFECT_TYPE: &str = "data-effect-type";
/// Attribute carrying the subject id.
pub const ATTR_EFFECT_SUBJECT: &str = "data-effect-subject";
/// Attribute carrying the version id.
pub const ATTR_EFFECT_VERSION: &str = "data-effect-version";
/// Attribute carrying the JSON encoded payload.
pub const ATTR_EFFECT_PAYLOAD: &str = "data-effect-payload";

static LEGACY_IMAGE_RECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d*\.?\d*) (\d*\.?\d*) (\d*\.?\d*) (\d*\.?\d*)$")
        .expect("valid legacy image rect regex")
});

static EFFECT_ID_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(data-effect-id=['"])[a-z0-9-]+"#).expect("valid effect id attribute regex")
});

/// Highlight payload of an effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectPayload {
    /// Compact code highlight string, e.g. `"1-2, 4"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_highlights: Option<String>,
    /// Image regions as `[x, y, width, height]`, normalized to `0..=1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_highlights: Option<Vec<Vec<f64>>>,
}

/// A highlighted image region with derived right/bottom insets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageHighlight {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Inset from the right edge, `1 - (x + width)`.
    pub right: f64,
    /// Inset from the bottom edge, `1 - (y + height)`.
    pub bottom: f64,
}

/// A point of interest in the story.
///
/// `==` compares contents. Use [`Effect::is_same_as`] to also require a shared payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Unique id. Generated when missing.
    #[serde(default = "ids::generate_effect_id")]
    pub id: String,
    /// Optional type tag, see [`EFFECT_TYPE_INVISIBLE`].
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub effect_type: Option<String>,
    /// Subject this effect shows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Version of the subject this effect shows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Highlight payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Arc<EffectPayload>>,
}

impl Default for Effect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect {
    /// Create an empty effect with a generated id.
    pub fn new() -> Self {
        Self {
            id: ids::generate_effect_id(),
            effect_type: None,
            subject: None,
            version: None,
            payload: None,
        }
    }

    /// Set the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the type tag.
    pub fn with_type(mut self, effect_type: impl Into<String>) -> Self {
        self.effect_type = Some(effect_type.into());
        self
    }

    /// Set the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: EffectPayload) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Build an effect from its JSON form.
    ///
    /// An `id` that is not a string is replaced by a generated one, and a payload that does not
    /// decode is dropped with a warning. Returns `None` for anything but a JSON object, or when
    /// the remaining fields have the wrong types.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let serde_json::Value::Object(fields) = value else {
            tracing::warn!("Ignoring effect that is not a JSON object");
            return None;
        };
        let mut fields = fields.clone();
        if fields.get("id").is_some_and(|id| !id.is_string()) {
            fields.shift_remove("id");
        }
        let malformed = fields
            .get("payload")
            .filter(|payload| !payload.is_null())
            .and_then(|payload| serde_json::from_value::<EffectPayload>(payload.clone()).err());
        if let Some(err) = malformed {
            tracing::warn!("Ignoring malformed effect payload: {err}");
            fields.shift_remove("payload");
        }

        match serde_json::from_value(serde_json::Value::Object(fields)) {
            Ok(effect) => Some(effect),
            Err(err) => {
                tracing::warn!("Ignoring malformed effect: {err}");
                None
            }
        }
    }

    /// JSON form of this effect.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Build an effect from marker attributes (`data-effect-*`).
    ///
    /// Legacy payloads are upgraded: four space separated numbers become an image highlight and
    /// anything starting with a digit becomes a code highlight string. Payloads that are not a
    /// JSON object are dropped with a warning.
    pub fn from_attributes<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut effect = Self {
            id: String::new(),
            effect_type: None,
            subject: None,
            version: None,
            payload: None,
        };

        for (name, value) in attributes {
            let value = value.into();
            match name.as_ref() {
                ATTR_EFFECT_ID => effect.id = value,
                ATTR_EFFECT_TYPE => effect.effect_type = Some(value),
                ATTR_EFFECT_SUBJECT => effect.subject = Some(value),
                ATTR_EFFECT_VERSION => effect.version = Some(value),
                ATTR_EFFECT_PAYLOAD => effect.payload = parse_payload(&value).map(Arc::new),
                _ => {}
            }
        }

        if effect.id.is_empty() {
            effect.id = ids::generate_effect_id();
        }
        effect
    }

    /// Marker attributes for this effect. Absent fields are left out, the payload is JSON.
    pub fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attributes = vec![(ATTR_EFFECT_ID, self.id.clone())];
        if let Some(effect_type) = self.effect_type.as_ref().filter(|s| !s.is_empty()) {
            attributes.push((ATTR_EFFECT_TYPE, effect_type.clone()));
        }
        if let Some(subject) = self.subject.as_ref().filter(|s| !s.is_empty()) {
            attributes.push((ATTR_EFFECT_SUBJECT, subject.clone()));
        }
        if let Some(version) = self.version.as_ref().filter(|s| !s.is_empty()) {
            attributes.push((ATTR_EFFECT_VERSION, version.clone()));
        }
        if let Some(payload) = &self.payload {
            match serde_json::to_string(payload.as_ref()) {
                Ok(json) => attributes.push((ATTR_EFFECT_PAYLOAD, json)),
                Err(err) => tracing::warn!("Failed to encode effect payload: {err}"),
            }
        }
        attributes
    }

    /// Whether the effect carries a payload.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Whether this is an invisible effect.
    pub fn is_invisible(&self) -> bool {
        self.effect_type.as_deref() == Some(EFFECT_TYPE_INVISIBLE)
    }

    /// Parsed code highlights. Empty without a payload.
    pub fn code_highlights(&self) -> CodeHighlights {
        self.payload
            .as_ref()
            .and_then(|payload| payload.code_highlights.as_deref())
            .map(CodeHighlights::parse)
            .unwrap_or_default()
    }

    /// Image highlight rectangles. Entries that are not 4-tuples are skipped.
    pub fn image_highlights(&self) -> Vec<ImageHighlight> {
        let Some(rects) = self
            .payload
            .as_ref()
            .and_then(|payload| payload.image_highlights.as_ref())
        else {
            return Vec::new();
        };

        rects
            .iter()
            .filter_map(|rect| match rect.as_slice() {
                &[x, y, width, height] => Some(ImageHighlight {
                    x,
                    y,
                    width,
                    height,
                    right: 1.0 - (x + width),
                    bottom: 1.0 - (y + height),
                }),
                _ => None,
            })
            .collect()
    }

    /// Same id, type, subject and version, and the very same payload allocation.
    pub fn is_same_as(&self, other: &Effect) -> bool {
        self.id == other.id
            && self.effect_type == other.effect_type
            && self.subject == other.subject
            && self.version == other.version
            && match (&self.payload, &other.payload) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// Rewrite a legacy payload attribute as JSON. JSON payloads are returned unchanged.
pub fn upgrade_legacy_payload(payload: &str) -> Cow<'_, str> {
    if payload.starts_with('{') {
        return Cow::Borrowed(payload);
    }

    if LEGACY_IMAGE_RECT.is_match(payload) {
        let rect: Vec<serde_json::Value> = payload
            .split(' ')
            .map(|n| {
                n.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(serde_json::Value::Null, serde_json::Value::Number)
            })
            .collect();
        Cow::Owned(serde_json::json!({ "imageHighlights": [rect] }).to_string())
    } else if payload.starts_with(|c: char| c.is_ascii_digit()) {
        Cow::Owned(serde_json::json!({ "codeHighlights": payload }).to_string())
    } else {
        Cow::Borrowed(payload)
    }
}

fn parse_payload(raw: &str) -> Option<EffectPayload> {
    let payload = upgrade_legacy_payload(raw);
    if !(payload.starts_with('{') && payload.ends_with('}')) {
        return None;
    }
    match serde_json::from_str(&payload) {
        Ok(payload) => Some(payload),
        Err(err) => {
            tracing::warn!("Ignoring malformed effect payload {raw:?}: {err}");
            None
        }
    }
}

/// Give every `data-effect-id` attribute in `html` a freshly generated id.
pub fn replace_effect_ids_in_html(html: &str) -> String {
    EFFECT_ID_ATTRIBUTE
        .replace_all(html, |caps: &Captures<'_>| {
            format!("{}{}", &caps[1], ids::generate_effect_id())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Effect::new();
        let b = Effect::new();
        assert!(a.id.starts_with("effect-"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_same_as_compares_payload_allocation() {
        let a = Effect::new().with_subject("s1").with_payload(EffectPayload {
            code_highlights: Some("1".into()),
            image_highlights: None,
        });
        let b = a.clone();
        assert!(a.is_same_as(&b));

        let c = Effect {
            payload: Some(Arc::new(EffectPayload {
                code_highlights: Some("1".into()),
                image_highlights: None,
            })),
            ..a.clone()
        };
        assert!(!a.is_same_as(&c));
    }

    #[test]
    fn test_legacy_payload_upgrade() {
        assert_eq!(
            upgrade_legacy_payload("0.1 0.2 0.5 0.5"),
            r#"{"imageHighlights":[[0.1,0.2,0.5,0.5]]}"#
        );
        assert_eq!(
            upgrade_legacy_payload("1-3, 5"),
            r#"{"codeHighlights":"1-3, 5"}"#
        );
        assert_eq!(upgrade_legacy_payload(r#"{"a":1}"#), r#"{"a":1}"#);
        assert_eq!(upgrade_legacy_payload("nope"), "nope");
    }

    #[test]
    fn test_from_attributes() {
        let effect = Effect::from_attributes([
            (ATTR_EFFECT_ID, "effect-1"),
            (ATTR_EFFECT_SUBJECT, "s1"),
            (ATTR_EFFECT_PAYLOAD, "2-3"),
        ]);
        assert_eq!(effect.id, "effect-1");
        assert_eq!(effect.subject.as_deref(), Some("s1"));
        assert_eq!(effect.code_highlights().to_string(), "2-3");

        let broken = Effect::from_attributes([(ATTR_EFFECT_PAYLOAD, "{not json}")]);
        assert!(broken.id.starts_with("effect-"));
        assert!(!broken.has_payload());
    }

    #[test]
    fn test_from_json_repairs_id_and_payload() {
        let effect = Effect::from_json(&serde_json::json!({
            "id": null,
            "subject": "s1",
            "payload": { "codeHighlights": 3 }
        }));
        let effect = effect.unwrap();
        assert!(effect.id.starts_with("effect-"));
        assert_eq!(effect.subject.as_deref(), Some("s1"));
        assert!(!effect.has_payload());

        let kept = Effect::from_json(&serde_json::json!({
            "id": "e1",
            "payload": { "codeHighlights": "1-2" }
        }));
        assert_eq!(
            kept.map(|effect| (effect.id.clone(), effect.code_highlights().to_string())),
            Some(("e1".to_string(), "1-2".to_string()))
        );

        assert!(Effect::from_json(&serde_json::json!("e1")).is_none());
        assert!(Effect::from_json(&serde_json::json!({ "subject": 5 })).is_none());
    }

    #[test]
    fn test_image_highlights_insets() {
        let effect = Effect::new().with_payload(EffectPayload {
            code_highlights: None,
            image_highlights: Some(vec![vec![0.25, 0.5, 0.5, 0.25], vec![1.0]]),
        });
        let rects = effect.image_highlights();
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0].right, 0.25);
        assert_eq!(rects[0].bottom, 0.25);
    }

    #[test]
    fn test_attributes_round_trip() {
        let effect = Effect::new()
            .with_subject("s1")
            .with_version("v1")
            .with_payload(EffectPayload {
                code_highlights: Some("4".into()),
                image_highlights: None,
            });
        let parsed = Effect::from_attributes(effect.to_attributes());
        assert_eq!(parsed.id, effect.id);
        assert_eq!(parsed.version.as_deref(), Some("v1"));
        assert_eq!(parsed.payload.as_deref(), effect.payload.as_deref());
    }

    #[test]
    fn test_replace_effect_ids_in_html() {
        let html = r#"<p data-effect-id="effect-1">a</p><p DATA-EFFECT-ID='old'>b</p>"#;
        let replaced = replace_effect_ids_in_html(html);
        assert!(!replaced.contains("effect-1\""));
        assert!(!replaced.contains("'old'"));
        assert_eq!(replaced.matches("data-effect-id=\"effect-").count(), 1);
        assert_eq!(replaced.matches("DATA-EFFECT-ID='effect-").count(), 1);
    }
}
