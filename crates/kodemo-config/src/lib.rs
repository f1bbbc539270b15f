#![warn(missing_docs)]
//! `kodemo-config` - data-driven configuration for the kodemo player core.
//!
//! This crate intentionally stays lightweight and does **not** know anything about documents,
//! effects or rendering. It provides small structs that hosts can use to configure the
//! player in a content-aware way:
//!
//! - [`SubjectType`]: the kind of content a subject holds (code, math, image, iframe)
//! - [`SubjectFormats`]: file extension → subject format lookup
//! - [`TimelineConfig`]: playhead / segment geometry and scheduling intervals
//! - [`PlayerConfig`]: the top-level bundle, loadable from (partial) JSON

mod formats;
mod timeline;

pub use formats::{SubjectFormat, SubjectFormats, extension_from_filename};
pub use timeline::TimelineConfig;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of content a subject holds.
///
/// Unknown tags found in stored documents are preserved as [`SubjectType::Other`] so that a
/// round trip through the player never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubjectType {
    /// Source code, rendered in a code editor view.
    #[default]
    Code,
    /// A LaTeX math expression.
    Math,
    /// A raster/vector image referenced by URL.
    Image,
    /// An embedded web page referenced by URL.
    Iframe,
    /// Any other tag.
    Other(String),
}

impl SubjectType {
    /// The tag used in persisted documents.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Code => "code",
            Self::Math => "latex",
            Self::Image => "image",
            Self::Iframe => "iframe",
            Self::Other(tag) => tag,
        }
    }

    /// Whether subjects of this type keep more than one version.
    pub fn is_versioned(&self) -> bool {
        matches!(self, Self::Code | Self::Image)
    }
}

impl From<String> for SubjectType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "code" => Self::Code,
            "latex" => Self::Math,
            "image" => Self::Image,
            "iframe" => Self::Iframe,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for SubjectType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<SubjectType> for String {
    fn from(subject_type: SubjectType) -> Self {
        subject_type.as_str().to_string()
    }
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level player configuration.
///
/// Every field has a default, so hosts only need to provide what they want to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerConfig {
    /// Allow paginating between timeline segments with the keyboard. The store answers
    /// keyboard pagination requests only while this is set.
    pub keyboard_pagination: bool,
    /// Show a "copy to clipboard" action on code subjects. Read by the host renderer only.
    pub copy_code: bool,
    /// Allow comparing the current and previous image versions. Read by the host renderer
    /// only.
    pub compare_images: bool,
    /// All supported subject formats, used to map file extensions to subject types.
    pub subject_formats: SubjectFormats,
    /// Timeline geometry and scheduling.
    pub timeline: TimelineConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            keyboard_pagination: true,
            copy_code: true,
            compare_images: true,
            subject_formats: SubjectFormats::default(),
            timeline: TimelineConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Parse a (possibly partial) JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Build a config from a (possibly partial) JSON value. Missing fields take their defaults.
    pub fn from_json_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Deep-merge `overrides` over this config.
    ///
    /// Objects merge key by key; any other value (including arrays) replaces the current one.
    pub fn extend(&self, overrides: &Value) -> Result<Self, serde_json::Error> {
        let mut current = serde_json::to_value(self)?;
        merge_json(&mut current, overrides);
        serde_json::from_value(current)
    }
}

fn merge_json(target: &mut Value, overrides: &Value) {
    match (target, overrides) {
        (Value::Object(target), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match target.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, overrides) => *target = overrides.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn subject_type_round_trips_known_and_unknown_tags() {
        assert_eq!(SubjectType::from("latex"), SubjectType::Math);
        assert_eq!(SubjectType::Math.as_str(), "latex");

        let other: SubjectType = serde_json::from_value(json!("video")).unwrap();
        assert_eq!(other, SubjectType::Other("video".to_string()));
        assert_eq!(serde_json::to_value(&other).unwrap(), json!("video"));
    }

    #[test]
    fn versioned_subject_types() {
        assert!(SubjectType::Code.is_versioned());
        assert!(SubjectType::Image.is_versioned());
        assert!(!SubjectType::Math.is_versioned());
        assert!(!SubjectType::Iframe.is_versioned());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json_str(r#"{ "copyCode": false }"#).unwrap();
        assert!(!config.copy_code);
        assert!(config.keyboard_pagination);
        assert_eq!(config.timeline, TimelineConfig::default());
        assert!(config.subject_formats.format_for_extension("rs").is_some());
    }

    #[test]
    fn extend_merges_nested_objects() {
        let config = PlayerConfig::default();
        let extended = config
            .extend(&json!({ "timeline": { "playheadSize": 24.0 }, "compareImages": false }))
            .unwrap();

        assert_eq!(extended.timeline.playhead_size, 24.0);
        assert_eq!(
            extended.timeline.segment_spacing,
            config.timeline.segment_spacing
        );
        assert!(!extended.compare_images);
        assert!(extended.copy_code);
    }
}
