//! The persisted document model.
//!
//! A [`KodemoDocument`] holds the story HTML plus an ordered collection of [`Subject`]s, each
//! with an ordered collection of [`Version`]s. Order is defined by an explicit index list
//! (`subjectIndex`, `versionIndex`) next to the id-keyed map. Both levels keep the same
//! invariant: every index entry names an existing item, and every item appears exactly once in
//! the index.
//!
//! Unknown JSON fields are kept in `extra` so that loading and saving a document never drops
//! data written by a newer tool.

use crate::error::DocumentError;
use indexmap::IndexMap;
use kodemo_config::SubjectType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Default document title.
pub const DEFAULT_TITLE: &str = "Untitled";

/// One revision of a subject's content.
///
/// `value` is the code for code subjects, the URL for images and iframes, and the expression
/// for math subjects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Content of this version.
    #[serde(default)]
    pub value: String,
    /// Intrinsic width (images, iframes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Intrinsic height (images, iframes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Creation time in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Fields this model does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Version {
    /// A version with the given content.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// A versioned content item shown next to the story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Kind of content.
    #[serde(rename = "type", default)]
    pub subject_type: SubjectType,
    /// Display name, typically a file name.
    #[serde(default)]
    pub name: String,
    /// Creation time in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Language override for code subjects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Version ids in display order.
    #[serde(rename = "versionIndex", default)]
    pub version_index: Vec<String>,
    /// Versions by id.
    #[serde(default)]
    pub versions: IndexMap<String, Version>,
    /// Fields this model does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subject {
    /// An empty subject of the given type and name.
    pub fn new(subject_type: SubjectType, name: impl Into<String>) -> Self {
        Self {
            subject_type,
            name: name.into(),
            ..Self::default()
        }
    }

    /// The version with the given id.
    pub fn version(&self, version_id: &str) -> Option<&Version> {
        self.versions.get(version_id)
    }

    /// The first version in display order, falling back to insertion order.
    pub fn first_version_id(&self) -> Option<&str> {
        self.version_index
            .iter()
            .find(|id| self.versions.contains_key(id.as_str()))
            .or_else(|| self.versions.keys().next())
            .map(String::as_str)
    }

    /// Versions in display order, followed by any versions missing from the index.
    pub fn ordered_versions(&self) -> Vec<(&str, &Version)> {
        ordered_entries(&self.versions, &self.version_index)
    }
}

/// The root aggregate: story plus subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KodemoDocument {
    /// Document id, if the host assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Title.
    #[serde(default = "default_title")]
    pub title: String,
    /// Format version stamp, written on every migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Last modification time in epoch milliseconds, maintained by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Story HTML with embedded effect markers.
    #[serde(default)]
    pub story: String,
    /// Subjects by id.
    #[serde(default)]
    pub subjects: IndexMap<String, Subject>,
    /// Subject ids in display order.
    #[serde(rename = "subjectIndex", default)]
    pub subject_index: Vec<String>,
    /// Fields this model does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Default for KodemoDocument {
    fn default() -> Self {
        Self {
            id: None,
            title: default_title(),
            version: None,
            updated_at: None,
            story: String::new(),
            subjects: IndexMap::new(),
            subject_index: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl KodemoDocument {
    /// Parse and migrate a document from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, DocumentError> {
        let raw: Value = serde_json::from_str(json)?;
        Ok(crate::migrate::migrate_document(raw))
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The subject with the given id.
    pub fn subject(&self, subject_id: &str) -> Option<&Subject> {
        self.subjects.get(subject_id)
    }

    /// The version `version_id` of subject `subject_id`.
    pub fn version(&self, subject_id: &str, version_id: &str) -> Option<&Version> {
        self.subject(subject_id)?.version(version_id)
    }

    /// Subjects in display order, followed by any subjects missing from the index.
    pub fn ordered_subjects(&self) -> Vec<(&str, &Subject)> {
        ordered_entries(&self.subjects, &self.subject_index)
    }
}

/// `true` for a missing document, or one without story text and without subjects.
pub fn is_empty_document(doc: Option<&KodemoDocument>) -> bool {
    doc.is_none_or(|doc| doc.story.is_empty() && doc.subjects.is_empty())
}

/// Entries of `items` in `index` order, followed by the entries the index does not mention.
///
/// Index entries without a backing item, and repeated index entries, are skipped.
pub fn ordered_entries<'a, V>(
    items: &'a IndexMap<String, V>,
    index: &[String],
) -> Vec<(&'a str, &'a V)> {
    let mut seen = HashSet::with_capacity(index.len());
    let mut ordered = Vec::with_capacity(items.len());

    for id in index {
        if let Some((key, value)) = items.get_key_value(id.as_str())
            && seen.insert(key.as_str())
        {
            ordered.push((key.as_str(), value));
        }
    }
    for (key, value) in items {
        if !seen.contains(key.as_str()) {
            ordered.push((key.as_str(), value));
        }
    }

    ordered
}

/// Repair an index against its map: drop orphans and duplicates, append unindexed keys.
pub(crate) fn reconcile_index<V>(items: &IndexMap<String, V>, index: &mut Vec<String>) {
    let mut seen = HashSet::with_capacity(index.len());
    index.retain(|id| items.contains_key(id.as_str()) && seen.insert(id.clone()));
    for key in items.keys() {
        if !seen.contains(key) {
            index.push(key.clone());
        }
    }
}

/// Whether `index` lists exactly the keys of `items`, each once.
pub fn index_is_consistent<V>(items: &IndexMap<String, V>, index: &[String]) -> bool {
    let unique: HashSet<&str> = index.iter().map(String::as_str).collect();
    unique.len() == index.len()
        && index.len() == items.len()
        && index.iter().all(|id| items.contains_key(id.as_str()))
}
