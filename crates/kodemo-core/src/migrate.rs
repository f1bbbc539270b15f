//! Document migration.
//!
//! Every document passes through [`migrate_document`] before it is loaded. Migration accepts
//! any JSON value and always produces a valid [`KodemoDocument`]:
//!
//! 1. The raw JSON is run through the ordered [`UPGRADE_STEPS`]. They fill in missing top-level
//!    fields and drop fields whose JSON type cannot be right.
//! 2. Subjects and versions are decoded one at a time. A malformed entry is dropped with a
//!    warning instead of failing the whole load.
//! 3. Both index lists are reconciled with their maps (subjects first, then each subject's
//!    versions).
//! 4. The document is stamped with [`DOCUMENT_FORMAT_VERSION`].
//!
//! Running the migration on its own output changes nothing.

use crate::document::{DEFAULT_TITLE, KodemoDocument, Subject, Version, reconcile_index};
use serde_json::{Map, Value};

/// Format version written into every migrated document.
pub const DOCUMENT_FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema generation of a raw document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Unversioned, or stamped by another format version.
    Legacy,
    /// Stamped with [`DOCUMENT_FORMAT_VERSION`].
    Current,
}

impl SchemaVersion {
    /// Detect the schema of a raw document.
    pub fn detect(raw: &Value) -> Self {
        match raw.get("version").and_then(Value::as_str) {
            Some(DOCUMENT_FORMAT_VERSION) => Self::Current,
            _ => Self::Legacy,
        }
    }
}

/// A single upgrade step over the raw document object.
pub type UpgradeStep = fn(&mut Map<String, Value>);

/// Upgrade steps in the order they run. Every step is idempotent.
pub const UPGRADE_STEPS: &[(&str, UpgradeStep)] = &[
    ("default-fields", fill_default_fields),
    ("subject-shapes", normalize_subjects),
];

/// Migrate any JSON value into a valid document.
pub fn migrate_document(raw: Value) -> KodemoDocument {
    let schema = SchemaVersion::detect(&raw);
    tracing::debug!(?schema, "migrating document");

    let mut object = match raw {
        Value::Object(object) => object,
        Value::Null => Map::new(),
        other => {
            tracing::warn!("Expected a document object, found {}", json_type(&other));
            Map::new()
        }
    };

    for (name, step) in UPGRADE_STEPS {
        tracing::trace!(step = name, "running document upgrade step");
        step(&mut object);
    }

    let mut doc = decode_document(object);
    cleanup_indices(&mut doc);
    doc.version = Some(DOCUMENT_FORMAT_VERSION.to_string());
    doc
}

/// Re-run index cleanup and the version stamp on an already decoded document.
pub fn migrate_typed(mut doc: KodemoDocument) -> KodemoDocument {
    cleanup_indices(&mut doc);
    doc.version = Some(DOCUMENT_FORMAT_VERSION.to_string());
    doc
}

fn fill_default_fields(doc: &mut Map<String, Value>) {
    if !doc.get("title").is_some_and(Value::is_string) {
        doc.insert("title".into(), Value::String(DEFAULT_TITLE.into()));
    }
    if !doc.get("story").is_some_and(Value::is_string) {
        doc.insert("story".into(), Value::String(String::new()));
    }
    if !doc.get("subjects").is_some_and(Value::is_object) {
        doc.insert("subjects".into(), Value::Object(Map::new()));
    }
    retain_string_array(doc, "subjectIndex");
    retain_if(doc, "id", Value::is_string);
    retain_if(doc, "version", Value::is_string);
    retain_if(doc, "updated_at", |v| v.as_i64().is_some());
}

fn normalize_subjects(doc: &mut Map<String, Value>) {
    let Some(Value::Object(subjects)) = doc.get_mut("subjects") else {
        return;
    };

    subjects.retain(|id, subject| {
        let Value::Object(subject) = subject else {
            tracing::warn!("Dropping subject {id:?}: expected an object");
            return false;
        };

        retain_if(subject, "type", Value::is_string);
        if !subject.get("name").is_some_and(Value::is_string) {
            subject.insert("name".into(), Value::String(String::new()));
        }
        retain_if(subject, "created_at", |v| v.as_i64().is_some());
        retain_if(subject, "language", Value::is_string);
        retain_string_array(subject, "versionIndex");
        if !subject.get("versions").is_some_and(Value::is_object) {
            subject.insert("versions".into(), Value::Object(Map::new()));
        }

        if let Some(Value::Object(versions)) = subject.get_mut("versions") {
            versions.retain(|version_id, version| {
                let Value::Object(version) = version else {
                    tracing::warn!("Dropping version {version_id:?} of {id:?}: expected an object");
                    return false;
                };
                retain_if(version, "width", Value::is_number);
                retain_if(version, "height", Value::is_number);
                retain_if(version, "created_at", |v| v.as_i64().is_some());
                true
            });
        }
        true
    });
}

fn decode_document(mut object: Map<String, Value>) -> KodemoDocument {
    let subjects = match object.shift_remove("subjects") {
        Some(Value::Object(subjects)) => subjects,
        _ => Map::new(),
    };

    let mut doc = match serde_json::from_value::<KodemoDocument>(Value::Object(object)) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!("Failed to decode document fields, using defaults: {err}");
            KodemoDocument::default()
        }
    };

    for (subject_id, raw) in subjects {
        if let Some(subject) = decode_subject(&subject_id, raw) {
            doc.subjects.insert(subject_id, subject);
        }
    }

    doc
}

fn decode_subject(subject_id: &str, raw: Value) -> Option<Subject> {
    let Value::Object(mut object) = raw else {
        return None;
    };
    let versions = match object.shift_remove("versions") {
        Some(Value::Object(versions)) => versions,
        _ => Map::new(),
    };

    let mut subject: Subject = match serde_json::from_value(Value::Object(object)) {
        Ok(subject) => subject,
        Err(err) => {
            tracing::warn!("Dropping subject {subject_id:?}: {err}");
            return None;
        }
    };

    for (version_id, raw) in versions {
        match serde_json::from_value::<Version>(raw) {
            Ok(version) => {
                subject.versions.insert(version_id, version);
            }
            Err(err) => tracing::warn!("Dropping version {version_id:?} of {subject_id:?}: {err}"),
        }
    }

    Some(subject)
}

fn cleanup_indices(doc: &mut KodemoDocument) {
    reconcile_index(&doc.subjects, &mut doc.subject_index);
    for subject in doc.subjects.values_mut() {
        reconcile_index(&subject.versions, &mut subject.version_index);
    }
}

fn retain_if(object: &mut Map<String, Value>, key: &str, keep: impl Fn(&Value) -> bool) {
    if object.get(key).is_some_and(|value| !keep(value)) {
        object.shift_remove(key);
    }
}

fn retain_string_array(object: &mut Map<String, Value>, key: &str) {
    match object.get_mut(key) {
        Some(Value::Array(items)) => items.retain(Value::is_string),
        _ => {
            object.insert(key.into(), Value::Array(Vec::new()));
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults_for_empty_input() {
        let doc = migrate_document(json!({}));
        assert_eq!(doc.title, "Untitled");
        assert_eq!(doc.story, "");
        assert!(doc.subjects.is_empty());
        assert!(doc.subject_index.is_empty());
        assert_eq!(doc.version.as_deref(), Some(DOCUMENT_FORMAT_VERSION));
    }

    #[test]
    fn test_non_object_input() {
        assert_eq!(migrate_document(json!([1, 2])), migrate_document(json!({})));
        assert_eq!(migrate_document(Value::Null).title, "Untitled");
    }

    #[test]
    fn test_indices_are_repaired() {
        let doc = migrate_document(json!({
            "title": "Demo",
            "subjectIndex": ["missing", "b", 7, "b"],
            "subjects": {
                "a": { "type": "code", "name": "a.js", "versions": { "v1": { "value": "1" } } },
                "b": {
                    "type": "image",
                    "name": "b.png",
                    "versionIndex": ["v2", "gone"],
                    "versions": { "v1": { "value": "x" }, "v2": { "value": "y", "width": 400 } }
                },
                "broken": "nope"
            }
        }));

        assert_eq!(doc.subject_index, vec!["b", "a"]);
        assert_eq!(doc.subjects["a"].version_index, vec!["v1"]);
        assert_eq!(doc.subjects["b"].version_index, vec!["v2", "v1"]);
        assert_eq!(doc.subjects["b"].versions["v2"].width, Some(400.0));
        assert!(!doc.subjects.contains_key("broken"));
    }

    #[test]
    fn test_unknown_fields_survive() {
        let doc = migrate_document(json!({
            "theme": "dark",
            "subjects": { "a": { "type": "chart", "versions": { "v": { "value": "", "alt": "x" } } } }
        }));
        assert_eq!(doc.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(doc.subjects["a"].subject_type.as_str(), "chart");
        assert_eq!(doc.subjects["a"].versions["v"].extra.get("alt"), Some(&json!("x")));
    }

    #[test]
    fn test_schema_detection() {
        assert_eq!(SchemaVersion::detect(&json!({})), SchemaVersion::Legacy);
        assert_eq!(
            SchemaVersion::detect(&json!({ "version": "0.0.1-legacy" })),
            SchemaVersion::Legacy
        );
        let migrated = serde_json::to_value(migrate_document(json!({}))).unwrap_or_default();
        assert_eq!(SchemaVersion::detect(&migrated), SchemaVersion::Current);
    }
}
