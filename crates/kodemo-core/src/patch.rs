//! Structural change patches.
//!
//! Document mutations are reported as a forward patch list plus an inverse list that undoes
//! them. Patches are produced by diffing JSON snapshots of the document taken before and after
//! the mutation. Paths start at `"document"` and use the persisted field names, e.g.
//! `["document", "subjectIndex", "0"]`.
//!
//! List changes are reported as index patches only: the common prefix and suffix are skipped,
//! the overlapping middle is replaced item by item, and the remainder is added or removed.
//! No patch ever addresses a `length` pseudo-field.

use crate::error::PatchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Root path segment of every document patch.
pub const DOCUMENT_ROOT: &str = "document";

/// Patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert a map entry, or insert into a list at an index.
    Add,
    /// Remove a map entry or list item.
    Remove,
    /// Overwrite an existing value.
    Replace,
}

impl PatchOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structural change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Operation.
    pub op: PatchOp,
    /// Path segments from the state root.
    pub path: Vec<String>,
    /// New value for `add` and `replace`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Patch {
    /// An `add` patch.
    pub fn add(path: Vec<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value: Some(value),
        }
    }

    /// A `remove` patch.
    pub fn remove(path: Vec<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path,
            value: None,
        }
    }

    /// A `replace` patch.
    pub fn replace(path: Vec<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path,
            value: Some(value),
        }
    }

    /// The path joined with `/`.
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

/// A document mutation as reported to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Patches that turn the old document into the new one.
    pub patches: Vec<Patch>,
    /// Patches that turn the new document back into the old one.
    pub inverse_patches: Vec<Patch>,
    /// Caller supplied metadata, see `KodemoStateManager::set_context`.
    pub context: Value,
}

impl DocumentChange {
    /// Returns `true` if the change contains no patches.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Diff two JSON values. Returns `(patches, inverse_patches)` with paths rooted at `base`.
pub fn diff_values(before: &Value, after: &Value, base: &[&str]) -> (Vec<Patch>, Vec<Patch>) {
    let mut path: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    diff_into(before, after, &mut path, &mut forward, &mut inverse);
    (forward, inverse)
}

fn diff_into(
    before: &Value,
    after: &Value,
    path: &mut Vec<String>,
    forward: &mut Vec<Patch>,
    inverse: &mut Vec<Patch>,
) {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                path.push(key.clone());
                match new.get(key) {
                    Some(new_value) => diff_into(old_value, new_value, path, forward, inverse),
                    None => {
                        forward.push(Patch::remove(path.clone()));
                        inverse.push(Patch::add(path.clone(), old_value.clone()));
                    }
                }
                path.pop();
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    path.push(key.clone());
                    forward.push(Patch::add(path.clone(), new_value.clone()));
                    inverse.push(Patch::remove(path.clone()));
                    path.pop();
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => diff_arrays(old, new, path, forward, inverse),
        _ if before == after => {}
        _ => {
            forward.push(Patch::replace(path.clone(), after.clone()));
            inverse.push(Patch::replace(path.clone(), before.clone()));
        }
    }
}

fn diff_arrays(
    old: &[Value],
    new: &[Value],
    path: &mut Vec<String>,
    forward: &mut Vec<Patch>,
    inverse: &mut Vec<Patch>,
) {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_middle = old.len() - prefix - suffix;
    let new_middle = new.len() - prefix - suffix;
    let shared = old_middle.min(new_middle);

    for i in prefix..prefix + shared {
        path.push(i.to_string());
        diff_into(&old[i], &new[i], path, forward, inverse);
        path.pop();
    }

    let tail = prefix + shared;
    if new_middle > old_middle {
        for i in tail..prefix + new_middle {
            path.push(i.to_string());
            forward.push(Patch::add(path.clone(), new[i].clone()));
            path.pop();
        }
        for i in (tail..prefix + new_middle).rev() {
            path.push(i.to_string());
            inverse.push(Patch::remove(path.clone()));
            path.pop();
        }
    } else if old_middle > new_middle {
        for i in (tail..prefix + old_middle).rev() {
            path.push(i.to_string());
            forward.push(Patch::remove(path.clone()));
            path.pop();
        }
        for i in tail..prefix + old_middle {
            path.push(i.to_string());
            inverse.push(Patch::add(path.clone(), old[i].clone()));
            path.pop();
        }
    }
}

/// Apply `patches` in order to `root`.
///
/// On error, patches before the failing one have already been applied; callers that need
/// atomicity apply to a copy.
pub fn apply_patches(root: &mut Value, patches: &[Patch]) -> Result<(), PatchError> {
    for patch in patches {
        apply_patch(root, patch)?;
    }
    Ok(())
}

fn apply_patch(root: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    let Some((last, parents)) = patch.path.split_last() else {
        return Err(PatchError::EmptyPath);
    };

    let mut target = root;
    for segment in parents {
        target = match target {
            Value::Object(map) => map.get_mut(segment.as_str()),
            Value::Array(items) => {
                let idx = parse_index(segment, patch)?;
                items.get_mut(idx)
            }
            _ => None,
        }
        .ok_or_else(|| PatchError::PathNotFound(patch.path_string()))?;
    }

    let value = || {
        patch.value.clone().ok_or(PatchError::MissingValue {
            op: patch.op.as_str(),
            path: patch.path_string(),
        })
    };

    match target {
        Value::Object(map) => match patch.op {
            PatchOp::Add | PatchOp::Replace => {
                map.insert(last.clone(), value()?);
            }
            PatchOp::Remove => {
                map.shift_remove(last.as_str())
                    .ok_or_else(|| PatchError::PathNotFound(patch.path_string()))?;
            }
        },
        Value::Array(items) => {
            let idx = if last == "-" && patch.op == PatchOp::Add {
                items.len()
            } else {
                parse_index(last, patch)?
            };
            let in_bounds = match patch.op {
                PatchOp::Add => idx <= items.len(),
                PatchOp::Remove | PatchOp::Replace => idx < items.len(),
            };
            if !in_bounds {
                return Err(PatchError::InvalidIndex {
                    segment: last.clone(),
                    path: patch.path_string(),
                });
            }
            match patch.op {
                PatchOp::Add => items.insert(idx, value()?),
                PatchOp::Replace => items[idx] = value()?,
                PatchOp::Remove => {
                    items.remove(idx);
                }
            }
        }
        _ => return Err(PatchError::PathNotFound(patch.path_string())),
    }

    Ok(())
}

fn parse_index(segment: &str, patch: &Patch) -> Result<usize, PatchError> {
    segment.parse().map_err(|_| PatchError::InvalidIndex {
        segment: segment.to_string(),
        path: patch.path_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn round_trip(before: Value, after: Value) -> Vec<Patch> {
        let (forward, inverse) = diff_values(&before, &after, &[]);

        let mut patched = before.clone();
        apply_patches(&mut patched, &forward).unwrap();
        assert_eq!(patched, after);

        apply_patches(&mut patched, &inverse).unwrap();
        assert_eq!(patched, before);

        forward
    }

    #[test]
    fn test_list_insert_in_middle() {
        let forward = round_trip(json!({ "l": ["a", "b", "c"] }), json!({ "l": ["a", "b", "x", "c"] }));
        assert_eq!(forward, vec![Patch::add(vec!["l".into(), "2".into()], json!("x"))]);
    }

    #[test]
    fn test_list_removal_from_end_first() {
        let forward = round_trip(json!(["a", "b", "c", "d"]), json!(["a"]));
        let paths: Vec<String> = forward.iter().map(Patch::path_string).collect();
        assert_eq!(paths, vec!["3", "2", "1"]);
        assert!(forward.iter().all(|p| p.op == PatchOp::Remove));
    }

    #[test]
    fn test_nested_changes() {
        round_trip(
            json!({ "a": { "b": [1, { "c": true }] }, "gone": 1 }),
            json!({ "a": { "b": [2, { "c": false }, 3] }, "new": [] }),
        );
    }

    #[test]
    fn test_scalar_replace() {
        let forward = round_trip(json!({ "title": "A" }), json!({ "title": "B" }));
        assert_eq!(forward, vec![Patch::replace(vec!["title".into()], json!("B"))]);
    }

    #[test]
    fn test_apply_errors() {
        let mut value = json!({ "l": [] });
        let missing = Patch::remove(vec!["nope".into(), "x".into()]);
        assert!(matches!(
            apply_patches(&mut value, &[missing]),
            Err(PatchError::PathNotFound(_))
        ));
        let bad_index = Patch::replace(vec!["l".into(), "3".into()], json!(1));
        assert!(matches!(
            apply_patches(&mut value, &[bad_index]),
            Err(PatchError::InvalidIndex { .. })
        ));
        assert!(matches!(
            apply_patches(&mut value, &[Patch::remove(Vec::new())]),
            Err(PatchError::EmptyPath)
        ));
    }

    #[test]
    fn test_patch_serialization() {
        let patch = Patch::add(vec!["document".into(), "subjectIndex".into(), "0".into()], json!("id"));
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "op": "add", "path": ["document", "subjectIndex", "0"], "value": "id" })
        );
    }
}
