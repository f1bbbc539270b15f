use kodemo_core::{
    DocumentChange, KodemoStateManager, Patch, PatchOp, StoreEvent, Subject, SubjectType, Version,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn record_changes(manager: &mut KodemoStateManager) -> Arc<Mutex<Vec<Arc<DocumentChange>>>> {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    manager.subscribe(move |event| {
        if let StoreEvent::DocumentChanged(change) = event {
            sink.lock().unwrap().push(Arc::clone(change));
        }
    });
    changes
}

fn summary(patches: &[Patch]) -> Vec<(PatchOp, String)> {
    patches
        .iter()
        .map(|patch| (patch.op, patch.path_string()))
        .collect()
}

#[test]
fn test_add_then_remove_subject_patches() {
    let mut manager = KodemoStateManager::new();
    manager.set_document(json!({ "title": "Patches" }));
    let changes = record_changes(&mut manager);

    let id = manager
        .add_subject(Subject::new(SubjectType::Code, "a.js"), Version::new("a"))
        .unwrap();
    manager.remove_subject(&id);

    let changes = changes.lock().unwrap();
    assert_eq!(changes.len(), 2);

    let added = &changes[0].patches;
    assert_eq!(
        summary(added),
        vec![
            (PatchOp::Add, format!("document/subjects/{id}")),
            (PatchOp::Add, "document/subjectIndex/0".to_string()),
        ]
    );
    assert_eq!(added[1].value, Some(Value::String(id.clone())));

    assert_eq!(
        summary(&changes[1].patches),
        vec![
            (PatchOp::Remove, format!("document/subjects/{id}")),
            (PatchOp::Remove, "document/subjectIndex/0".to_string()),
        ]
    );
}

#[test]
fn test_no_length_patches_for_list_changes() {
    let mut manager = KodemoStateManager::new();
    manager.set_document(json!({}));
    let changes = record_changes(&mut manager);

    let a = manager
        .add_subject(Subject::new(SubjectType::Code, "a.js"), Version::new("a"))
        .unwrap();
    let b = manager
        .add_subject(Subject::new(SubjectType::Code, "b.js"), Version::new("b"))
        .unwrap();
    manager.add_subject_version(&a, None, None);
    manager.set_subject_index(vec![b.clone(), a.clone()]);
    manager.remove_all_subjects();

    let changes = changes.lock().unwrap();
    assert!(
        changes
            .iter()
            .flat_map(|change| change.patches.iter().chain(&change.inverse_patches))
            .all(|patch| patch.path.last().map(String::as_str) != Some("length"))
    );
}

#[test]
fn test_context_is_attached() {
    let mut manager = KodemoStateManager::new();
    manager.set_document(json!({}));
    manager.set_context(json!({ "origin": "remote" }));
    let changes = record_changes(&mut manager);

    manager.set_document_title("New title");

    let changes = changes.lock().unwrap();
    assert_eq!(changes[0].context, json!({ "origin": "remote" }));
    assert_eq!(
        changes[0].patches,
        vec![Patch::replace(
            vec!["document".into(), "title".into()],
            json!("New title")
        )]
    );
    assert_eq!(
        changes[0].inverse_patches,
        vec![Patch::replace(
            vec!["document".into(), "title".into()],
            json!("Untitled")
        )]
    );
}

#[test]
fn test_unchanged_mutation_is_silent() {
    let mut manager = KodemoStateManager::new();
    manager.set_document(json!({ "title": "Same" }));
    let changes = record_changes(&mut manager);

    manager.set_document_title("Same");
    manager.remove_subject("missing");
    manager.update_subject("missing", &json!({ "name": "x" }));

    assert!(changes.lock().unwrap().is_empty());
}

#[test]
fn test_replaying_patches_on_a_second_store() {
    let mut source = KodemoStateManager::new();
    let mut mirror = KodemoStateManager::new();
    source.set_document(json!({ "title": "Shared" }));
    mirror.set_document(json!({ "title": "Shared" }));
    let changes = record_changes(&mut source);

    let id = source
        .add_subject(Subject::new(SubjectType::Image, "a.png"), Version::new("a.png"))
        .unwrap();
    source.update_subject(&id, &json!({ "name": "cover.png" }));
    let version = source.add_subject_version(&id, None, Some(&json!({ "width": 640 })));
    source.update_story("<p>Updated</p>");

    for change in changes.lock().unwrap().iter() {
        mirror.apply_document_patches(&change.patches).unwrap();
    }

    assert_eq!(mirror.document(), source.document());
    assert_eq!(mirror.subject(&id).map(|s| s.name.as_str()), Some("cover.png"));
    assert_eq!(
        version.and_then(|v| mirror.version(&id, &v).and_then(|v| v.width)),
        Some(640.0)
    );
}
