//! State management example
//!
//! Loads a small document into a `KodemoStateManager`, edits it, scrolls through the story and
//! undoes an edit with the recorded inverse patches.

use kodemo_core::{
    Dimensions, KodemoStateManager, ManualClock, Rect, SegmentMeasure, StoreEvent, Subject,
    SubjectType, Version, segments_from_story,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    println!("=== Kodemo state management ===\n");

    let clock = ManualClock::new(0);
    let mut manager = KodemoStateManager::new().with_clock(clock.clone());

    let changes = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&changes);
    manager.subscribe(move |event| match event {
        StoreEvent::DocumentChanged(change) => {
            for patch in &change.patches {
                println!("  patch: {} {}", patch.op, patch.path_string());
            }
            if let Ok(mut changes) = recorded.lock() {
                changes.push(Arc::clone(change));
            }
        }
        StoreEvent::DocumentReplaced(doc) => println!("  document loaded: {}", doc.title),
        StoreEvent::SubjectAdded { subject_id, .. } => println!("  subject added: {subject_id}"),
        StoreEvent::EffectChanged { effect } => println!(
            "  current effect: {}",
            effect.as_ref().map_or("none", |effect| effect.id.as_str())
        ),
    });

    println!("1. Load a document:");
    manager.set_document(json!({
        "title": "Hello, Kodemo",
        "story": concat!(
            r#"<p data-effect-id="e1" data-effect-subject="main" data-effect-version="v1">First</p>"#,
            r#"<p data-effect-id="e2" data-effect-subject="main" data-effect-version="v2" "#,
            r#"data-effect-payload="2">Then</p>"#,
        ),
        "subjectIndex": ["main"],
        "subjects": {
            "main": {
                "type": "code",
                "name": "main.rs",
                "language": "rust",
                "versionIndex": ["v1", "v2"],
                "versions": {
                    "v1": { "value": "fn main() {}" },
                    "v2": { "value": "fn main() {\n    println!(\"hi\");\n}" }
                }
            }
        }
    }));

    println!("\n2. Edit the document:");
    manager.set_document_title("Hello again");
    let notes = manager.add_subject(
        Subject::new(SubjectType::Code, "notes.txt"),
        Version::new("remember the playhead"),
    );
    println!("  subjects: {:?}", manager.subject_index().unwrap_or_default());

    println!("\n3. Undo the last edit:");
    let last = changes.lock().ok().and_then(|changes| changes.last().cloned());
    if let Some(change) = last
        && let Err(err) = manager.apply_document_patches(&change.inverse_patches)
    {
        println!("  undo failed: {err}");
    }
    println!(
        "  notes subject present: {}",
        notes.is_some_and(|id| manager.subject(&id).is_some())
    );

    println!("\n4. Scroll through the story:");
    let story = manager.story().unwrap_or_default().to_string();
    let mut top = 0.0;
    let segments = segments_from_story(&story, |_| {
        top += 300.0;
        let at = top;
        move || SegmentMeasure::at(at)
    });
    manager.register_timeline_segments(segments);
    manager.update_timeline_segment_bottoms(1200.0);
    manager.set_dimensions(Dimensions { width: 1024.0, height: 768.0 });
    manager.set_story_measurements(Rect::new(0.0, 0.0, 600.0, 768.0));
    manager.set_playhead_measurements(Rect::new(0.0, 75.0, 600.0, 18.0));
    manager.set_layout_complete(true);

    for scroll_top in [0.0, 250.0, 600.0] {
        manager.set_scroll_top(scroll_top);
        clock.advance(manager.config().active_effect_interval_ms);
        manager.run_pending_tasks();
        println!(
            "  scroll_top = {scroll_top}: playhead at {:?}, active segment {:?}",
            manager.playhead_offset(),
            manager.active_timeline_segment_id()
        );
    }

    println!("\n5. Final state:");
    println!("  title: {:?}", manager.title());
    println!("  document cycle: {}", manager.document_cycle());
    println!(
        "  recorded changes: {}",
        changes.lock().map_or(0, |changes| changes.len())
    );

    println!("\n=== Done ===");
}
