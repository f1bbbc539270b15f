#![warn(missing_docs)]
//! Kodemo Core - Headless State Kernel of the Kodemo Documentation Player
//!
//! # Overview
//!
//! A Kodemo document is a scrollable story told next to versioned subjects (code, images,
//! math, iframes). As the reader scrolls, effect markers in the story pass a playhead and
//! select what the subjects show: a version, highlighted code lines, an image region.
//!
//! `kodemo-core` holds everything about this that is not rendering. The host measures the
//! page, feeds scroll positions and sizes in, and draws whatever the store reports.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  State Store & Change Events                │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Timeline (segments, playhead, pagination)  │  ← Scroll ↔ Effect
//! ├─────────────────────────────────────────────┤
//! │  Effects, Story Markers, Code Highlights    │  ← What Is Shown
//! ├─────────────────────────────────────────────┤
//! │  Document Model, Migration, Patches         │  ← Persisted Data
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Line pairing for code transitions lives in the `kodemo-diff` crate, configuration in
//! `kodemo-config`.
//!
//! # Quick Start
//!
//! ```rust
//! use kodemo_core::{CodeHighlights, Effect, EffectPayload, KodemoStateManager};
//! use serde_json::json;
//!
//! let mut manager = KodemoStateManager::new();
//! manager.set_document(json!({
//!     "story": "<p data-effect-id=\"e1\" data-effect-subject=\"s1\">Intro</p>",
//!     "subjectIndex": ["s1"],
//!     "subjects": {
//!         "s1": { "type": "code", "name": "main.rs", "versions": { "v1": { "value": "fn main() {}" } } }
//!     }
//! }));
//!
//! let effect = Effect::new()
//!     .with_subject("s1")
//!     .with_version("gone")
//!     .with_payload(EffectPayload { code_highlights: Some("1".into()), image_highlights: None });
//! manager.set_current_effect(Some(effect), false);
//!
//! // Unknown versions fall back to the subject's first version.
//! let current = manager.current_effect().unwrap();
//! assert_eq!(current.version.as_deref(), Some("v1"));
//! assert_eq!(current.code_highlights(), CodeHighlights::parse("1"));
//! ```
//!
//! # Module Description
//!
//! - [`document`] - persisted document model and index invariants
//! - [`migrate`] - loading arbitrary JSON into a valid document
//! - [`patch`] - forward/inverse change patches
//! - [`effect`] - effects and their marker attributes
//! - [`highlights`] - compact code highlight sets
//! - [`story`] - effect markers in story HTML
//! - [`timeline`] - segments, playhead and pagination geometry
//! - [`transition`] - code version transitions
//! - [`scheduler`] - clocks and deferred work
//! - [`state`] - the state store

pub mod document;
pub mod effect;
mod error;
pub mod highlights;
mod ids;
pub mod migrate;
pub mod patch;
pub mod scheduler;
pub mod state;
pub mod story;
pub mod timeline;
pub mod transition;

pub use document::{KodemoDocument, Subject, Version, index_is_consistent, is_empty_document};
pub use effect::{Effect, EffectPayload, ImageHighlight, replace_effect_ids_in_html};
pub use error::{DocumentError, PatchError};
pub use highlights::CodeHighlights;
pub use ids::{generate_effect_id, generate_segment_id, generate_subject_id, generate_version_id};
pub use kodemo_config::{PlayerConfig, SubjectType, TimelineConfig};
pub use migrate::{DOCUMENT_FORMAT_VERSION, migrate_document};
pub use patch::{DocumentChange, Patch, PatchOp};
pub use scheduler::{Clock, ManualClock, SystemClock};
pub use state::{KodemoStateManager, StoreCallback, StoreEvent, SubscriptionId};
pub use story::{effects_in_story, segments_from_story};
pub use timeline::{
    Dimensions, PageDirection, Point, Rect, SegmentMeasure, SegmentUpdate, TimelineSegment,
};
pub use transition::{CodeTransition, is_version_active, plan_code_transition};
