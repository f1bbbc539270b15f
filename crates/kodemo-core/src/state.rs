//! Player State Store
//!
//! [`KodemoStateManager`] owns the loaded document together with the ephemeral player state
//! (current effect, timeline segments, scroll position, measurements) and is the only place
//! either of them is mutated.
//!
//! # Overview
//!
//! - **Document operations** (`set_document`, `add_subject`, ...) diff a JSON snapshot of the
//!   document taken before and after the mutation and report the result as a
//!   [`StoreEvent::DocumentChanged`] carrying forward and inverse patches.
//! - **Effect operations** (`set_current_effect`, `set_preview_effect`, ...) only change
//!   ephemeral state and report [`StoreEvent::EffectChanged`]. They never produce patches.
//! - **Timeline operations** keep the segment list measured and sorted.
//! - **Deferred work** (delayed previews, throttled active effect recomputation, coalesced
//!   resizes) is queued and executed by [`KodemoStateManager::run_pending_tasks`].
//!
//! # Example
//!
//! ```rust
//! use kodemo_core::{KodemoStateManager, StoreEvent, Subject, SubjectType, Version};
//! use serde_json::json;
//!
//! let mut manager = KodemoStateManager::new();
//!
//! manager.subscribe(|event| {
//!     if let StoreEvent::DocumentChanged(change) = event {
//!         println!("{} patches", change.patches.len());
//!     }
//! });
//!
//! manager.set_document(json!({ "title": "Demo", "story": "<p>Hello</p>" }));
//! let subject_id = manager
//!     .add_subject(Subject::new(SubjectType::Code, "main.rs"), Version::new("fn main() {}"))
//!     .unwrap();
//!
//! assert_eq!(manager.subject_index(), Some(&[subject_id][..]));
//! ```

use crate::document::{KodemoDocument, Subject, Version, reconcile_index};
use crate::effect::Effect;
use crate::error::{DocumentError, PatchError};
use crate::ids::{generate_subject_id, generate_version_id, unique_id};
use crate::migrate::{migrate_document, migrate_typed};
use crate::patch::{DOCUMENT_ROOT, DocumentChange, Patch, apply_patches, diff_values};
use crate::scheduler::{Clock, Coalescer, Scheduler, SystemClock, Throttle};
use crate::timeline::{
    self, ActiveEffectUpdate, Dimensions, PageDirection, PaginationInput, PlayheadInput, Point,
    Rect, SegmentUpdate, TimelineSegment,
};
use indexmap::IndexMap;
use kodemo_config::{PlayerConfig, TimelineConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Notification sent to subscribers.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// The document was mutated.
    DocumentChanged(Arc<DocumentChange>),
    /// A different document was loaded.
    DocumentReplaced(Arc<KodemoDocument>),
    /// A subject was added, see [`KodemoStateManager::add_subject`].
    SubjectAdded {
        /// New subject id.
        subject_id: String,
        /// Id of the subject's first version.
        version_id: String,
    },
    /// The current effect changed.
    EffectChanged {
        /// The new current effect.
        effect: Option<Effect>,
    },
}

/// Store event callback function type
pub type StoreCallback = Box<dyn FnMut(&StoreEvent) + Send>;

/// Handle returned by [`KodemoStateManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
enum PendingTask {
    Preview(Option<Effect>),
    ClearPreview(Option<String>),
}

/// The player state store.
///
/// All operations are synchronous. Operations on a missing document, subject or version are
/// no-ops.
pub struct KodemoStateManager {
    document: Option<Arc<KodemoDocument>>,
    document_cycle: u64,
    context: Value,
    config: TimelineConfig,
    keyboard_pagination: bool,
    clock: Arc<dyn Clock>,

    callbacks: Vec<(SubscriptionId, StoreCallback)>,
    next_subscription: u64,

    current_effect: Option<Effect>,
    last_set_effect: Option<Effect>,
    preview_effect: Option<Effect>,
    current_effect_is_fixed: bool,

    timeline_segments: Vec<TimelineSegment>,
    active_timeline_segment_id: Option<String>,

    scroll_top: f64,
    dimensions: Dimensions,
    offset: Point,
    layout_complete: bool,
    editing: bool,
    playhead_fixed_top: Option<f64>,
    playhead_offset: Option<f64>,
    playhead_measurements: Option<Rect>,
    story_measurements: Option<Rect>,
    story_content_measurements: Option<Rect>,

    preview_task: Scheduler<PendingTask>,
    active_effect_throttle: Throttle,
    dimension_updates: Coalescer<Dimensions>,
}

impl Default for KodemoStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl KodemoStateManager {
    /// Create an empty store with the default timeline config and the system clock.
    pub fn new() -> Self {
        Self::with_config(TimelineConfig::default())
    }

    /// Create an empty store with the given timeline config.
    pub fn with_config(config: TimelineConfig) -> Self {
        Self {
            document: None,
            document_cycle: 1,
            context: Value::Object(Default::default()),
            keyboard_pagination: true,
            clock: Arc::new(SystemClock::new()),
            callbacks: Vec::new(),
            next_subscription: 0,
            current_effect: None,
            last_set_effect: None,
            preview_effect: None,
            current_effect_is_fixed: false,
            timeline_segments: Vec::new(),
            active_timeline_segment_id: None,
            scroll_top: 0.0,
            dimensions: Dimensions::default(),
            offset: Point::default(),
            layout_complete: false,
            editing: false,
            playhead_fixed_top: None,
            playhead_offset: None,
            playhead_measurements: None,
            story_measurements: None,
            story_content_measurements: None,
            preview_task: Scheduler::default(),
            active_effect_throttle: Throttle::new(config.active_effect_interval_ms),
            dimension_updates: Coalescer::new(config.resize_interval_ms),
            config,
        }
    }

    /// Create an empty store from a full player config.
    ///
    /// Only the timeline settings and `keyboard_pagination` concern the store. The remaining
    /// flags are read by the host's renderer.
    pub fn with_player_config(config: PlayerConfig) -> Self {
        let mut manager = Self::with_config(config.timeline);
        manager.keyboard_pagination = config.keyboard_pagination;
        manager
    }

    /// Replace the clock. Tests use a [`crate::ManualClock`].
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Subscribe to store events
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    /// Set the metadata attached to subsequent [`DocumentChange`]s.
    pub fn set_context(&mut self, context: Value) {
        self.context = context;
    }

    fn emit(&mut self, event: StoreEvent) {
        for (_, callback) in &mut self.callbacks {
            callback(&event);
        }
    }

    fn emit_effect_changed(&mut self) {
        let effect = self.current_effect.clone();
        self.emit(StoreEvent::EffectChanged { effect });
    }

    /// Run `recipe` against the document and report the resulting patches.
    ///
    /// Returns `None` without a document. No event is sent when nothing changed.
    fn produce_and_store<R>(&mut self, recipe: impl FnOnce(&mut KodemoDocument) -> R) -> Option<R> {
        let doc = self.document.as_mut()?;
        let before = snapshot(doc.as_ref());
        let result = recipe(Arc::make_mut(doc));
        let after = snapshot(doc.as_ref());

        let (patches, inverse_patches) = diff_values(&before, &after, &[DOCUMENT_ROOT]);
        if !patches.is_empty() {
            tracing::trace!(patches = patches.len(), "document changed");
            let change = DocumentChange {
                patches,
                inverse_patches,
                context: self.context.clone(),
            };
            self.emit(StoreEvent::DocumentChanged(Arc::new(change)));
        }
        Some(result)
    }

    /*-- Document ------------------------------------------------------------------------*/

    /// Load a document from any JSON value.
    ///
    /// The input is migrated first. If the result equals the loaded document nothing happens.
    /// Otherwise the ephemeral state is reset, the document cycle advances and subscribers
    /// receive [`StoreEvent::DocumentReplaced`] followed by a `DocumentChanged` that replaces
    /// the whole document.
    pub fn set_document(&mut self, raw: Value) {
        let doc = migrate_document(raw);
        let before = self
            .document
            .as_deref()
            .map_or(Value::Null, snapshot);
        let after = snapshot(&doc);
        if before.to_string() == after.to_string() {
            tracing::debug!("document unchanged, keeping current state");
            return;
        }

        self.reset_ephemeral();
        let doc = Arc::new(doc);
        self.document = Some(Arc::clone(&doc));
        self.document_cycle += 1;
        tracing::debug!(cycle = self.document_cycle, "document replaced");

        self.emit(StoreEvent::DocumentReplaced(doc));
        let root = vec![DOCUMENT_ROOT.to_string()];
        let change = DocumentChange {
            patches: vec![Patch::replace(root.clone(), after)],
            inverse_patches: vec![Patch::replace(root, before)],
            context: self.context.clone(),
        };
        self.emit(StoreEvent::DocumentChanged(Arc::new(change)));
    }

    /// Parse JSON text and load it with [`set_document`](Self::set_document).
    pub fn set_document_json(&mut self, json: &str) -> Result<(), DocumentError> {
        let raw: Value = serde_json::from_str(json)?;
        self.set_document(raw);
        Ok(())
    }

    /// Drop the document and all ephemeral state. Sends no events.
    pub fn reset(&mut self) {
        self.document = None;
        self.reset_ephemeral();
    }

    fn reset_ephemeral(&mut self) {
        self.current_effect = None;
        self.last_set_effect = None;
        self.preview_effect = None;
        self.current_effect_is_fixed = false;
        self.active_timeline_segment_id = None;
        self.timeline_segments.clear();
        self.scroll_top = 0.0;
        self.layout_complete = false;
        self.playhead_offset = None;
        self.preview_task.cancel();
        self.active_effect_throttle.reset();
    }

    /// Set the document title.
    pub fn set_document_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        self.produce_and_store(|doc| doc.title = title);
    }

    /// Replace the story HTML.
    pub fn update_story(&mut self, story: impl Into<String>) {
        let story = story.into();
        self.produce_and_store(|doc| doc.story = story);
    }

    /// Add a subject with a single version. Returns the new subject id.
    ///
    /// `template` supplies the type, name and any extra fields; its versions are ignored.
    /// `created_at` defaults to now. Subscribers receive the `DocumentChanged` event first and
    /// then [`StoreEvent::SubjectAdded`].
    pub fn add_subject(&mut self, template: Subject, first_version: Version) -> Option<String> {
        let now = self.clock.epoch_ms();
        let (subject_id, version_id) = self.produce_and_store(|doc| {
            let subject_id = unique_id(generate_subject_id(doc.subjects.len(), now), |id| {
                doc.subjects.contains_key(id)
            });
            let version_id = generate_version_id(&subject_id, 0, now);

            let mut subject = template;
            subject.created_at.get_or_insert(now);
            subject.versions = IndexMap::from([(version_id.clone(), first_version)]);
            subject.version_index = vec![version_id.clone()];

            doc.subjects.insert(subject_id.clone(), subject);
            doc.subject_index.push(subject_id.clone());
            (subject_id, version_id)
        })?;

        tracing::debug!(%subject_id, %version_id, "subject added");
        self.emit(StoreEvent::SubjectAdded {
            subject_id: subject_id.clone(),
            version_id,
        });
        Some(subject_id)
    }

    /// Shallow-merge the fields of `data` (a JSON object) into a subject.
    pub fn update_subject(&mut self, subject_id: &str, data: &Value) {
        self.produce_and_store(|doc| {
            let Some(subject) = doc.subjects.get_mut(subject_id) else {
                return;
            };
            if let Err(err) = merge_fields(subject, data) {
                tracing::warn!("Ignoring invalid update for subject {subject_id:?}: {err}");
                return;
            }
            reconcile_index(&subject.versions, &mut subject.version_index);
        });
    }

    /// Remove a subject. Unknown ids are ignored.
    pub fn remove_subject(&mut self, subject_id: &str) {
        self.produce_and_store(|doc| {
            doc.subjects.shift_remove(subject_id);
            doc.subject_index.retain(|id| id != subject_id);
        });
    }

    /// Remove every subject.
    pub fn remove_all_subjects(&mut self) {
        self.produce_and_store(|doc| {
            doc.subjects.clear();
            doc.subject_index.clear();
        });
    }

    /// Reorder subjects. Unknown ids are dropped and missing ones appended.
    pub fn set_subject_index(&mut self, subject_index: Vec<String>) {
        self.produce_and_store(|doc| {
            doc.subject_index = subject_index;
            reconcile_index(&doc.subjects, &mut doc.subject_index);
        });
        timeline::measure_and_sort(&mut self.timeline_segments);
    }

    /// Add a version to a subject by duplicating an existing one. Returns the new version id.
    ///
    /// The copied version is `after` when given and present, otherwise the last version in the
    /// index, otherwise the most recently inserted one. `data` is merged over the copy. The new
    /// id is placed right after `after` in the index, or appended.
    pub fn add_subject_version(
        &mut self,
        subject_id: &str,
        after: Option<&str>,
        data: Option<&Value>,
    ) -> Option<String> {
        let now = self.clock.epoch_ms();
        self.produce_and_store(|doc| {
            let subject = doc.subjects.get_mut(subject_id)?;

            let mut version = after
                .and_then(|id| subject.versions.get(id))
                .or_else(|| {
                    subject
                        .version_index
                        .last()
                        .and_then(|id| subject.versions.get(id))
                })
                .or_else(|| subject.versions.values().last())
                .cloned()
                .unwrap_or_default();
            version.created_at.get_or_insert(now);
            if let Some(data) = data
                && let Err(err) = merge_fields(&mut version, data)
            {
                tracing::warn!("Ignoring invalid data for new version of {subject_id:?}: {err}");
            }

            let version_id = unique_id(
                generate_version_id(subject_id, subject.versions.len(), now),
                |id| subject.versions.contains_key(id),
            );
            subject.versions.insert(version_id.clone(), version);

            let position = after.and_then(|after| {
                subject
                    .version_index
                    .iter()
                    .position(|id| id.as_str() == after)
            });
            match position {
                Some(idx) => subject.version_index.insert(idx + 1, version_id.clone()),
                None => subject.version_index.push(version_id.clone()),
            }
            Some(version_id)
        })
        .flatten()
    }

    /// Shallow-merge the fields of `data` (a JSON object) into a version.
    pub fn update_subject_version(&mut self, subject_id: &str, version_id: &str, data: &Value) {
        self.produce_and_store(|doc| {
            let Some(version) = doc
                .subjects
                .get_mut(subject_id)
                .and_then(|subject| subject.versions.get_mut(version_id))
            else {
                return;
            };
            if let Err(err) = merge_fields(version, data) {
                tracing::warn!("Ignoring invalid update for version {version_id:?}: {err}");
            }
        });
    }

    /// Remove a version.
    ///
    /// Effects pointing at the removed version fall back to the subject's first version.
    pub fn remove_subject_version(&mut self, subject_id: &str, version_id: &str) {
        self.produce_and_store(|doc| {
            if let Some(subject) = doc.subjects.get_mut(subject_id) {
                subject.versions.shift_remove(version_id);
                subject.version_index.retain(|id| id != version_id);
            }
        });

        self.last_set_effect = self.last_set_effect.take().map(|e| self.validated(e));
        self.preview_effect = self.preview_effect.take().map(|e| self.validated(e));
        if let Some(current) = self.current_effect.clone() {
            let validated = self.validated(current.clone());
            if validated != current {
                self.current_effect = Some(validated);
                self.emit_effect_changed();
            }
        }
    }

    /// Reorder the versions of a subject. Unknown ids are dropped and missing ones appended.
    pub fn set_subject_version_index(&mut self, subject_id: &str, version_index: Vec<String>) {
        self.produce_and_store(|doc| {
            if let Some(subject) = doc.subjects.get_mut(subject_id) {
                subject.version_index = version_index;
                reconcile_index(&subject.versions, &mut subject.version_index);
            }
        });
    }

    /// Apply patches from another store or an undo stack.
    ///
    /// The result is re-validated as a document and reported like any other mutation.
    /// Nothing is applied if any patch fails.
    pub fn apply_document_patches(&mut self, patches: &[Patch]) -> Result<(), PatchError> {
        let Some(doc) = self.document.as_deref() else {
            return Ok(());
        };

        let mut root = Value::Object(Default::default());
        root[DOCUMENT_ROOT] = snapshot(doc);
        apply_patches(&mut root, patches)?;

        let patched: KodemoDocument = serde_json::from_value(root[DOCUMENT_ROOT].take())?;
        let patched = migrate_typed(patched);
        self.produce_and_store(|doc| *doc = patched);
        Ok(())
    }

    /*-- Effects -------------------------------------------------------------------------*/

    /// Effect with its version checked against the document.
    fn validated(&self, mut effect: Effect) -> Effect {
        let Some(subject) = effect.subject.as_deref().and_then(|id| self.subject(id)) else {
            return effect;
        };
        let missing = effect
            .version
            .as_deref()
            .is_some_and(|version_id| !subject.versions.contains_key(version_id));
        if missing {
            let fallback = subject.first_version_id().map(str::to_string);
            tracing::debug!(effect = %effect.id, ?fallback, "effect version no longer exists");
            effect.version = fallback;
        }
        effect
    }

    fn update_active_segment(&mut self) {
        let effect_id = self.current_effect.as_ref().map(|effect| effect.id.as_str());
        self.active_timeline_segment_id =
            timeline::mark_active(&mut self.timeline_segments, effect_id);
    }

    /// Make `effect` the current effect.
    ///
    /// Cancels any pending preview and always records `effect` as the last set effect. The
    /// current effect only changes when no fixed effect is locked in and the ids differ (or
    /// either side is `None`). `fixed` locks the new effect until
    /// [`clear_fixed_effect`](Self::clear_fixed_effect).
    pub fn set_current_effect(&mut self, effect: Option<Effect>, fixed: bool) {
        self.preview_task.cancel();

        let effect = effect.map(|effect| self.validated(effect));
        self.last_set_effect = effect.clone();
        if self.current_effect_is_fixed {
            return;
        }

        let differs = match (&self.current_effect, &effect) {
            (Some(current), Some(new)) => current.id != new.id,
            _ => true,
        };
        if differs {
            self.current_effect = effect;
            self.current_effect_is_fixed = fixed;
            self.preview_effect = None;
            self.update_active_segment();
            self.emit_effect_changed();
        }
    }

    /// Temporarily show `effect` without changing the last set effect.
    ///
    /// With a non-zero `delay_ms` the preview is scheduled and replaced by any later preview
    /// or clear request.
    pub fn set_preview_effect(&mut self, effect: Option<Effect>, delay_ms: u64) {
        self.preview_task.cancel();
        if delay_ms > 0 {
            let deadline = self.clock.now_ms().saturating_add(delay_ms);
            self.preview_task.schedule(PendingTask::Preview(effect), deadline);
        } else {
            self.apply_preview(effect);
        }
    }

    fn apply_preview(&mut self, effect: Option<Effect>) {
        if self.current_effect_is_fixed {
            return;
        }

        let matches_last_set = effect.as_ref().is_some_and(|effect| {
            !effect.has_payload()
                && self.last_set_effect.as_ref().is_some_and(|last| {
                    last.subject == effect.subject && last.version == effect.version
                })
        });

        if matches_last_set {
            self.current_effect = self.last_set_effect.clone();
            self.preview_effect = None;
        } else {
            let effect = effect.map(|effect| self.validated(effect));
            self.preview_effect = effect.clone();
            self.current_effect = effect;
        }
        self.emit_effect_changed();
    }

    /// Roll back a preview to the last set effect.
    ///
    /// With `Some(effect)` this only happens while that effect is the one being previewed.
    pub fn clear_preview_effect(&mut self, effect: Option<&Effect>, delay_ms: u64) {
        self.preview_task.cancel();
        let effect_id = effect.map(|effect| effect.id.clone());
        if delay_ms > 0 {
            let deadline = self.clock.now_ms().saturating_add(delay_ms);
            self.preview_task
                .schedule(PendingTask::ClearPreview(effect_id), deadline);
        } else {
            self.apply_clear_preview(effect_id);
        }
    }

    fn apply_clear_preview(&mut self, effect_id: Option<String>) {
        if self.current_effect_is_fixed {
            return;
        }
        let applies = match &effect_id {
            None => true,
            Some(id) => self
                .preview_effect
                .as_ref()
                .is_some_and(|preview| &preview.id == id),
        };
        if applies {
            self.current_effect = self.last_set_effect.clone();
            self.preview_effect = None;
            self.emit_effect_changed();
        }
    }

    /// Unlock a fixed effect and return to the last set effect.
    pub fn clear_fixed_effect(&mut self) {
        if !self.current_effect_is_fixed {
            return;
        }
        self.current_effect_is_fixed = false;

        let last_id = self.last_set_effect.as_ref().map(|effect| &effect.id);
        let reverts = self
            .current_effect
            .as_ref()
            .is_some_and(|current| Some(&current.id) != last_id);
        if reverts {
            self.current_effect = self.last_set_effect.clone();
            self.preview_effect = None;
            self.update_active_segment();
            self.emit_effect_changed();
        }
    }

    /*-- Timeline ------------------------------------------------------------------------*/

    /// Register segments. Segments whose id is already registered are skipped.
    pub fn register_timeline_segments(&mut self, segments: impl IntoIterator<Item = TimelineSegment>) {
        for segment in segments {
            if !self.timeline_segments.iter().any(|s| s.id == segment.id) {
                self.timeline_segments.push(segment);
            }
        }
        timeline::measure_and_sort(&mut self.timeline_segments);
        self.update_active_segment();
        self.active_effect_throttle.request();
    }

    /// Remove segments by id.
    pub fn unregister_timeline_segments<I, S>(&mut self, segment_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<S> = segment_ids.into_iter().collect();
        self.timeline_segments
            .retain(|segment| !ids.iter().any(|id| id.as_ref() == segment.id));
        self.update_active_segment();
    }

    /// Merge `update` into a segment, then re-measure.
    pub fn update_timeline_segment(&mut self, segment_id: &str, update: SegmentUpdate) {
        timeline::update_segment(&mut self.timeline_segments, segment_id, update);
        timeline::measure_and_sort(&mut self.timeline_segments);
    }

    /// Merge several updates, then re-measure once.
    pub fn update_timeline_segments(&mut self, updates: impl IntoIterator<Item = (String, SegmentUpdate)>) {
        for (segment_id, update) in updates {
            timeline::update_segment(&mut self.timeline_segments, &segment_id, update);
        }
        timeline::measure_and_sort(&mut self.timeline_segments);
    }

    /// Re-measure and re-sort every segment.
    pub fn update_all_timeline_segment_positions(&mut self) {
        timeline::measure_and_sort(&mut self.timeline_segments);
    }

    /// Recompute segment bottoms for a timeline of `container_height`. Returns `true` if any
    /// bottom changed.
    pub fn update_timeline_segment_bottoms(&mut self, container_height: f64) -> bool {
        let changed = timeline::compute_bottoms(
            &mut self.timeline_segments,
            container_height,
            self.config.segment_spacing,
        );
        if changed {
            self.active_effect_throttle.request();
        }
        changed
    }

    /// Recompute the playhead offset. Returns `None` while the first segment is unmeasured.
    pub fn update_playhead(&mut self) -> Option<f64> {
        let input = PlayheadInput {
            viewport_height: self.dimensions.height,
            story_top: self.story_measurements.map_or(0.0, |rect| rect.y),
            fixed_top: self.playhead_fixed_top,
            first_segment_bottom: self.timeline_segments.first().and_then(|s| s.bottom),
            has_segments: !self.timeline_segments.is_empty(),
            scroll_top: self.scroll_top,
        };
        let offset = timeline::playhead_offset(input, &self.config)?;
        self.playhead_offset = Some(offset);
        Some(offset)
    }

    fn update_active_effect(&mut self) {
        let Some(offset) = self.update_playhead() else {
            return;
        };
        let position = self.scroll_top + offset;
        let update = timeline::resolve_active_effect(
            &self.timeline_segments,
            position,
            self.config.playhead_size,
            self.current_effect.as_ref(),
        );
        match update {
            ActiveEffectUpdate::Keep => {}
            ActiveEffectUpdate::Clear => {
                if self.current_effect.is_some() {
                    self.set_current_effect(None, false);
                }
            }
            ActiveEffectUpdate::Select(effect) => self.set_current_effect(Some(effect), false),
        }
    }

    /// Scroll offset for the previous or next segment. `None` until the playhead and story
    /// have been measured.
    pub fn pagination_target(&self, direction: PageDirection) -> Option<f64> {
        let input = PaginationInput {
            scroll_top: self.scroll_top,
            playhead_top: self.playhead_measurements?.top(),
            story: self.story_measurements?,
            viewport_height: self.dimensions.height,
        };
        Some(timeline::pagination_target(
            &self.timeline_segments,
            self.active_timeline_segment_id.as_deref(),
            direction,
            input,
            &self.config,
        ))
    }

    /// Like [`pagination_target`](Self::pagination_target), for a key press. `None` while
    /// keyboard pagination is disabled.
    pub fn keyboard_pagination_target(&self, direction: PageDirection) -> Option<f64> {
        if !self.keyboard_pagination {
            return None;
        }
        self.pagination_target(direction)
    }

    /// Whether paging back is possible.
    pub fn has_previous(&self) -> bool {
        timeline::has_previous(self.scroll_top)
    }

    /// Whether paging forward is possible.
    pub fn has_next(&self) -> bool {
        timeline::has_next(
            &self.timeline_segments,
            self.active_timeline_segment_id.as_deref(),
        )
    }

    /// Padding the story needs below its content. `None` until the playhead is measured.
    pub fn story_padding_bottom(&self) -> Option<f64> {
        let playhead = self.playhead_measurements?;
        Some(timeline::story_padding_bottom(
            self.dimensions.height,
            playhead.top(),
            &self.config,
        ))
    }

    /*-- Layout --------------------------------------------------------------------------*/

    /// Record the scroll offset. The active effect follows on the next
    /// [`run_pending_tasks`](Self::run_pending_tasks).
    pub fn set_scroll_top(&mut self, scroll_top: f64) {
        self.scroll_top = scroll_top;
        self.active_effect_throttle.request();
    }

    /// Record the player size. Bursts are coalesced.
    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        let now = self.clock.now_ms();
        self.dimension_updates.push(dimensions, now);
    }

    /// Record the player's offset within the page.
    pub fn set_offset(&mut self, offset: Point) {
        self.offset = offset;
    }

    /// Record the story wrapper's bounding box.
    pub fn set_story_measurements(&mut self, rect: Rect) {
        self.story_measurements = Some(rect);
    }

    /// Record the story content's bounding box.
    pub fn set_story_content_measurements(&mut self, rect: Rect) {
        self.story_content_measurements = Some(rect);
    }

    /// Record the playhead's bounding box.
    pub fn set_playhead_measurements(&mut self, rect: Rect) {
        self.playhead_measurements = Some(rect);
    }

    /// Pin the playhead offset, or release it with `None`.
    pub fn set_playhead_fixed_top(&mut self, top: Option<f64>) {
        self.playhead_fixed_top = top;
        self.active_effect_throttle.request();
    }

    /// Mark the story as rendered and measured.
    pub fn set_layout_complete(&mut self, complete: bool) {
        self.layout_complete = complete;
        if complete {
            self.active_effect_throttle.request();
        }
    }

    /// Switch between editing and viewing.
    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    /*-- Deferred work -------------------------------------------------------------------*/

    /// Execute deferred work that is due. Returns the number of tasks run.
    ///
    /// Runs a due preview or clear-preview request, applies the latest coalesced dimensions,
    /// then recomputes the active effect if a scroll or layout change asked for it and the
    /// throttle interval has passed. Active effect recomputation waits for
    /// [`set_layout_complete`](Self::set_layout_complete).
    pub fn run_pending_tasks(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut ran = 0;

        if let Some(task) = self.preview_task.take_due(now) {
            match task {
                PendingTask::Preview(effect) => self.apply_preview(effect),
                PendingTask::ClearPreview(effect_id) => self.apply_clear_preview(effect_id),
            }
            ran += 1;
        }

        if let Some(dimensions) = self.dimension_updates.take_due(now) {
            self.dimensions = dimensions;
            self.active_effect_throttle.request();
            ran += 1;
        }

        if self.layout_complete && self.active_effect_throttle.poll(now) {
            self.update_active_effect();
            ran += 1;
        }

        ran
    }

    /// Earliest monotonic time at which [`run_pending_tasks`](Self::run_pending_tasks) has
    /// something to do.
    pub fn next_deadline(&self) -> Option<u64> {
        let throttle = self
            .layout_complete
            .then(|| self.active_effect_throttle.ready_at())
            .flatten();
        [
            self.preview_task.deadline(),
            self.dimension_updates.deadline(),
            throttle,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /*-- Selectors -----------------------------------------------------------------------*/

    /// The loaded document.
    pub fn document(&self) -> Option<&KodemoDocument> {
        self.document.as_deref()
    }

    /// A shared handle to the loaded document.
    pub fn document_arc(&self) -> Option<Arc<KodemoDocument>> {
        self.document.clone()
    }

    /// Id of the loaded document.
    pub fn document_id(&self) -> Option<&str> {
        self.document()?.id.as_deref()
    }

    /// Title of the loaded document.
    pub fn title(&self) -> Option<&str> {
        self.document().map(|doc| doc.title.as_str())
    }

    /// Story HTML of the loaded document.
    pub fn story(&self) -> Option<&str> {
        self.document().map(|doc| doc.story.as_str())
    }

    /// Subjects by id.
    pub fn subjects(&self) -> Option<&IndexMap<String, Subject>> {
        self.document().map(|doc| &doc.subjects)
    }

    /// A subject by id.
    pub fn subject(&self, subject_id: &str) -> Option<&Subject> {
        self.document()?.subject(subject_id)
    }

    /// A version by subject and version id.
    pub fn version(&self, subject_id: &str, version_id: &str) -> Option<&Version> {
        self.document()?.version(subject_id, version_id)
    }

    /// Subject ids in display order.
    pub fn subject_index(&self) -> Option<&[String]> {
        self.document().map(|doc| doc.subject_index.as_slice())
    }

    /// Version ids of a subject in display order.
    pub fn version_index(&self, subject_id: &str) -> Option<&[String]> {
        self.subject(subject_id)
            .map(|subject| subject.version_index.as_slice())
    }

    /// Incremented whenever a different document is loaded. Starts at 1.
    pub fn document_cycle(&self) -> u64 {
        self.document_cycle
    }

    /// The effect on screen, preview included.
    pub fn current_effect(&self) -> Option<&Effect> {
        self.current_effect.as_ref()
    }

    /// The last effect set through [`set_current_effect`](Self::set_current_effect).
    pub fn current_non_preview_effect(&self) -> Option<&Effect> {
        self.last_set_effect.as_ref()
    }

    /// The effect being previewed.
    pub fn preview_effect(&self) -> Option<&Effect> {
        self.preview_effect.as_ref()
    }

    /// Whether the current effect is locked.
    pub fn current_effect_is_fixed(&self) -> bool {
        self.current_effect_is_fixed
    }

    /// Registered segments, sorted by position.
    pub fn timeline_segments(&self) -> &[TimelineSegment] {
        &self.timeline_segments
    }

    /// A segment by id.
    pub fn timeline_segment(&self, segment_id: &str) -> Option<&TimelineSegment> {
        self.timeline_segments.iter().find(|s| s.id == segment_id)
    }

    /// Id of the segment showing the current effect.
    pub fn active_timeline_segment_id(&self) -> Option<&str> {
        self.active_timeline_segment_id.as_deref()
    }

    /// Scroll offset.
    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    /// Player size.
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Player offset within the page.
    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Whether the story has been rendered and measured.
    pub fn layout_complete(&self) -> bool {
        self.layout_complete
    }

    /// Whether the document is being edited.
    pub fn editing(&self) -> bool {
        self.editing
    }

    /// Host-pinned playhead offset.
    pub fn playhead_fixed_top(&self) -> Option<f64> {
        self.playhead_fixed_top
    }

    /// Last computed playhead offset.
    pub fn playhead_offset(&self) -> Option<f64> {
        self.playhead_offset
    }

    /// Playhead bounding box.
    pub fn playhead_measurements(&self) -> Option<Rect> {
        self.playhead_measurements
    }

    /// Story wrapper bounding box.
    pub fn story_measurements(&self) -> Option<Rect> {
        self.story_measurements
    }

    /// Story content bounding box.
    pub fn story_content_measurements(&self) -> Option<Rect> {
        self.story_content_measurements
    }

    /// Metadata attached to document changes.
    pub fn context(&self) -> &Value {
        &self.context
    }

    /// Timeline config in use.
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Whether pagination follows key presses.
    pub fn keyboard_pagination(&self) -> bool {
        self.keyboard_pagination
    }
}

fn snapshot(doc: &KodemoDocument) -> Value {
    serde_json::to_value(doc).unwrap_or_else(|err| {
        tracing::warn!("Failed to snapshot document: {err}");
        Value::Null
    })
}

/// Overwrite the top-level fields of `target` with those of `data`.
fn merge_fields<T>(target: &mut T, data: &Value) -> Result<(), serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(fields) = data else {
        return Ok(());
    };
    let mut merged = serde_json::to_value(&*target)?;
    if let Value::Object(object) = &mut merged {
        for (key, value) in fields {
            object.insert(key.clone(), value.clone());
        }
    }
    *target = serde_json::from_value(merged)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use crate::timeline::SegmentMeasure;
    use kodemo_config::SubjectType;
    use serde_json::json;
    use std::sync::Mutex;

    fn manager() -> (KodemoStateManager, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let mut manager = KodemoStateManager::new().with_clock(clock.clone());
        manager.set_document(json!({ "title": "Test" }));
        (manager, clock)
    }

    fn record(manager: &mut KodemoStateManager) -> Arc<Mutex<Vec<StoreEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn test_set_same_document_is_noop() {
        let (mut manager, _) = manager();
        let events = record(&mut manager);
        let cycle = manager.document_cycle();

        manager.set_document(json!({ "title": "Test" }));
        assert_eq!(manager.document_cycle(), cycle);
        assert!(events.lock().unwrap().is_empty());

        manager.set_document(json!({ "title": "Other" }));
        assert_eq!(manager.document_cycle(), cycle + 1);
        let events = events.lock().unwrap();
        assert!(matches!(events[0], StoreEvent::DocumentReplaced(_)));
        assert!(matches!(&events[1], StoreEvent::DocumentChanged(change)
            if change.patches[0].path == vec!["document".to_string()]));
    }

    #[test]
    fn test_subject_added_event_follows_change() {
        let (mut manager, _) = manager();
        let events = record(&mut manager);

        let subject_id = manager
            .add_subject(Subject::new(SubjectType::Code, "a.js"), Version::new("x"))
            .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StoreEvent::DocumentChanged(_)));
        match &events[1] {
            StoreEvent::SubjectAdded { subject_id: id, version_id } => {
                assert_eq!(id, &subject_id);
                assert_eq!(manager.version_index(&subject_id), Some(&[version_id.clone()][..]));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_add_version_after_and_merge() {
        let (mut manager, _) = manager();
        let subject_id = manager
            .add_subject(Subject::new(SubjectType::Code, "a.js"), Version::new("one"))
            .unwrap();
        let first = manager.version_index(&subject_id).unwrap()[0].clone();

        let second = manager.add_subject_version(&subject_id, None, None).unwrap();
        let middle = manager
            .add_subject_version(&subject_id, Some(&first), Some(&json!({ "value": "mid" })))
            .unwrap();

        assert_eq!(
            manager.version_index(&subject_id).unwrap(),
            &[first.clone(), middle.clone(), second.clone()]
        );
        assert_eq!(manager.version(&subject_id, &second).unwrap().value, "one");
        assert_eq!(manager.version(&subject_id, &middle).unwrap().value, "mid");
        assert!(manager.add_subject_version("missing", None, None).is_none());
    }

    #[test]
    fn test_operations_without_document_are_noops() {
        let mut manager = KodemoStateManager::new();
        let events = record(&mut manager);
        assert!(manager.add_subject(Subject::default(), Version::default()).is_none());
        manager.remove_subject("x");
        manager.remove_subject_version("x", "y");
        manager.update_story("story");
        assert!(events.lock().unwrap().is_empty());
        assert!(manager.document().is_none());
    }

    #[test]
    fn test_unsubscribe() {
        let (mut manager, _) = manager();
        let events = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&events);
        let id = manager.subscribe(move |_| *sink.lock().unwrap() += 1);

        manager.set_document_title("A");
        assert!(manager.unsubscribe(id));
        manager.set_document_title("B");
        assert!(!manager.unsubscribe(id));
        assert_eq!(*events.lock().unwrap(), 1);
    }

    #[test]
    fn test_undo_with_inverse_patches() {
        let (mut manager, _) = manager();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        manager.subscribe(move |event| {
            if let StoreEvent::DocumentChanged(change) = event {
                sink.lock().unwrap().push(Arc::clone(change));
            }
        });

        let before = manager.document().cloned();
        manager.add_subject(Subject::new(SubjectType::Image, "a.png"), Version::new("a.png"));
        let change = changes.lock().unwrap()[0].clone();

        manager.apply_document_patches(&change.inverse_patches).unwrap();
        assert_eq!(manager.document().cloned(), before);
    }

    #[test]
    fn test_removed_version_moves_current_effect() {
        let (mut manager, _) = manager();
        let subject_id = manager
            .add_subject(Subject::new(SubjectType::Code, "a.js"), Version::new("one"))
            .unwrap();
        let first = manager.version_index(&subject_id).unwrap()[0].clone();
        let second = manager.add_subject_version(&subject_id, None, None).unwrap();

        let effect = Effect::new().with_subject(subject_id.clone()).with_version(second.clone());
        manager.set_current_effect(Some(effect), false);
        manager.remove_subject_version(&subject_id, &second);

        assert_eq!(manager.current_effect().unwrap().version.as_deref(), Some(first.as_str()));
    }

    #[test]
    fn test_scroll_drives_active_effect_through_throttle() {
        let (mut manager, clock) = manager();
        let segments: Vec<TimelineSegment> = [("a", 100.0), ("b", 400.0)]
            .into_iter()
            .map(|(id, top)| {
                TimelineSegment::with_id(id, Effect::new().with_id(format!("effect-{id}")), move || {
                    SegmentMeasure::at(top)
                })
            })
            .collect();
        manager.register_timeline_segments(segments);
        manager.update_timeline_segment_bottoms(1000.0);
        manager.set_layout_complete(true);

        manager.set_scroll_top(500.0);
        assert!(manager.current_effect().is_none());
        manager.run_pending_tasks();
        assert_eq!(manager.current_effect().map(|e| e.id.as_str()), Some("effect-b"));
        assert_eq!(manager.active_timeline_segment_id(), Some("b"));

        manager.set_scroll_top(100.0);
        assert_eq!(manager.run_pending_tasks(), 0);
        assert_eq!(manager.next_deadline(), Some(manager.config().active_effect_interval_ms));
        clock.advance(manager.config().active_effect_interval_ms);
        manager.run_pending_tasks();
        assert_eq!(manager.current_effect().map(|e| e.id.as_str()), Some("effect-a"));
    }

    #[test]
    fn test_dimensions_are_coalesced() {
        let (mut manager, clock) = manager();
        manager.set_dimensions(Dimensions { width: 100.0, height: 100.0 });
        clock.advance(50);
        manager.set_dimensions(Dimensions { width: 800.0, height: 600.0 });
        assert_eq!(manager.dimensions(), Dimensions::default());

        clock.advance(50);
        assert_eq!(manager.run_pending_tasks(), 1);
        assert_eq!(manager.dimensions(), Dimensions { width: 800.0, height: 600.0 });
    }
}
