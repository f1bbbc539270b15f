//! Timeline segments: the scroll position ↔ effect mapping.
//!
//! Each effect marker in the story becomes a [`TimelineSegment`]. The host measures where the
//! marker sits (story-local `top`), the registry keeps segments sorted by that position and
//! derives each segment's `bottom` from the next segment's `top`. The playhead, a fixed offset
//! below the top of the visible story, then selects the active effect.

use crate::effect::Effect;
use crate::ids;
use kodemo_config::TimelineConfig;
use std::fmt;
use std::sync::Arc;

/// Result of measuring a segment's marker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SegmentMeasure {
    /// Story-local top of the marker, if it could be measured.
    pub top: Option<f64>,
}

impl SegmentMeasure {
    /// A measurement at `top`.
    pub fn at(top: f64) -> Self {
        Self { top: Some(top) }
    }
}

/// Callback measuring a segment's marker.
pub type MeasureFn = Arc<dyn Fn() -> SegmentMeasure + Send + Sync>;

/// A rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Create a rectangle.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top edge, same as `y`.
    pub fn top(&self) -> f64 {
        self.y
    }
}

/// Player size in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dimensions {
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

/// A point in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// The on-screen region of one effect.
#[derive(Clone)]
pub struct TimelineSegment {
    /// Segment id.
    pub id: String,
    /// The effect this segment selects.
    pub effect: Effect,
    /// Whether this segment's effect is the current effect.
    pub active: bool,
    /// Measures the segment's marker.
    pub measure: MeasureFn,
    /// Last measured top.
    pub top: Option<f64>,
    /// Derived bottom.
    pub bottom: Option<f64>,
}

impl fmt::Debug for TimelineSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelineSegment")
            .field("id", &self.id)
            .field("effect", &self.effect.id)
            .field("active", &self.active)
            .field("top", &self.top)
            .field("bottom", &self.bottom)
            .finish_non_exhaustive()
    }
}

impl TimelineSegment {
    /// Create a segment with a generated id.
    pub fn new<F>(effect: Effect, measure: F) -> Self
    where
        F: Fn() -> SegmentMeasure + Send + Sync + 'static,
    {
        Self::with_id(ids::generate_segment_id(), effect, measure)
    }

    /// Create a segment with a known id.
    pub fn with_id<F>(id: impl Into<String>, effect: Effect, measure: F) -> Self
    where
        F: Fn() -> SegmentMeasure + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            effect,
            active: false,
            measure: Arc::new(measure),
            top: None,
            bottom: None,
        }
    }

    /// `top` when it is a usable number.
    pub fn numeric_top(&self) -> Option<f64> {
        self.top.filter(|top| !top.is_nan())
    }

    /// `bottom` when it is a usable number.
    pub fn numeric_bottom(&self) -> Option<f64> {
        self.bottom.filter(|bottom| !bottom.is_nan())
    }

    /// Measured height, zero when unknown or negative.
    pub fn height(&self) -> f64 {
        match (self.numeric_top(), self.numeric_bottom()) {
            (Some(top), Some(bottom)) => (bottom - top).max(0.0),
            _ => 0.0,
        }
    }

    fn apply(&mut self, update: SegmentUpdate) {
        if let Some(effect) = update.effect {
            self.effect = effect;
        }
        if let Some(measure) = update.measure {
            self.measure = measure;
        }
        if let Some(bottom) = update.bottom {
            self.bottom = Some(bottom);
        }
    }
}

/// Fields to merge into an existing segment.
#[derive(Clone, Default)]
pub struct SegmentUpdate {
    /// New effect.
    pub effect: Option<Effect>,
    /// New measure callback.
    pub measure: Option<MeasureFn>,
    /// New bottom.
    pub bottom: Option<f64>,
}

impl fmt::Debug for SegmentUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentUpdate")
            .field("effect", &self.effect.as_ref().map(|effect| &effect.id))
            .field("measure", &self.measure.is_some())
            .field("bottom", &self.bottom)
            .finish()
    }
}

/// Merge `update` into the segment with the given id. Returns `false` if there is none.
pub(crate) fn update_segment(
    segments: &mut [TimelineSegment],
    id: &str,
    update: SegmentUpdate,
) -> bool {
    match segments.iter_mut().find(|segment| segment.id == id) {
        Some(segment) => {
            segment.apply(update);
            true
        }
        None => false,
    }
}

/// Re-measure every segment, then sort by `top`.
///
/// Only segments with a numeric `top` are reordered, among the positions they already occupy.
/// Segments without one keep their place. Equal tops keep their relative order.
pub fn measure_and_sort(segments: &mut [TimelineSegment]) {
    for segment in segments.iter_mut() {
        segment.top = (segment.measure)().top;
    }

    let slots: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter_map(|(idx, segment)| segment.numeric_top().map(|_| idx))
        .collect();

    let mut measured: Vec<TimelineSegment> =
        slots.iter().map(|&idx| segments[idx].clone()).collect();
    measured.sort_by(|a, b| {
        let a = a.numeric_top().unwrap_or_default();
        let b = b.numeric_top().unwrap_or_default();
        a.total_cmp(&b)
    });

    for (slot, segment) in slots.into_iter().zip(measured) {
        segments[slot] = segment;
    }
}

/// Derive bottoms: the last segment ends at `container_height`, every other segment ends
/// `spacing` above the next measured segment's top.
///
/// Returns `true` if any bottom changed.
pub fn compute_bottoms(segments: &mut [TimelineSegment], container_height: f64, spacing: f64) -> bool {
    let mut bottom = container_height;
    let mut changed = false;

    for segment in segments.iter_mut().rev() {
        if segment.bottom != Some(bottom) {
            segment.bottom = Some(bottom);
            changed = true;
        }
        if let Some(top) = segment.numeric_top() {
            bottom = top - spacing;
        }
    }

    changed
}

/// Mark the last segment showing `effect_id` as active. Returns its id.
pub fn mark_active(segments: &mut [TimelineSegment], effect_id: Option<&str>) -> Option<String> {
    let active = effect_id.and_then(|effect_id| {
        segments
            .iter()
            .rposition(|segment| segment.effect.id == effect_id)
    });
    for (idx, segment) in segments.iter_mut().enumerate() {
        segment.active = Some(idx) == active;
    }
    active.map(|idx| segments[idx].id.clone())
}

/// What the playhead asks of the current effect.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveEffectUpdate {
    /// Leave the current effect alone.
    Keep,
    /// No segment is under the playhead.
    Clear,
    /// Select this segment's effect.
    Select(Effect),
}

/// Resolve the effect under the playhead.
///
/// `position` is the scroll offset plus the playhead offset. `lead_in` is how far above the
/// first segment the playhead may sit before the effect clears.
pub fn resolve_active_effect(
    segments: &[TimelineSegment],
    position: f64,
    lead_in: f64,
    current: Option<&Effect>,
) -> ActiveEffectUpdate {
    let found = segments.iter().enumerate().find(|(_, segment)| {
        segment
            .numeric_bottom()
            .is_some_and(|bottom| position < bottom)
    });

    let Some((idx, segment)) = found else {
        return ActiveEffectUpdate::Clear;
    };
    let Some(top) = segment.numeric_top() else {
        return ActiveEffectUpdate::Keep;
    };

    if idx == 0 && position < top - lead_in {
        return ActiveEffectUpdate::Clear;
    }

    let is_current = current.is_some_and(|effect| effect.id == segment.effect.id);
    let visible = segment.numeric_bottom().is_some_and(|bottom| bottom - top > 0.0);
    if !is_current && visible {
        ActiveEffectUpdate::Select(segment.effect.clone())
    } else {
        ActiveEffectUpdate::Keep
    }
}

/// Inputs to [`playhead_offset`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayheadInput {
    /// Player height.
    pub viewport_height: f64,
    /// Top of the story element within the player.
    pub story_top: f64,
    /// Host override for the playhead offset.
    pub fixed_top: Option<f64>,
    /// Bottom of the first segment, `None` without segments.
    pub first_segment_bottom: Option<f64>,
    /// Whether any segment is registered.
    pub has_segments: bool,
    /// Current scroll offset.
    pub scroll_top: f64,
}

/// Playhead offset below the top of the story viewport.
///
/// Sits at a share of the visible story height, capped, unless fixed by the host. When the
/// first segment ends above that line the playhead moves up just enough to reach it. Returns
/// `None` while the first segment has no usable bottom yet.
pub fn playhead_offset(input: PlayheadInput, config: &TimelineConfig) -> Option<f64> {
    if input.has_segments && input.first_segment_bottom.is_none_or(f64::is_nan) {
        return None;
    }

    let mut value = ((input.viewport_height - input.story_top) * config.playhead_ratio)
        .min(config.max_playhead_offset);
    if let Some(fixed) = input.fixed_top {
        value = fixed;
    }

    if let Some(bottom) = input.first_segment_bottom {
        let first_bottom = bottom - config.playhead_size;
        if first_bottom < value {
            value += (input.scroll_top + first_bottom - value).min(0.0);
        }
    }

    Some(value)
}

/// Padding below the story so the last segment can reach the playhead.
pub fn story_padding_bottom(viewport_height: f64, playhead_top: f64, config: &TimelineConfig) -> f64 {
    (viewport_height - playhead_top - config.playhead_size).max(0.0)
}

/// Pagination direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    /// Towards the start of the story.
    Previous,
    /// Towards the end of the story.
    Next,
}

impl PageDirection {
    fn step(self) -> isize {
        match self {
            Self::Previous => -1,
            Self::Next => 1,
        }
    }
}

/// Inputs to [`pagination_target`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaginationInput {
    /// Current scroll offset.
    pub scroll_top: f64,
    /// Viewport top of the playhead.
    pub playhead_top: f64,
    /// Viewport rectangle of the story element.
    pub story: Rect,
    /// Player height.
    pub viewport_height: f64,
}

/// Scroll offset that moves the playhead to the previous or next segment.
///
/// A single step never scrolls more than `max_pagination_ratio` of the visible story height,
/// so no story text is skipped.
pub fn pagination_target(
    segments: &[TimelineSegment],
    active_segment_id: Option<&str>,
    direction: PageDirection,
    input: PaginationInput,
    config: &TimelineConfig,
) -> f64 {
    let current = active_segment_id
        .and_then(|id| segments.iter().position(|segment| segment.id == id))
        .map_or(-1, |idx| idx as isize);
    let wanted = current + direction.step();
    let last = segments.len() as isize - 1;
    let next = wanted.min(last).max(0);

    let segment_top = if wanted < 0 {
        0.0
    } else {
        segments
            .get(next as usize)
            .and_then(TimelineSegment::numeric_top)
            .unwrap_or(0.0)
    };
    let mut target = segment_top - input.playhead_top + input.story.top();

    let max_distance = (input.viewport_height - input.story.y) * config.max_pagination_ratio;
    if (target - input.scroll_top).abs() > max_distance && (next - current).abs() == 1 {
        target = input.scroll_top + max_distance * direction.step() as f64;
    }

    target
}

/// Whether there is anything to page back to.
pub fn has_previous(scroll_top: f64) -> bool {
    scroll_top > 0.0
}

/// Whether there is a segment after the active one.
pub fn has_next(segments: &[TimelineSegment], active_segment_id: Option<&str>) -> bool {
    segments.len() > 1 && segments.last().map(|s| s.id.as_str()) != active_segment_id
}
