use serde::{Deserialize, Serialize};

/// Timeline geometry and scheduling intervals.
///
/// Lengths are in story pixels, durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimelineConfig {
    /// Height of the playhead marker. Also used as the lead-in above the first segment.
    pub playhead_size: f64,
    /// Vertical gap kept between the bottom of a segment and the top of the next one.
    pub segment_spacing: f64,
    /// Share of the visible story height the playhead sits below the viewport top.
    pub playhead_ratio: f64,
    /// Upper bound for the automatic playhead offset.
    pub max_playhead_offset: f64,
    /// Minimum interval between two scroll-driven active effect recomputations.
    pub active_effect_interval_ms: u64,
    /// Interval used to coalesce bursts of dimension updates.
    pub resize_interval_ms: u64,
    /// Delay before a hovered effect is previewed.
    pub preview_delay_ms: u64,
    /// Delay before a preview is rolled back when the pointer leaves a timeline segment.
    pub clear_preview_delay_ms: u64,
    /// Largest share of the visible story height one pagination step may scroll.
    pub max_pagination_ratio: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            playhead_size: 18.0,
            segment_spacing: 20.0,
            playhead_ratio: 0.1,
            max_playhead_offset: 75.0,
            active_effect_interval_ms: 100,
            resize_interval_ms: 100,
            preview_delay_ms: 50,
            clear_preview_delay_ms: 100,
            max_pagination_ratio: 0.65,
        }
    }
}
