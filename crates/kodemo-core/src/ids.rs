//! Identifier generation.
//!
//! Subject and version ids are 128-bit xxh3 digests of a counter and a timestamp. They are
//! practically unique, not unpredictable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh3::Xxh3;

static EFFECT_COUNT: AtomicU64 = AtomicU64::new(1);
static SEGMENT_COUNT: AtomicU64 = AtomicU64::new(1);

fn digest_hex(seed: &str) -> String {
    let mut hasher = Xxh3::new();
    hasher.update(seed.as_bytes());
    format!("{:032x}", hasher.digest128())
}

/// Id for a new subject, from the current subject count and time.
pub fn generate_subject_id(subject_count: usize, now_ms: i64) -> String {
    digest_hex(&format!("{subject_count}-{now_ms}"))
}

/// Id for a new version of `subject_id`, from the current version count and time.
pub fn generate_version_id(subject_id: &str, version_count: usize, now_ms: i64) -> String {
    digest_hex(&format!("{subject_id}-{version_count}-{now_ms}"))
}

/// `effect-<millis>-<counter>`.
pub fn generate_effect_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    let count = EFFECT_COUNT.fetch_add(1, Ordering::Relaxed);
    format!("effect-{millis}-{count}")
}

/// `segment-<counter>`.
pub fn generate_segment_id() -> String {
    format!("segment-{}", SEGMENT_COUNT.fetch_add(1, Ordering::Relaxed))
}

/// Re-hash `id` until `taken` no longer reports a collision.
///
/// Two subjects added in the same millisecond at the same count would otherwise share an id.
pub(crate) fn unique_id(mut id: String, taken: impl Fn(&str) -> bool) -> String {
    let mut attempt = 1u32;
    while taken(&id) {
        id = digest_hex(&format!("{id}-{attempt}"));
        attempt += 1;
    }
    id
}
