//! Time sources and deferred work.
//!
//! The store never spawns timers. Deferred work is recorded with a deadline and executed when
//! the host calls `KodemoStateManager::run_pending_tasks`. Time comes from a [`Clock`], so
//! tests can drive it with a [`ManualClock`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of time for the store.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds, used for scheduling.
    fn now_ms(&self) -> u64;

    /// Wall-clock epoch milliseconds, used for timestamps and id seeds.
    fn epoch_ms(&self) -> i64;
}

/// The system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose monotonic time starts now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn epoch_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            })
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    epoch_base: i64,
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at monotonic time 0, reporting `epoch_base` as wall-clock time.
    pub fn new(epoch_base: i64) -> Self {
        Self {
            epoch_base,
            now: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute monotonic time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn epoch_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.now_ms()).unwrap_or(i64::MAX);
        self.epoch_base.saturating_add(elapsed)
    }
}

/// A single cancellable delayed task. Scheduling replaces whatever was pending.
pub struct Scheduler<T> {
    pending: Option<(u64, T)>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T: fmt::Debug> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending)
            .finish()
    }
}

impl<T> Scheduler<T> {
    /// Run `task` at `deadline`, superseding any pending task.
    pub fn schedule(&mut self, task: T, deadline: u64) {
        self.pending = Some((deadline, task));
    }

    /// Drop the pending task, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Whether a task is waiting.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Deadline of the pending task.
    pub fn deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    /// Take the pending task if its deadline has passed.
    pub fn take_due(&mut self, now: u64) -> Option<T> {
        match self.pending {
            Some((deadline, _)) if deadline <= now => self.pending.take().map(|(_, task)| task),
            _ => None,
        }
    }
}

/// Runs a piece of work at most once per interval, after it has been requested.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: u64,
    requested: bool,
    last_run: Option<u64>,
}

impl Throttle {
    /// Create a throttle with the given interval.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            requested: false,
            last_run: None,
        }
    }

    /// Ask for the work to run.
    pub fn request(&mut self) {
        self.requested = true;
    }

    /// Whether a request is waiting.
    pub fn is_requested(&self) -> bool {
        self.requested
    }

    /// Whether the work should run now. Calling this with a `true` result counts as a run.
    pub fn poll(&mut self, now: u64) -> bool {
        let ready = self
            .last_run
            .is_none_or(|last| now.saturating_sub(last) >= self.interval_ms);
        if self.requested && ready {
            self.requested = false;
            self.last_run = Some(now);
            true
        } else {
            false
        }
    }

    /// Earliest time at which a pending request may run.
    pub fn ready_at(&self) -> Option<u64> {
        if !self.requested {
            return None;
        }
        Some(
            self.last_run
                .map_or(0, |last| last.saturating_add(self.interval_ms)),
        )
    }

    /// Forget pending requests and the last run.
    pub fn reset(&mut self) {
        self.requested = false;
        self.last_run = None;
    }
}

/// Collapses a burst of values into the latest one, delivered once the burst's window closes.
#[derive(Debug, Clone)]
pub struct Coalescer<T> {
    interval_ms: u64,
    pending: Option<(u64, T)>,
}

impl<T> Coalescer<T> {
    /// Create a coalescer with the given window.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            pending: None,
        }
    }

    /// Record a value. The window opens with the first value of a burst.
    pub fn push(&mut self, value: T, now: u64) {
        let deadline = match &self.pending {
            Some((deadline, _)) => *deadline,
            None => now.saturating_add(self.interval_ms),
        };
        self.pending = Some((deadline, value));
    }

    /// Take the latest value if the window has closed.
    pub fn take_due(&mut self, now: u64) -> Option<T> {
        match self.pending {
            Some((deadline, _)) if deadline <= now => self.pending.take().map(|(_, value)| value),
            _ => None,
        }
    }

    /// Take the latest value regardless of the window.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }

    /// Whether a value is waiting.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the current window closes.
    pub fn deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }
}
