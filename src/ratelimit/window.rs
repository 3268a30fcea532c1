//! Sliding-window counter state.

use std::time::{Duration, Instant};

/// Per-key counting state for the sliding-window counter algorithm.
///
/// Two adjacent fixed windows are kept: the one in progress and the one just
/// before it. The previous window's count is weighted by how much of it still
/// overlaps a rolling window ending now, which bounds bursts at window edges
/// without storing individual timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests counted in the current window
    pub current_count: u64,
    /// Requests counted in the window immediately before the current one
    pub previous_count: u64,
    /// When the current window started
    pub window_start: Instant,
    /// Last time any request touched this state
    pub last_seen: Instant,
    /// Window length of the policy that owns this state
    pub window: Duration,
}

impl WindowState {
    /// Fresh state with no usage, starting its first window at `now`.
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            current_count: 0,
            previous_count: 0,
            window_start: now,
            last_seen: now,
            window,
        }
    }

    /// Time elapsed since the current window started.
    ///
    /// Instants earlier than `window_start` count as zero elapsed.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.window_start)
    }

    /// Advance to the window containing `now`.
    ///
    /// If exactly one window boundary was crossed the current count becomes
    /// the previous count. If two or more were crossed the state is stale and
    /// both counts start over. `window_start` stays aligned to multiples of
    /// the window length from the first window's start.
    pub(crate) fn roll(&mut self, now: Instant) {
        let elapsed = self.elapsed(now);
        if elapsed < self.window {
            return;
        }

        self.previous_count = if elapsed < self.window.saturating_mul(2) {
            self.current_count
        } else {
            0
        };
        self.current_count = 0;

        // start + window * floor(elapsed / window) == now - (elapsed mod window)
        let into_window = elapsed.as_nanos() % self.window.as_nanos();
        self.window_start = now - Duration::from_nanos(into_window as u64);
    }

    /// Weighted request estimate over the rolling window ending at `now`.
    ///
    /// Assumes `roll` has already been applied for `now`.
    pub fn weighted_count(&self, now: Instant) -> f64 {
        let progress = self.elapsed(now).as_secs_f64() / self.window.as_secs_f64();
        let overlap = (1.0 - progress).clamp(0.0, 1.0);
        self.current_count as f64 + self.previous_count as f64 * overlap
    }

    /// Time until the current window closes.
    pub fn until_window_end(&self, now: Instant) -> Duration {
        self.window.saturating_sub(self.elapsed(now))
    }

    /// Whether nothing has touched this state for more than `windows` window lengths.
    pub fn is_idle(&self, now: Instant, windows: u32) -> bool {
        let grace = self.window.checked_mul(windows).unwrap_or(Duration::MAX);
        now.saturating_duration_since(self.last_seen) > grace
    }
}
