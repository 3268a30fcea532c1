//! In-memory window store.

use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::key::WindowKey;
use super::policy::LimiterPolicy;
use super::window::WindowState;
use crate::config::LimiterConfig;

/// Default cap on the number of tracked keys.
pub const DEFAULT_MAX_KEYS: usize = 10_000;
/// Default idle grace, in window lengths, before a state is evicted.
pub const DEFAULT_IDLE_WINDOWS: u32 = 2;
/// Longest accepted background sweep interval.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(86_400);
/// Minimum spacing between sweeps triggered by a full store.
const LAZY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a single `increment_and_check` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowDecision {
    /// Whether the request was admitted (and counted)
    pub allowed: bool,
    /// Weighted estimate observed before this request was counted
    pub effective: f64,
    /// State after the decision was applied
    pub state: WindowState,
    /// Time until the current window closes; zero when admitted
    pub retry_after: Duration,
}

impl WindowDecision {
    /// Requests left in the rolling window after this one.
    pub fn remaining(&self, max_requests: u64) -> u64 {
        if !self.allowed {
            return 0;
        }
        let used = (self.effective + 1.0).ceil() as u64;
        max_requests.saturating_sub(used)
    }
}

/// Read-only handle on one key's state.
///
/// The handle holds the key's shard lock, so it must be dropped before any
/// other store operation is issued from the same thread.
pub struct WindowHandle<'a> {
    entry: RefMut<'a, WindowKey, WindowState>,
}

impl WindowHandle<'_> {
    /// The key this handle refers to.
    pub fn key(&self) -> &WindowKey {
        self.entry.key()
    }
}

impl Deref for WindowHandle<'_> {
    type Target = WindowState;

    fn deref(&self) -> &WindowState {
        self.entry.value()
    }
}

/// Concurrency-safe `(policy, identifier) -> WindowState` container.
///
/// Updates to one key are serialized by the lock of the shard that holds it;
/// keys in other shards proceed in parallel. The store is the only owner of
/// window state: callers see copies or a scoped [`WindowHandle`].
pub struct WindowStore {
    /// Window states indexed by key
    entries: DashMap<WindowKey, WindowState>,
    /// Soft cap on tracked keys
    max_keys: usize,
    /// Idle grace in window lengths
    idle_windows: u32,
    /// When the last sweep finished
    last_sweep: Mutex<Instant>,
}

impl WindowStore {
    /// Create a store tracking at most `max_keys` keys.
    pub fn new(max_keys: usize, idle_windows: u32) -> Self {
        Self {
            entries: DashMap::new(),
            max_keys,
            idle_windows,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Create a store sized from limiter configuration.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(config.max_keys, config.idle_windows)
    }

    /// Get the state for `key`, creating a fresh one if it does not exist.
    ///
    /// A new key never waits for room: when the store is full, idle states are
    /// swept and, failing that, the least recently seen state is evicted.
    pub fn get_or_create(&self, key: &WindowKey, window: Duration, now: Instant) -> WindowHandle<'_> {
        if let Some(entry) = self.entries.get_mut(key) {
            return WindowHandle { entry };
        }

        self.make_room(now);

        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            debug!(
                key = %key,
                window = ?window,
                "Creating new window state"
            );
            WindowState::new(window, now)
        });

        WindowHandle { entry }
    }

    /// Roll the key's window forward, decide admission and count the request
    /// if admitted, all under the key's lock.
    pub fn increment_and_check(&self, key: &WindowKey, policy: &LimiterPolicy, now: Instant) -> WindowDecision {
        let mut handle = self.get_or_create(key, policy.window(), now);
        let state = handle.entry.value_mut();

        state.window = policy.window();
        state.roll(now);
        state.last_seen = now;

        let effective = state.weighted_count(now);
        let allowed = effective < policy.max_requests() as f64;
        if allowed {
            state.current_count += 1;
        }

        trace!(
            key = %key,
            effective = effective,
            current = state.current_count,
            previous = state.previous_count,
            allowed = allowed,
            "Window updated"
        );

        WindowDecision {
            allowed,
            effective,
            state: *state,
            retry_after: if allowed {
                Duration::ZERO
            } else {
                state.until_window_end(now)
            },
        }
    }

    /// Copy of the current state for `key`, if tracked.
    pub fn snapshot(&self, key: &WindowKey) -> Option<WindowState> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Remove every state idle for longer than the grace period.
    ///
    /// Returns the number of evicted keys.
    pub fn sweep(&self, now: Instant) -> usize {
        let idle_windows = self.idle_windows;
        let mut evicted = 0;

        self.entries.retain(|key, state| {
            if state.is_idle(now, idle_windows) {
                trace!(key = %key, "Evicting idle window state");
                evicted += 1;
                false
            } else {
                true
            }
        });

        *self.last_sweep.lock() = now;
        evicted
    }

    /// Spawn a task sweeping the store every `interval`.
    ///
    /// The task holds only a weak reference and exits once the store is dropped.
    /// `interval` is clamped to `1ms..=MAX_SWEEP_INTERVAL`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        let interval = interval.clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(store) = store.upgrade() else {
                    debug!("Window store dropped, stopping sweeper");
                    break;
                };

                let evicted = store.sweep(Instant::now());
                if evicted > 0 {
                    debug!(
                        evicted = evicted,
                        remaining = store.len(),
                        "Swept idle window states"
                    );
                }
            }
        })
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all state.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Configured key cap.
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    fn make_room(&self, now: Instant) {
        if self.entries.len() < self.max_keys {
            return;
        }

        let sweep_due = now.saturating_duration_since(*self.last_sweep.lock()) >= LAZY_SWEEP_INTERVAL;
        if sweep_due {
            let evicted = self.sweep(now);
            debug!(evicted = evicted, "Store full, swept idle window states");
        }

        while self.entries.len() >= self.max_keys {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_seen)
                .map(|entry| entry.key().clone());

            let Some(oldest) = oldest else {
                break;
            };
            trace!(
                key = %oldest,
                capacity = self.max_keys,
                "Store full, evicting least recently seen window state"
            );
            self.entries.remove(&oldest);
        }
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYS, DEFAULT_IDLE_WINDOWS)
    }
}
