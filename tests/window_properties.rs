//! Property tests for the sliding-window counter.

use std::time::{Duration, Instant};

use proptest::prelude::*;
use turnstile::ratelimit::{LimiterPolicy, WindowKey, WindowStore};

const TOLERANCE: f64 = 1e-6;

/// Replays admitted request times for one key and recomputes the weighted
/// estimate from window boundaries aligned to the first request.
struct Replay {
    window_ms: u64,
    origin: Option<u64>,
    admitted: Vec<u64>,
}

impl Replay {
    fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            origin: None,
            admitted: Vec::new(),
        }
    }

    fn window_start(&self, at: u64) -> u64 {
        let origin = self.origin.unwrap_or(at);
        origin + (at - origin) / self.window_ms * self.window_ms
    }

    fn admitted_in(&self, from: u64, to: u64) -> u64 {
        self.admitted.iter().filter(|t| **t >= from && **t < to).count() as u64
    }

    fn estimate(&self, at: u64) -> f64 {
        let start = self.window_start(at);
        let current = self.admitted_in(start, at + 1);
        let previous = if start >= self.window_ms {
            self.admitted_in(start - self.window_ms, start)
        } else {
            0
        };
        let progress = (at - start) as f64 / self.window_ms as f64;
        current as f64 + previous as f64 * (1.0 - progress)
    }

    fn record(&mut self, at: u64, allowed: bool) {
        self.origin.get_or_insert(at);
        if allowed {
            self.admitted.push(at);
        }
    }
}

proptest! {
    #[test]
    fn test_decisions_follow_weighted_estimate(
        max_requests in 1u64..20,
        window_ms in 100u64..5_000,
        mut ticks in prop::collection::vec(0u64..6_000, 1..300),
    ) {
        ticks.sort_unstable();

        let policy = LimiterPolicy::new("search", Duration::from_millis(window_ms), max_requests).unwrap();
        let store = WindowStore::default();
        let key = WindowKey::new("search", "client");
        let start = Instant::now();
        let mut replay = Replay::new(window_ms);

        // Ticks are thousandths of a window, so requests span about six windows.
        for tick in ticks {
            let at = tick * window_ms / 1_000;
            let expected = replay.estimate(at);
            let decision = store.increment_and_check(&key, &policy, start + Duration::from_millis(at));

            prop_assert!(
                (decision.effective - expected).abs() < TOLERANCE,
                "estimate at {}ms: store {} vs replay {}", at, decision.effective, expected
            );
            if (expected - max_requests as f64).abs() > TOLERANCE {
                prop_assert_eq!(decision.allowed, expected < max_requests as f64);
            }
            prop_assert!(decision.retry_after <= policy.window());
            prop_assert!(decision.state.current_count <= max_requests);

            replay.record(at, decision.allowed);
        }

        // Near a boundary the previous window only counts for the part of it
        // still inside the rolling window.
        let edge = window_ms / 10;
        let bound = max_requests as f64 + 1.0 + max_requests as f64 * edge as f64 / window_ms as f64;
        let last = replay.admitted.last().copied().unwrap_or(0);
        let mut boundary = replay.origin.unwrap_or(0) + window_ms;
        while boundary <= last + edge {
            let near = replay.admitted_in(boundary - edge, boundary + edge + 1);
            prop_assert!(
                (near as f64) < bound + TOLERANCE,
                "{} admits within {}ms of the boundary at {}ms", near, edge, boundary
            );
            boundary += window_ms;
        }
    }

    #[test]
    fn test_boundary_burst_is_not_doubled(
        max_requests in 2u64..20,
        window_ms in 1_000u64..10_000,
        before in 1u64..50,
        after in 1u64..50,
    ) {
        let policy = LimiterPolicy::new("search", Duration::from_millis(window_ms), max_requests).unwrap();
        let store = WindowStore::default();
        let key = WindowKey::new("search", "client");
        let start = Instant::now();

        let mut admitted = 0u64;
        let mut send = |at_ms: u64, count: u64| {
            for _ in 0..count {
                let now = start + Duration::from_millis(at_ms);
                if store.increment_and_check(&key, &policy, now).allowed {
                    admitted += 1;
                }
            }
        };

        // Spend the first window's quota just before it closes, then hammer
        // just after the boundary.
        send(0, 1);
        send(window_ms - before, 3 * max_requests);
        send(window_ms + after, 3 * max_requests);

        // A fixed window would admit 2 * max_requests here.
        let progress = after as f64 / window_ms as f64;
        let bound = max_requests as f64 + 1.0 + max_requests as f64 * progress;
        prop_assert!((admitted as f64) < bound + TOLERANCE);
        prop_assert!(admitted < 2 * max_requests);
    }

    #[test]
    fn test_idle_gap_restores_full_quota(
        max_requests in 1u64..20,
        window_secs in 1u64..120,
        extra_gap in 1u64..10_000,
    ) {
        let policy = LimiterPolicy::new("search", Duration::from_secs(window_secs), max_requests).unwrap();
        let store = WindowStore::default();
        let key = WindowKey::new("search", "client");
        let start = Instant::now();

        for _ in 0..max_requests + 3 {
            store.increment_and_check(&key, &policy, start);
        }

        // Two full windows later nothing of the old usage remains.
        let later = start + Duration::from_secs(2 * window_secs) + Duration::from_millis(extra_gap);
        for i in 0..max_requests {
            let decision = store.increment_and_check(&key, &policy, later);
            prop_assert!(decision.allowed, "request {} after idle gap should be admitted", i + 1);
        }
        prop_assert!(!store.increment_and_check(&key, &policy, later).allowed);
    }
}
