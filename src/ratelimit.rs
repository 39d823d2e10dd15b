//! Sliding-window admission control for job creation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    pub retry_after_seconds: u64,
}

/// Occupancy snapshot for the stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub limit: usize,
    pub window_seconds: u64,
    pub active_clients: usize,
    pub tracked_requests: usize,
}

/// Per-client sliding window over request timestamps.
///
/// Identity derivation is the caller's concern; the limiter only sees opaque
/// client ids. Windows are purged lazily on each check and periodically by
/// the janitor so a long-running process with many transient clients stays
/// bounded.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    limit: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(enabled: bool, limit: usize, window: Duration) -> Self {
        Self {
            enabled,
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or deny one request for `client_id`.
    ///
    /// On denial `retry_after_seconds` is the time until the oldest request
    /// in the window expires, rounded up so a client that waits exactly that
    /// long is admitted.
    #[must_use]
    pub fn allow(&self, client_id: &str) -> RateDecision {
        self.allow_at(client_id, Instant::now())
    }

    pub(crate) fn allow_at(&self, client_id: &str, now: Instant) -> RateDecision {
        if !self.enabled {
            return RateDecision {
                allowed: true,
                limit: self.limit,
                remaining: self.limit,
                retry_after_seconds: 0,
            };
        }

        let mut clients = self.lock();
        let window = clients.entry(client_id.to_string()).or_default();

        Self::purge(window, now, self.window);

        if window.len() >= self.limit {
            let retry_after_seconds = window.front().map_or(1, |oldest| {
                let elapsed = now.saturating_duration_since(*oldest);
                self.window.saturating_sub(elapsed).as_secs() + 1
            });
            debug!(client_id, limit = self.limit, "rate limit exceeded");
            return RateDecision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                retry_after_seconds,
            };
        }

        window.push_back(now);
        RateDecision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - window.len(),
            retry_after_seconds: 0,
        }
    }

    /// Drop clients whose windows are empty after purging. Returns how many
    /// client entries were removed.
    pub fn evict(&self) -> usize {
        self.evict_at(Instant::now())
    }

    pub(crate) fn evict_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, window| {
            Self::purge(window, now, self.window);
            !window.is_empty()
        });
        before - clients.len()
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let clients = self.lock();
        RateLimiterStats {
            enabled: self.enabled,
            limit: self.limit,
            window_seconds: self.window.as_secs(),
            active_clients: clients.len(),
            tracked_requests: clients.values().map(VecDeque::len).sum(),
        }
    }

    fn purge(window: &mut VecDeque<Instant>, now: Instant, size: Duration) {
        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) > size {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter(limit: usize) -> RateLimiter {
        RateLimiter::new(true, limit, WINDOW)
    }

    #[test]
    fn admits_up_to_limit_with_decreasing_remaining() {
        let limiter = limiter(3);
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.allow_at("client-a", now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.retry_after_seconds, 0);
        }

        let denied = limiter.allow_at("client-a", now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_seconds > 0);
    }

    #[test]
    fn window_expiry_re_admits() {
        let limiter = limiter(3);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.allow_at("client-a", start).allowed);
        }
        assert!(!limiter.allow_at("client-a", start).allowed);

        let later = start + WINDOW + Duration::from_secs(1);
        let decision = limiter.allow_at("client-a", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn retry_after_tracks_oldest_request() {
        let limiter = limiter(1);
        let start = Instant::now();

        assert!(limiter.allow_at("client-a", start).allowed);

        let denied = limiter.allow_at("client-a", start + Duration::from_secs(20));
        assert!(!denied.allowed);
        // 40 seconds left in the window, rounded up.
        assert_eq!(denied.retry_after_seconds, 41);
    }

    #[test]
    fn clients_are_tracked_independently() {
        let limiter = limiter(1);
        let now = Instant::now();

        assert!(limiter.allow_at("client-a", now).allowed);
        assert!(limiter.allow_at("client-b", now).allowed);
        assert!(!limiter.allow_at("client-a", now).allowed);
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let limiter = RateLimiter::new(false, 3, WINDOW);
        let now = Instant::now();

        for _ in 0..10 {
            let decision = limiter.allow_at("client-a", now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 3);
        }
        assert_eq!(limiter.stats().active_clients, 0);
    }

    #[test]
    fn evict_drops_clients_with_expired_windows() {
        let limiter = limiter(3);
        let start = Instant::now();

        assert!(limiter.allow_at("stale", start).allowed);
        assert!(
            limiter
                .allow_at("fresh", start + Duration::from_secs(50))
                .allowed
        );
        assert_eq!(limiter.stats().active_clients, 2);

        let evicted = limiter.evict_at(start + Duration::from_secs(70));

        assert_eq!(evicted, 1);
        let stats = limiter.stats();
        assert_eq!(stats.active_clients, 1);
        assert_eq!(stats.tracked_requests, 1);
    }

    #[test]
    fn empty_window_after_purge_counts_as_zero_requests() {
        let limiter = limiter(2);
        let start = Instant::now();

        assert!(limiter.allow_at("client-a", start).allowed);
        assert!(limiter.allow_at("client-a", start).allowed);

        // Far past the window; both stored timestamps purge on read.
        let decision = limiter.allow_at("client-a", start + WINDOW * 3);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }
}
