// ABOUTME: Per-identity sliding-window rate limiter gating every authenticated request
// ABOUTME: Non-blocking admit/deny with the time until the window frees a slot

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Outcome of a rate-limit check. A denial carries how long the caller must
/// wait before the oldest admitted request leaves the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Granted,
    Denied { retry_after: Duration },
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    // Sharded map: independent identities never contend, while mutation of
    // one identity's window is serialized by its entry guard.
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Check and record one request from `identity`. Never blocks; a denied
    /// request is not recorded.
    pub fn admit(&self, identity: &str) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        let mut stamps = self.windows.entry(identity.to_string()).or_default();

        // Prune everything older than the trailing window. checked_sub guards
        // early process lifetime where now < window.
        if let Some(cutoff) = now.checked_sub(self.window) {
            while stamps.front().is_some_and(|&t| t < cutoff) {
                stamps.pop_front();
            }
        }

        if stamps.len() >= self.max_requests {
            let retry_after = match stamps.front() {
                Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                None => Duration::ZERO,
            };
            return Admission::Denied { retry_after };
        }

        stamps.push_back(now);
        Admission::Granted
    }

    /// Admissions still available to `identity` right now.
    pub fn remaining(&self, identity: &str) -> usize {
        let now = Instant::now();
        match self.windows.get(identity) {
            Some(stamps) => {
                let cutoff = now.checked_sub(self.window);
                let live = stamps
                    .iter()
                    .filter(|&&t| cutoff.is_none_or(|c| t >= c))
                    .count();
                self.max_requests.saturating_sub(live)
            }
            None => self.max_requests,
        }
    }
}
