use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { max_requests: 50, window: Duration::from_secs(60) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitStats {
    pub remaining: u32,
    pub limit: u32,
    pub resets_in: Duration,
}

/// Fixed-window counter keyed by sender identity. Every check takes the
/// lock once, so concurrent checks for one sender never double-count.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitPolicy::default())
    }
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self { policy, windows: Mutex::new(HashMap::new()) }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn allow(&self, sender_id: &str) -> bool {
        self.allow_at(sender_id, Instant::now())
    }

    pub fn allow_at(&self, sender_id: &str, now: Instant) -> bool {
        let mut windows = self.windows();
        match windows.get_mut(sender_id) {
            Some(window) if now < window.reset_at => {
                window.count = window.count.saturating_add(1);
                window.count <= self.policy.max_requests
            }
            _ => {
                windows.insert(
                    sender_id.to_owned(),
                    Window { count: 1, reset_at: now + self.policy.window },
                );
                true
            }
        }
    }

    pub fn remaining(&self, sender_id: &str) -> u32 {
        self.remaining_at(sender_id, Instant::now())
    }

    pub fn remaining_at(&self, sender_id: &str, now: Instant) -> u32 {
        match self.windows().get(sender_id) {
            Some(window) if now < window.reset_at => {
                self.policy.max_requests.saturating_sub(window.count)
            }
            _ => self.policy.max_requests,
        }
    }

    pub fn stats_at(&self, sender_id: &str, now: Instant) -> RateLimitStats {
        let resets_in = match self.windows().get(sender_id) {
            Some(window) if now < window.reset_at => window.reset_at - now,
            _ => self.policy.window,
        };
        RateLimitStats {
            remaining: self.remaining_at(sender_id, now),
            limit: self.policy.max_requests,
            resets_in,
        }
    }

    pub fn reset(&self, sender_id: &str) {
        self.windows().remove(sender_id);
    }

    pub fn reset_all(&self) {
        self.windows().clear();
    }

    /// Drops windows that already expired. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows();
        let before = windows.len();
        windows.retain(|_, window| now < window.reset_at);
        before - windows.len()
    }

    pub fn tracked_senders(&self) -> usize {
        self.windows().len()
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
