//! Sliding-window rate limiter shared by every search in the process.
//!
//! [`RateLimiter`] keeps a FIFO of call timestamps. Each check evicts entries
//! older than the window and admits the call if fewer than `quota` remain.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Fixed quota per rolling time window.
#[derive(Debug)]
pub struct RateLimiter {
    quota: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A limiter admitting `quota` calls per `window`. A zero quota is raised
    /// to one, since nothing would ever be admitted.
    pub fn new(quota: usize, window: Duration) -> Self {
        let quota = quota.max(1);
        RateLimiter {
            quota,
            window,
            calls: Mutex::new(VecDeque::with_capacity(quota)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.quota, config.window())
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Records a call if the quota allows it. Returns whether the call was
    /// admitted and the number of calls now in the window.
    pub fn try_acquire(&self) -> (bool, usize) {
        self.try_acquire_at(Instant::now())
    }

    /// [`RateLimiter::try_acquire`] against an explicit clock reading.
    pub fn try_acquire_at(&self, now: Instant) -> (bool, usize) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict(&mut calls, now);
        if calls.len() < self.quota {
            calls.push_back(now);
            (true, calls.len())
        } else {
            (false, calls.len())
        }
    }

    /// Waits until a call is admitted. Returns the window count after
    /// admission.
    pub async fn acquire(&self) -> usize {
        loop {
            let now = Instant::now();
            let (allowed, count) = self.try_acquire_at(now);
            if allowed {
                return count;
            }
            let wait = self.time_until_slot(now);
            debug!(count, wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls currently counted against the quota.
    pub fn window_count(&self) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.evict(&mut calls, Instant::now());
        calls.len()
    }

    fn evict(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = calls.front() {
            if now.duration_since(oldest) > self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until the oldest call leaves the window.
    fn time_until_slot(&self, now: Instant) -> Duration {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        match calls.front() {
            Some(&oldest) => {
                let expires = oldest + self.window + Duration::from_millis(1);
                expires.saturating_duration_since(now)
            }
            None => Duration::ZERO,
        }
    }
}
