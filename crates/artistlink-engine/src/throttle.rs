//! Rate-limited, retrying execution of upstream calls.
//!
//! [`Throttle::run`] admits each attempt through the shared [`RateLimiter`],
//! retries `RateLimited` responses with bounded exponential backoff, and
//! trips a circuit breaker after too many consecutive throttles across all
//! callers. A server-supplied retry-after is always waited out in full; one
//! longer than the policy allows fails the request instead.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::UpstreamError;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    state: BreakerState,
    consecutive: u32,
    opened_at: Option<Instant>,
}

/// Shared gate in front of the external source.
#[derive(Debug)]
pub struct Throttle {
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    breaker: Mutex<Breaker>,
}

impl Throttle {
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Throttle {
            limiter,
            policy,
            breaker: Mutex::new(Breaker {
                state: BreakerState::Closed,
                consecutive: 0,
                opened_at: None,
            }),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    /// Runs `call` until it succeeds, fails with a non-throttle error, or the
    /// retry policy gives up.
    pub async fn run<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.check_breaker()?;
            let window = self.limiter.acquire().await;

            match call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(op, attempt, "upstream call succeeded after throttling");
                    }
                    self.record_success();
                    return Ok(value);
                }
                Err(UpstreamError::RateLimited { retry_after }) => {
                    attempt += 1;
                    self.record_throttle()?;
                    let overlong = retry_after.filter(|w| !self.policy.honors_retry_after(*w));
                    if let Some(wait) = overlong {
                        warn!(op, wait_secs = wait.as_secs(), "upstream asked for an overlong wait");
                        return Err(UpstreamError::Unavailable {
                            status: 429,
                            message: format!("{} throttled for {}s", op, wait.as_secs()),
                        });
                    }
                    if attempt >= self.policy.max_attempts {
                        return Err(UpstreamError::Unavailable {
                            status: 429,
                            message: format!("{} still throttled after {} attempts", op, attempt),
                        });
                    }
                    let delay = self.policy.delay_for_attempt(attempt - 1, retry_after);
                    warn!(
                        op,
                        attempt,
                        window,
                        delay_ms = delay.as_millis() as u64,
                        "upstream throttled, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn check_breaker(&self) -> Result<(), UpstreamError> {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        if breaker.state != BreakerState::Open {
            return Ok(());
        }
        let cooled = breaker
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.policy.breaker_cooldown());
        if cooled {
            debug!("circuit half-open, allowing a trial call");
            breaker.state = BreakerState::HalfOpen;
            Ok(())
        } else {
            Err(UpstreamError::CircuitOpen {
                consecutive: breaker.consecutive,
            })
        }
    }

    fn record_success(&self) {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        breaker.state = BreakerState::Closed;
        breaker.consecutive = 0;
        breaker.opened_at = None;
    }

    fn record_throttle(&self) -> Result<(), UpstreamError> {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        breaker.consecutive += 1;
        let tripped = breaker.state == BreakerState::HalfOpen
            || breaker.consecutive >= self.policy.breaker_threshold;
        if tripped {
            warn!(consecutive = breaker.consecutive, "circuit breaker opened");
            breaker.state = BreakerState::Open;
            breaker.opened_at = Some(Instant::now());
            return Err(UpstreamError::CircuitOpen {
                consecutive: breaker.consecutive,
            });
        }
        Ok(())
    }
}
