//! Engine configuration.
//!
//! Defaults match the external provider's documented limits. Every field can
//! be overridden from `ARTISTLINK_*` environment variables via
//! [`EngineConfig::from_env`]:
//! - `ARTISTLINK_RATE_QUOTA`: calls allowed per window (default 90)
//! - `ARTISTLINK_RATE_WINDOW_SECS`: rolling window length (default 30)
//! - `ARTISTLINK_RETRY_MAX_ATTEMPTS`: attempts per throttled request (default 5)
//! - `ARTISTLINK_MAX_RETRY_AFTER_SECS`: longest server-requested wait honored (default 300)
//! - `ARTISTLINK_BREAKER_THRESHOLD`: consecutive throttles before the circuit opens (default 10)
//! - `ARTISTLINK_CACHE_MAX_AGE_SECS`: cache age bound, `none` disables it (default 7 days)
//! - `ARTISTLINK_DETAIL_BATCH_SIZE`: ids per detail request (default 50)
//! - `ARTISTLINK_UPGRADE_STUBS`: fetch collaborator details on resolve (default true)
//! - `ARTISTLINK_NOTIFICATION_BUFFER`: queued events per session (default 256)
//! - `ARTISTLINK_RESULT_GRACE_SECS`: how long finished results are kept (default 60)

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RouteError;

const SEVEN_DAYS_SECS: u64 = 7 * 24 * 60 * 60;

/// Sliding-window quota shared by every search in the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub quota: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            quota: 90,
            window_secs: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Bounded exponential backoff for throttled requests, plus the circuit
/// breaker that stops a search after repeated throttling.
///
/// `breaker_threshold` counts throttles across all callers, so it is kept
/// above `max_attempts`: one request gives up before it can open the circuit
/// on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// A server asking for a longer wait than this fails the request
    /// instead of being retried.
    pub max_retry_after_secs: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_retry_after_secs: 300,
            breaker_threshold: 10,
            breaker_cooldown_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    ///
    /// The backoff is capped at `max_delay_ms`; a server-supplied
    /// `retry_after` is a floor that the cap never lowers.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let backoff_ms = backoff_ms.min(self.max_delay_ms as f64);
        let backoff = Duration::from_millis(backoff_ms as u64);
        retry_after.map_or(backoff, |floor| floor.max(backoff))
    }

    /// Whether a server-requested wait is short enough to sit out.
    pub fn honors_retry_after(&self, retry_after: Duration) -> bool {
        retry_after <= Duration::from_secs(self.max_retry_after_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

/// When a stored neighbor set may be used instead of an external fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cached neighbors are used only above this count.
    pub min_cached_neighbors: usize,
    /// Cached neighbors older than this are refetched. `None` disables the
    /// age check.
    pub max_age_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            min_cached_neighbors: 2,
            max_age_secs: Some(SEVEN_DAYS_SECS),
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub detail_batch_size: usize,
    pub upgrade_stubs: bool,
    pub notification_buffer: usize,
    pub result_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            detail_batch_size: 50,
            upgrade_stubs: true,
            notification_buffer: 256,
            result_grace_secs: 60,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `ARTISTLINK_*` variables that are set.
    pub fn from_env() -> Result<Self, RouteError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RouteError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();
        override_with(&lookup, "ARTISTLINK_RATE_QUOTA", &mut config.rate_limit.quota)?;
        override_with(&lookup, "ARTISTLINK_RATE_WINDOW_SECS", &mut config.rate_limit.window_secs)?;
        override_with(&lookup, "ARTISTLINK_RETRY_MAX_ATTEMPTS", &mut config.retry.max_attempts)?;
        override_with(&lookup, "ARTISTLINK_MAX_RETRY_AFTER_SECS", &mut config.retry.max_retry_after_secs)?;
        override_with(&lookup, "ARTISTLINK_BREAKER_THRESHOLD", &mut config.retry.breaker_threshold)?;
        override_with(&lookup, "ARTISTLINK_DETAIL_BATCH_SIZE", &mut config.detail_batch_size)?;
        override_with(&lookup, "ARTISTLINK_UPGRADE_STUBS", &mut config.upgrade_stubs)?;
        override_with(&lookup, "ARTISTLINK_NOTIFICATION_BUFFER", &mut config.notification_buffer)?;
        override_with(&lookup, "ARTISTLINK_RESULT_GRACE_SECS", &mut config.result_grace_secs)?;

        if let Some(raw) = lookup("ARTISTLINK_CACHE_MAX_AGE_SECS") {
            config.cache.max_age_secs = if raw.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_value("ARTISTLINK_CACHE_MAX_AGE_SECS", &raw)?)
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), RouteError> {
        let zero = [
            ("ARTISTLINK_RATE_QUOTA", self.rate_limit.quota == 0),
            ("ARTISTLINK_RATE_WINDOW_SECS", self.rate_limit.window_secs == 0),
            ("ARTISTLINK_RETRY_MAX_ATTEMPTS", self.retry.max_attempts == 0),
            ("ARTISTLINK_BREAKER_THRESHOLD", self.retry.breaker_threshold == 0),
            ("ARTISTLINK_DETAIL_BATCH_SIZE", self.detail_batch_size == 0),
        ];
        match zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((key, _)) => Err(RouteError::Config {
                key: key.to_string(),
                value: "0".into(),
            }),
            None => Ok(()),
        }
    }

    pub fn result_grace(&self) -> Duration {
        Duration::from_secs(self.result_grace_secs)
    }
}

/// Connection settings for the HTTP collaboration source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub base_url: String,
    pub access_token: String,
}

impl SpotifyConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.spotify.com/v1";

    /// Reads `ARTISTLINK_SPOTIFY_TOKEN` and, optionally,
    /// `ARTISTLINK_SPOTIFY_BASE_URL`.
    pub fn from_env() -> Result<Self, RouteError> {
        let access_token =
            std::env::var("ARTISTLINK_SPOTIFY_TOKEN").map_err(|_| RouteError::Config {
                key: "ARTISTLINK_SPOTIFY_TOKEN".into(),
                value: String::new(),
            })?;
        let base_url = std::env::var("ARTISTLINK_SPOTIFY_BASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string());
        Ok(SpotifyConfig {
            base_url,
            access_token,
        })
    }
}

fn override_with<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), RouteError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = parse_value(key, &raw)?;
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, RouteError> {
    raw.trim().parse().map_err(|_| RouteError::Config {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
