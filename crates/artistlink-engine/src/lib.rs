//! Route finding between artists in a lazily discovered collaboration graph.
//!
//! The engine layer sits on top of `artistlink-core` (records, merge policy,
//! visualization graph) and `artistlink-storage` (persistent store).
//!
//! # Modules
//!
//! - [`config`]: engine and HTTP source settings, environment overrides
//! - [`error`]: UpstreamError and RouteError
//! - [`rate_limit`]: process-wide sliding-window limiter
//! - [`throttle`]: retry with backoff and circuit breaker around upstream calls
//! - [`source`]: the CollaborationSource trait
//! - [`spotify`]: CollaborationSource over the Spotify Web API
//! - [`resolver`]: neighbor resolution with a merge-on-read cache
//! - [`frontier`]: weighted frontier and the weight heuristic
//! - [`finder`]: the best-first / meet-in-the-middle search
//! - [`notifier`]: progress events and their sinks
//! - [`session`]: session registry and result grace cache
//! - [`service`]: RouteService, the entry point for transport layers

pub mod config;
pub mod error;
pub mod finder;
pub mod frontier;
pub mod notifier;
pub mod rate_limit;
pub mod resolver;
pub mod service;
pub mod session;
pub mod source;
pub mod spotify;
pub mod throttle;

pub use config::{CacheConfig, EngineConfig, RateLimitConfig, RetryPolicy, SpotifyConfig};
pub use error::{RouteError, UpstreamError};
pub use finder::{RouteFinder, RouteResult};
pub use frontier::{calculate_weight, Frontier, FrontierEntry};
pub use notifier::{ChannelNotifier, Notifier, NullNotifier, ProgressEvent, UpdateType};
pub use rate_limit::RateLimiter;
pub use resolver::{shared_store, ConnectionResolver, Resolution, SharedStore};
pub use service::{RouteService, SearchHandle};
pub use session::{SessionId, SessionRegistry};
pub use source::CollaborationSource;
pub use spotify::SpotifySource;
pub use throttle::{BreakerState, Throttle};
