//! Keyed fixed-window rate limiter
//!
//! Gates how often a key may act within a window. Each key owns a bucket
//! `{count, reset_at}`; the counter resets wholesale once the window elapses.
//!
//! ## Features
//!
//! - **Fixed window**: `RateLimiter::check` counts and decides in one call
//! - **Categories**: `RateLimitCategory` maps request classes (api, upload,
//!   generation, archive, email) to limits from `core_config::RateLimitConfig`
//! - **Response headers**: `RateLimitDecision::headers` builds the conventional
//!   `X-RateLimit-*` / `Retry-After` set for whatever transport hosts the limiter
//!
//! ## Deployment
//!
//! Buckets live in process memory. Construct one limiter at startup and share
//! it by `Arc`; a deployment with several instances needs a shared external
//! store instead, since each instance would otherwise grant the full limit.
//!
//! ## Example
//!
//! ```ignore
//! use rate_limiter::{RateLimiter, RateLimitCategory};
//!
//! let limiter = Arc::new(RateLimiter::new(RateLimitConfig::from_env()?));
//! let decision = limiter.check_category(RateLimitCategory::Upload, &client_ip);
//! if !decision.allowed {
//!     return too_many_requests(decision.headers());
//! }
//! ```

mod category;
mod headers;
mod limiter;

pub use category::RateLimitCategory;
pub use core_config::RateLimitConfig;
pub use headers::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
pub use limiter::{RateLimitDecision, RateLimiter};
