use crate::{env_parse_or, ConfigError, FromEnv};
use std::time::Duration;

/// Window length and per-category limits for the request rate limiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub api: u32,
    pub upload: u32,
    pub generation: u32,
    pub archive: u32,
    pub email: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(60_000),
            api: 100,
            upload: 10,
            generation: 20,
            archive: 5,
            email: 10,
        }
    }
}

impl FromEnv for RateLimitConfig {
    /// Reads from environment variables, each falling back to [`RateLimitConfig::default`]:
    /// - RATE_LIMIT_WINDOW_MS
    /// - RATE_LIMIT_API, RATE_LIMIT_UPLOAD, RATE_LIMIT_GENERATION,
    ///   RATE_LIMIT_ARCHIVE, RATE_LIMIT_EMAIL
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let window_ms = env_parse_or("RATE_LIMIT_WINDOW_MS", defaults.window.as_millis() as u64)?;

        Ok(Self {
            window: Duration::from_millis(window_ms),
            api: env_parse_or("RATE_LIMIT_API", defaults.api)?,
            upload: env_parse_or("RATE_LIMIT_UPLOAD", defaults.upload)?,
            generation: env_parse_or("RATE_LIMIT_GENERATION", defaults.generation)?,
            archive: env_parse_or("RATE_LIMIT_ARCHIVE", defaults.archive)?,
            email: env_parse_or("RATE_LIMIT_EMAIL", defaults.email)?,
        })
    }
}
