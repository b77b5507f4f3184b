//! Email provider implementations

pub mod mock;
pub mod sendgrid;
pub mod smtp;

pub use mock::MockProvider;
pub use sendgrid::{SendGridConfig, SendGridProvider};
pub use smtp::{SmtpConfig, SmtpProvider};

use crate::models::OutboundEmail;
use async_trait::async_trait;
use eyre::Result;
use rate_limiter::RateLimiter;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Result of sending an email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    /// Provider-specific message ID, when the provider reports one
    pub message_id: Option<String>,
}

/// Period over which a provider's quota is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPeriod {
    /// Strict per-second ceiling
    PerSecond,
    /// Hourly budget
    PerHour,
}

impl QuotaPeriod {
    pub fn duration(&self) -> Duration {
        match self {
            Self::PerSecond => Duration::from_secs(1),
            Self::PerHour => Duration::from_secs(3600),
        }
    }

    /// Delay between consecutive sends that spreads `limit` evenly over the period.
    pub fn pacing_delay(&self, limit: u32) -> Duration {
        self.duration() / limit.max(1)
    }
}

/// Provider quota as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Instant,
}

impl RateLimitWindow {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Time until the window resets (zero once it has passed).
    pub fn reset_in(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }
}

/// Trait for email providers
///
/// The delivery queue only uses this capability set; it never looks at
/// provider internals.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Get provider name
    fn name(&self) -> &'static str;

    /// Period the provider's quota applies to
    fn quota_period(&self) -> QuotaPeriod;

    /// Send an email
    async fn send(&self, email: &OutboundEmail) -> Result<SendResult>;

    /// Current quota window
    fn rate_limit(&self) -> RateLimitWindow;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<()>;
}

/// Local bookkeeping of a provider's quota.
///
/// Counts each send attempt in a fixed window the length of the quota period.
pub struct QuotaTracker {
    key: &'static str,
    limit: u32,
    limiter: RateLimiter,
}

impl QuotaTracker {
    pub fn new(key: &'static str, limit: u32, period: QuotaPeriod) -> Self {
        Self {
            key,
            limit,
            limiter: RateLimiter::with_window(period.duration()),
        }
    }

    /// Count one send. Returns `false` when the quota was already spent.
    pub fn record(&self) -> bool {
        self.limiter.check(self.key, self.limit).allowed
    }

    /// Count one send, waiting for the window to reset while the quota is spent.
    ///
    /// Callers sharing the provider can pass the queue's quota check together
    /// and race for the last slot; the loser waits here instead of failing.
    pub async fn acquire(&self) {
        loop {
            let decision = self.limiter.check(self.key, self.limit);
            if decision.allowed {
                return;
            }

            let wait = decision.reset_after();
            debug!(
                key = self.key,
                wait_ms = wait.as_millis() as u64,
                "Provider quota spent, waiting for reset"
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub fn window(&self) -> RateLimitWindow {
        let decision = self.limiter.peek(self.key, self.limit);
        RateLimitWindow {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        }
    }
}
