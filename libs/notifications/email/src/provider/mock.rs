//! Mock email provider for testing and dry runs

use super::{EmailProvider, QuotaPeriod, QuotaTracker, RateLimitWindow, SendResult};
use crate::models::OutboundEmail;
use async_trait::async_trait;
use eyre::Result;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Where the mock's quota window comes from
enum MockQuota {
    /// Reported verbatim on every query
    Fixed(RateLimitWindow),
    /// Counted locally per send
    Tracked(Arc<QuotaTracker>),
}

#[derive(Default)]
struct MockState {
    sent: Vec<OutboundEmail>,
    attempts: Vec<(String, Instant)>,
    scripted: VecDeque<std::result::Result<(), String>>,
    failing_recipients: HashSet<String>,
}

/// Mock email provider that captures sent emails
///
/// Succeeds by default. Failures can be made permanent ([`MockProvider::failing`]),
/// scripted per attempt ([`MockProvider::fail_next`]) or tied to a recipient
/// ([`MockProvider::fail_for`]).
pub struct MockProvider {
    state: Mutex<MockState>,
    quota: Mutex<MockQuota>,
    period: QuotaPeriod,
    failure_message: Option<String>,
    latency: Option<Duration>,
}

impl MockProvider {
    /// Create a new mock provider with a generous, never-exhausted quota
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            quota: Mutex::new(MockQuota::Fixed(RateLimitWindow {
                limit: 100,
                remaining: 100,
                reset_at: Instant::now() + Duration::from_secs(1),
            })),
            period: QuotaPeriod::PerSecond,
            failure_message: None,
            latency: None,
        }
    }

    /// Create a mock provider that always fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure_message: Some(message.into()),
            ..Self::new()
        }
    }

    /// Report `window` on every quota query
    pub fn with_rate_limit(self, window: RateLimitWindow) -> Self {
        self.set_rate_limit(window);
        self
    }

    /// Count sends against `limit` per `period`, like a real provider
    pub fn with_tracked_quota(mut self, limit: u32, period: QuotaPeriod) -> Self {
        self.period = period;
        *self.quota_guard() = MockQuota::Tracked(Arc::new(QuotaTracker::new("mock", limit, period)));
        self
    }

    /// Quota class used for pacing
    pub fn with_quota_period(mut self, period: QuotaPeriod) -> Self {
        self.period = period;
        self
    }

    /// Delay every send by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace the reported quota window
    pub fn set_rate_limit(&self, window: RateLimitWindow) {
        *self.quota_guard() = MockQuota::Fixed(window);
    }

    /// Fail the next `count` attempts with `message`, whatever the recipient
    pub fn fail_next(&self, count: usize, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state_guard();
        for _ in 0..count {
            state.scripted.push_back(Err(message.clone()));
        }
    }

    /// Always fail sends to `recipient`
    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.state_guard().failing_recipients.insert(recipient.into());
    }

    /// Get all successfully sent emails
    pub fn sent_emails(&self) -> Vec<OutboundEmail> {
        self.state_guard().sent.clone()
    }

    /// Get the count of sent emails
    pub fn sent_count(&self) -> usize {
        self.state_guard().sent.len()
    }

    /// Every attempted recipient with the instant of the attempt, in order
    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.state_guard().attempts.clone()
    }

    /// Check if an email was sent to a specific address
    pub fn was_sent_to(&self, email: &str) -> bool {
        self.state_guard().sent.iter().any(|e| e.to == email)
    }

    fn state_guard(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn quota_guard(&self) -> MutexGuard<'_, MockQuota> {
        self.quota.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outcome_for(&self, email: &OutboundEmail) -> std::result::Result<(), String> {
        let mut state = self.state_guard();
        state.attempts.push((email.to.clone(), Instant::now()));

        if let Some(message) = &self.failure_message {
            return Err(message.clone());
        }
        if let Some(scripted) = state.scripted.pop_front() {
            return scripted;
        }
        if state.failing_recipients.contains(&email.to) {
            return Err(format!("mailbox unavailable: {}", email.to));
        }
        Ok(())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn quota_period(&self) -> QuotaPeriod {
        self.period
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendResult> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let tracker = match &*self.quota_guard() {
            MockQuota::Tracked(tracker) => Some(tracker.clone()),
            MockQuota::Fixed(_) => None,
        };
        if let Some(tracker) = tracker {
            tracker.acquire().await;
        }

        self.outcome_for(email).map_err(|message| eyre::eyre!(message))?;

        let mut state = self.state_guard();
        state.sent.push(email.clone());

        Ok(SendResult {
            message_id: Some(format!("mock-{}", state.sent.len())),
        })
    }

    fn rate_limit(&self) -> RateLimitWindow {
        match &*self.quota_guard() {
            MockQuota::Fixed(window) => *window,
            MockQuota::Tracked(tracker) => tracker.window(),
        }
    }

    async fn health_check(&self) -> Result<()> {
        if self.failure_message.is_some() {
            return Err(eyre::eyre!("Mock health check failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> OutboundEmail {
        OutboundEmail::new(to, "Test Subject").with_text("Test body")
    }

    #[tokio::test]
    async fn test_mock_provider_sends_email() {
        let provider = MockProvider::new();

        let result = provider.send(&email("test@example.com")).await.unwrap();
        assert_eq!(result.message_id.as_deref(), Some("mock-1"));

        let sent = provider.sent_emails();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "test@example.com");
    }

    #[tokio::test]
    async fn test_mock_provider_fails() {
        let provider = MockProvider::failing("Simulated failure");

        let result = provider.send(&email("test@example.com")).await;
        assert!(result.unwrap_err().to_string().contains("Simulated failure"));
        assert_eq!(provider.sent_count(), 0);
        assert_eq!(provider.attempts().len(), 1);
        assert!(provider.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let provider = MockProvider::new();
        provider.fail_next(2, "flaky");

        assert!(provider.send(&email("a@example.com")).await.is_err());
        assert!(provider.send(&email("a@example.com")).await.is_err());
        assert!(provider.send(&email("a@example.com")).await.is_ok());
        assert!(provider.was_sent_to("a@example.com"));
    }

    #[tokio::test]
    async fn test_fail_for_recipient() {
        let provider = MockProvider::new();
        provider.fail_for("bounce@example.com");

        assert!(provider.send(&email("bounce@example.com")).await.is_err());
        assert!(provider.send(&email("ok@example.com")).await.is_ok());
        assert!(!provider.was_sent_to("bounce@example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_quota_counts_attempts() {
        let provider = MockProvider::new().with_tracked_quota(3, QuotaPeriod::PerHour);
        assert_eq!(provider.quota_period(), QuotaPeriod::PerHour);

        provider.send(&email("a@example.com")).await.unwrap();
        let window = provider.rate_limit();
        assert_eq!(window.limit, 3);
        assert_eq!(window.remaining, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_quota_delays_send_over_limit() {
        let provider = MockProvider::new().with_tracked_quota(1, QuotaPeriod::PerSecond);
        let started = Instant::now();

        provider.send(&email("a@example.com")).await.unwrap();
        provider.send(&email("b@example.com")).await.unwrap();

        let attempts = provider.attempts();
        assert_eq!(attempts[0].1, started);
        assert!(attempts[1].1 >= started + Duration::from_secs(1));
        assert_eq!(provider.sent_count(), 2);
    }

    #[test]
    fn test_fixed_rate_limit_is_reported() {
        let reset_at = Instant::now() + Duration::from_millis(500);
        let provider = MockProvider::new().with_rate_limit(RateLimitWindow {
            limit: 10,
            remaining: 0,
            reset_at,
        });

        let window = provider.rate_limit();
        assert!(window.is_exhausted());
        assert_eq!(window.reset_at, reset_at);
    }
}
