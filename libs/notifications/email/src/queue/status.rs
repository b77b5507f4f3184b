use crate::provider::RateLimitWindow;
use serde::Serialize;
use strum::Display;

/// Aggregate state of a delivery queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueState {
    Idle,
    Processing,
    Paused,
}

/// Provider quota as reported in a status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_in_ms: u64,
}

impl From<RateLimitWindow> for RateLimitStatus {
    fn from(window: RateLimitWindow) -> Self {
        Self {
            limit: window.limit,
            remaining: window.remaining,
            reset_in_ms: window.reset_in().as_millis() as u64,
        }
    }
}

/// Point-in-time view of a queue, meant to be polled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub status: QueueState,
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
    /// Items not yet terminal
    pub remaining: usize,
    pub provider_name: String,
    pub rate_limit: RateLimitStatus,
}
