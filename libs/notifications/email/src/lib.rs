//! Rate-limited bulk email delivery
//!
//! Queues outbound messages per session and drains them through a provider
//! without exceeding the provider's quota, retrying failed sends a bounded
//! number of times.
//!
//! ## Components
//!
//! - **Models**: `OutboundEmail`, `AttachmentRef`, `DeliveryItem`, `DeliveryStatus`
//! - **Providers**: SendGrid (HTTP API), SMTP via lettre, and Mock
//! - **Queue**: `DeliveryQueue` with pause/resume, status polling and progress events
//! - **Registry**: `QueueRegistry`, one queue per session over a shared provider
//!
//! ## Usage
//!
//! ```ignore
//! use email::{DeliveryQueueConfig, OutboundEmail, QueueRegistry, SmtpProvider};
//!
//! let provider = Arc::new(SmtpProvider::mailpit()?);
//! let registry = QueueRegistry::new(provider, DeliveryQueueConfig::default());
//!
//! let queue = registry.get_or_create("newsletter-42");
//! queue.add_items(emails);
//! queue.start();
//! queue.wait_until_idle().await;
//! ```

pub mod error;
pub mod models;
pub mod provider;
pub mod queue;
pub mod registry;

pub use error::{NotificationError, NotificationResult};
pub use models::{AttachmentRef, DeliveryItem, DeliveryStatus, OutboundEmail};
pub use provider::{
    EmailProvider, MockProvider, QuotaPeriod, QuotaTracker, RateLimitWindow, SendGridConfig,
    SendGridProvider, SendResult, SmtpConfig, SmtpProvider,
};
pub use queue::{
    DeliveryQueue, DeliveryQueueConfig, ProgressSnapshot, QueueEvent, QueueListener, QueueState,
    QueueStatus, RateLimitStatus,
};
pub use registry::QueueRegistry;
