//! Bulk Mailer
//!
//! Loads a manifest of deliveries and drains it through a rate-limited
//! delivery queue, reporting progress until every item is sent or failed.
//!
//! ## Flow
//!
//! ```text
//! BULK_MAIL_MANIFEST (JSON)
//!   ↓ (validated)
//! QueueRegistry::get_or_create(session)
//!   ↓ (paced to the provider quota, retried)
//! EmailProvider (SendGrid/SMTP/Mock)
//! ```
//!
//! Status is logged once per poll interval. Ctrl-C or SIGTERM pauses the
//! queue; a send already in flight still completes.

pub mod config;
pub mod manifest;

use config::{BulkMailerConfig, ProviderKind};
use core_config::{Environment, FromEnv};
use email::{
    DeliveryQueue, DeliveryQueueConfig, EmailProvider, MockProvider, QueueEvent, QueueRegistry,
    QueueStatus, SendGridProvider, SmtpProvider,
};
use eyre::{Result, WrapErr};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

/// How a supervised run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every item reached a terminal state
    Drained,
    /// Shutdown was requested; the queue was paused
    Interrupted,
}

/// Run the bulk mailer
///
/// 1. Sets up color-eyre and structured logging (JSON for prod, pretty for dev)
/// 2. Loads and validates the manifest
/// 3. Selects the email provider (explicit `EMAIL_PROVIDER`, else by environment)
/// 4. Queues every delivery and supervises the queue until it drains or a
///    shutdown signal arrives
///
/// # Errors
///
/// Returns an error if configuration is invalid, the manifest cannot be read
/// or the provider cannot be created. Individual delivery failures are
/// reported in the final status, not as errors.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting bulk mailer"
    );
    info!("Environment: {:?}", environment);

    let config =
        BulkMailerConfig::from_env().wrap_err("Failed to load bulk mailer configuration")?;
    let queue_config =
        DeliveryQueueConfig::from_env().wrap_err("Failed to load delivery queue configuration")?;

    let emails = manifest::load(&config.manifest_path).await?;
    info!(
        manifest = %config.manifest_path.display(),
        deliveries = emails.len(),
        "Manifest loaded"
    );

    let provider = build_provider(config.provider_kind(&environment))?;
    if let Err(e) = provider.health_check().await {
        warn!(provider = provider.name(), error = %e, "Provider health check failed, continuing");
    }

    let registry = QueueRegistry::new(provider, queue_config);
    let queue = registry.get_or_create(&config.session_id);
    queue.add_items(emails);

    tokio::spawn(log_events(config.session_id.clone(), queue.subscribe()));

    queue.start();
    let outcome = supervise(&queue, config.poll_interval, async {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
    })
    .await;

    let status = queue.status();
    match outcome {
        Outcome::Drained => info!(
            session_id = %config.session_id,
            sent = status.processed,
            failed = status.failed,
            "Bulk send finished"
        ),
        Outcome::Interrupted => warn!(
            session_id = %config.session_id,
            sent = status.processed,
            failed = status.failed,
            remaining = status.remaining,
            "Bulk send interrupted"
        ),
    }

    if status.failed > 0 {
        for item in queue.items().iter().filter(|i| i.status == email::DeliveryStatus::Failed) {
            warn!(
                item_id = %item.id,
                to = %item.email.to,
                attempts = item.attempts,
                error = item.last_error.as_deref().unwrap_or("unknown"),
                "Delivery failed"
            );
        }
    }

    Ok(())
}

/// Create the provider for `kind`.
pub fn build_provider(kind: ProviderKind) -> Result<Arc<dyn EmailProvider>> {
    let provider: Arc<dyn EmailProvider> = match kind {
        ProviderKind::SendGrid => {
            info!("Using SendGrid provider");
            Arc::new(SendGridProvider::from_env().wrap_err(
                "SendGrid configuration error. Ensure SENDGRID_API_KEY and SENDGRID_FROM_EMAIL are set",
            )?)
        }
        ProviderKind::Smtp => {
            // A configured SMTP_HOST means a real relay; otherwise Mailpit on localhost
            let smtp = if std::env::var("SMTP_HOST").is_ok() {
                info!("Using SMTP provider");
                SmtpProvider::from_env()
            } else {
                info!("Using SMTP provider for development (Mailpit)");
                SmtpProvider::mailpit()
            };
            Arc::new(smtp.wrap_err("SMTP configuration error")?)
        }
        ProviderKind::Mock => {
            info!("Using mock provider, nothing will be delivered");
            Arc::new(MockProvider::new())
        }
    };

    Ok(provider)
}

/// Log status every `poll_interval` until the queue drains or `shutdown` resolves.
///
/// On shutdown the queue is paused.
pub async fn supervise<F>(queue: &DeliveryQueue, poll_interval: Duration, shutdown: F) -> Outcome
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = queue.wait_until_idle() => return Outcome::Drained,
            _ = &mut shutdown => {
                queue.pause();
                return Outcome::Interrupted;
            }
            _ = ticker.tick() => log_status(queue.session_id(), &queue.status()),
        }
    }
}

fn log_status(session_id: &str, status: &QueueStatus) {
    info!(
        session_id,
        state = %status.status,
        processed = status.processed,
        failed = status.failed,
        remaining = status.remaining,
        total = status.total,
        provider = %status.provider_name,
        quota_remaining = status.rate_limit.remaining,
        quota_reset_in_ms = status.rate_limit.reset_in_ms,
        "Queue status"
    );
}

async fn log_events(session_id: String, mut events: broadcast::Receiver<QueueEvent>) {
    loop {
        match events.recv().await {
            Ok(QueueEvent::ItemCompleted(item)) => info!(
                session_id = %session_id,
                item_id = %item.id,
                to = %item.email.to,
                status = %item.status,
                attempts = item.attempts,
                "Delivery completed"
            ),
            Ok(QueueEvent::Progress(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(session_id = %session_id, skipped, "Event log lagging behind queue");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, pausing queue...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, pausing queue...");
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use email::{OutboundEmail, QueueState, QuotaPeriod};

    fn email(n: usize) -> OutboundEmail {
        OutboundEmail::new(format!("user{n}@example.com"), "Hello").with_text("Body")
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_until_drained() {
        let queue = DeliveryQueue::new(
            "drain",
            Arc::new(MockProvider::new()),
            DeliveryQueueConfig::default(),
        );
        queue.add_items((0..3).map(email));
        queue.start();

        let outcome = supervise(&queue, Duration::from_secs(1), std::future::pending::<()>()).await;
        assert_eq!(outcome, Outcome::Drained);
        assert_eq!(queue.status().processed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_pauses_on_shutdown() {
        let provider =
            Arc::new(MockProvider::new().with_tracked_quota(1, QuotaPeriod::PerSecond));
        let queue = DeliveryQueue::new("interrupt", provider.clone(), DeliveryQueueConfig::default());
        queue.add_items((0..5).map(email));
        queue.start();

        let outcome = supervise(
            &queue,
            Duration::from_secs(1),
            tokio::time::sleep(Duration::from_millis(2500)),
        )
        .await;

        assert_eq!(outcome, Outcome::Interrupted);
        let status = queue.status();
        assert_eq!(status.status, QueueState::Paused);
        assert_eq!(status.processed, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(provider.sent_count(), 3);
    }

    #[test]
    fn test_build_mock_provider() {
        let provider = build_provider(ProviderKind::Mock).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_build_sendgrid_requires_api_key() {
        temp_env::with_vars(
            [
                ("SENDGRID_API_KEY", None::<&str>),
                ("SENDGRID_FROM_EMAIL", Some("noreply@example.com")),
            ],
            || assert!(build_provider(ProviderKind::SendGrid).is_err()),
        );
    }

    #[test]
    fn test_build_smtp_falls_back_to_mailpit() {
        temp_env::with_var_unset("SMTP_HOST", || {
            let provider = build_provider(ProviderKind::Smtp).unwrap();
            assert_eq!(provider.name(), "smtp");
        });
    }
}
