//! SMTP email provider using lettre
//!
//! Mailbox providers reached over SMTP typically grant an hourly sending
//! budget, so the queue spreads this provider's sends across the hour.

use super::{EmailProvider, QuotaPeriod, QuotaTracker, RateLimitWindow, SendResult};
use crate::error::{NotificationError, NotificationResult};
use crate::models::OutboundEmail;
use async_trait::async_trait;
use core_config::{env_or_default, env_parse_or, env_required};
use eyre::{eyre, Result, WrapErr};
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

/// SMTP provider configuration
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
    /// Messages allowed per hour
    pub hourly_limit: u32,
}

impl SmtpConfig {
    /// Load from environment variables
    ///
    /// Expects `SMTP_HOST` and `EMAIL_FROM_ADDRESS` (or `SMTP_FROM_EMAIL`); optional
    /// `SMTP_PORT` (587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_USE_TLS` (true),
    /// `EMAIL_FROM_NAME` and `SMTP_HOURLY_LIMIT` (100).
    pub fn from_env() -> NotificationResult<Self> {
        Ok(Self {
            host: env_required("SMTP_HOST")?,
            port: env_parse_or("SMTP_PORT", 587)?,
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            from_email: env_required("EMAIL_FROM_ADDRESS")
                .or_else(|_| env_required("SMTP_FROM_EMAIL"))?,
            from_name: env_or_default("EMAIL_FROM_NAME", "Notifications"),
            use_tls: env_parse_or("SMTP_USE_TLS", true)?,
            hourly_limit: env_parse_or("SMTP_HOURLY_LIMIT", 100)?,
        })
    }

    /// Mailpit/MailHog on localhost:1025 without authentication (local development)
    pub fn mailpit() -> NotificationResult<Self> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse_or("SMTP_PORT", 1025)?,
            username: String::new(),
            password: String::new(),
            from_email: env_or_default("EMAIL_FROM_ADDRESS", "noreply@localhost"),
            from_name: env_or_default("EMAIL_FROM_NAME", "Development"),
            use_tls: false,
            hourly_limit: env_parse_or("SMTP_HOURLY_LIMIT", 3600)?,
        })
    }
}

/// SMTP email provider
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
    quota: QuotaTracker,
}

impl SmtpProvider {
    /// Create a new SMTP provider
    pub fn new(config: SmtpConfig) -> NotificationResult<Self> {
        let transport = if config.use_tls {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotificationError::Provider(format!("Failed to create SMTP relay: {e}")))?
                .credentials(creds)
                .port(config.port)
                .build()
        } else if !config.username.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .credentials(creds)
                .port(config.port)
                .build()
        } else {
            // No auth (for Mailpit/MailHog)
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build()
        };

        let quota = QuotaTracker::new("smtp", config.hourly_limit, QuotaPeriod::PerHour);

        Ok(Self {
            transport,
            config,
            quota,
        })
    }

    /// Create a provider for Mailpit/MailHog (local development)
    pub fn mailpit() -> NotificationResult<Self> {
        Self::new(SmtpConfig::mailpit()?)
    }

    /// Create a provider from environment variables
    pub fn from_env() -> NotificationResult<Self> {
        Self::new(SmtpConfig::from_env()?)
    }

    async fn build_message(&self, email: &OutboundEmail) -> Result<Message> {
        email.validate()?;

        let from: Mailbox = match &email.from {
            Some(from) => from.parse().wrap_err("Invalid from address")?,
            None => format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .wrap_err("Invalid from address")?,
        };

        let to: Mailbox = email.to.parse().wrap_err("Invalid to address")?;

        let mut builder = Message::builder().from(from).to(to).subject(&email.subject);

        if let Some(reply_to) = &email.reply_to {
            let reply_to_mailbox: Mailbox =
                reply_to.parse().wrap_err("Invalid reply-to address")?;
            builder = builder.reply_to(reply_to_mailbox);
        }

        if email.attachments.is_empty() {
            let message = match (&email.body_text, &email.body_html) {
                (Some(text), Some(html)) => builder
                    .multipart(MultiPart::alternative_plain_html(text.clone(), html.clone()))
                    .wrap_err("Failed to build multipart message")?,
                (Some(text), None) => builder
                    .header(ContentType::TEXT_PLAIN)
                    .body(text.clone())
                    .wrap_err("Failed to build text message")?,
                (None, Some(html)) => builder
                    .header(ContentType::TEXT_HTML)
                    .body(html.clone())
                    .wrap_err("Failed to build HTML message")?,
                (None, None) => return Err(eyre!("Email must have either text or HTML body")),
            };
            return Ok(message);
        }

        let mut mixed = match (&email.body_text, &email.body_html) {
            (Some(text), Some(html)) => MultiPart::mixed()
                .multipart(MultiPart::alternative_plain_html(text.clone(), html.clone())),
            (Some(text), None) => MultiPart::mixed().singlepart(SinglePart::plain(text.clone())),
            (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
            (None, None) => return Err(eyre!("Email must have either text or HTML body")),
        };

        for attachment in &email.attachments {
            let bytes = attachment.load().await?;
            let content_type = ContentType::parse(attachment.mime_type())
                .map_err(|e| eyre!("Invalid attachment content type {}: {}", attachment.mime_type(), e))?;
            mixed = mixed.singlepart(Attachment::new(attachment.filename.clone()).body(bytes, content_type));
        }

        builder
            .multipart(mixed)
            .wrap_err("Failed to build message with attachments")
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn quota_period(&self) -> QuotaPeriod {
        QuotaPeriod::PerHour
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendResult> {
        let message = self.build_message(email).await?;

        self.quota.acquire().await;

        let response = self
            .transport
            .send(message)
            .await
            .wrap_err("Failed to send email via SMTP")?;

        let message_id = response.message().next().map(|s| s.to_string());

        tracing::debug!(
            to = %email.to,
            subject = %email.subject,
            "Email accepted by SMTP server"
        );

        Ok(SendResult { message_id })
    }

    fn rate_limit(&self) -> RateLimitWindow {
        self.quota.window()
    }

    async fn health_check(&self) -> Result<()> {
        self.transport
            .test_connection()
            .await
            .wrap_err("SMTP health check failed")?;
        Ok(())
    }
}
