//! SendGrid email provider
//!
//! Sends emails via the SendGrid HTTP API. SendGrid enforces a per-second
//! request ceiling, so the queue paces this provider over one-second windows.

use crate::error::NotificationResult;
use crate::models::OutboundEmail;
use crate::provider::{EmailProvider, QuotaPeriod, QuotaTracker, RateLimitWindow, SendResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use core_config::{env_or_default, env_parse_or, env_required};
use eyre::{eyre, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// SendGrid API endpoint
const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// SendGrid provider configuration
#[derive(Clone, Debug)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
    /// Requests allowed per second
    pub rate_limit_per_second: u32,
    /// Upper bound on a single API call
    pub request_timeout: Duration,
}

impl SendGridConfig {
    /// Load from environment variables
    ///
    /// Expects:
    /// - `SENDGRID_API_KEY`
    /// - `SENDGRID_FROM_EMAIL` or `EMAIL_FROM_ADDRESS`
    /// - `SENDGRID_FROM_NAME` or `EMAIL_FROM_NAME` (default "Notifications")
    /// - `SENDGRID_RATE_LIMIT_PER_SECOND` (default 10)
    /// - `SENDGRID_TIMEOUT_SECS` (default 30)
    pub fn from_env() -> NotificationResult<Self> {
        let from_email = env_required("SENDGRID_FROM_EMAIL")
            .or_else(|_| env_required("EMAIL_FROM_ADDRESS"))?;

        let from_name = std::env::var("SENDGRID_FROM_NAME")
            .unwrap_or_else(|_| env_or_default("EMAIL_FROM_NAME", "Notifications"));

        Ok(Self {
            api_key: env_required("SENDGRID_API_KEY")?,
            from_email,
            from_name,
            rate_limit_per_second: env_parse_or("SENDGRID_RATE_LIMIT_PER_SECOND", 10)?,
            request_timeout: Duration::from_secs(env_parse_or("SENDGRID_TIMEOUT_SECS", 30)?),
        })
    }
}

/// SendGrid email provider
pub struct SendGridProvider {
    config: SendGridConfig,
    client: Client,
    quota: QuotaTracker,
}

impl SendGridProvider {
    /// Create a new SendGridProvider
    pub fn new(config: SendGridConfig) -> NotificationResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let quota = QuotaTracker::new("sendgrid", config.rate_limit_per_second, QuotaPeriod::PerSecond);

        Ok(Self { config, client, quota })
    }

    /// Create from environment variables (see [`SendGridConfig::from_env`])
    pub fn from_env() -> NotificationResult<Self> {
        Self::new(SendGridConfig::from_env()?)
    }

    async fn build_request(&self, email: &OutboundEmail) -> Result<SendGridRequest> {
        email.validate()?;

        let mut content = Vec::new();

        if let Some(text) = &email.body_text {
            content.push(Content {
                content_type: "text/plain".to_string(),
                value: text.clone(),
            });
        }

        if let Some(html) = &email.body_html {
            content.push(Content {
                content_type: "text/html".to_string(),
                value: html.clone(),
            });
        }

        let mut attachments = Vec::with_capacity(email.attachments.len());
        for attachment in &email.attachments {
            let bytes = attachment.load().await?;
            attachments.push(Attachment {
                content: STANDARD.encode(bytes),
                filename: attachment.filename.clone(),
                content_type: attachment.mime_type().to_string(),
                disposition: "attachment",
            });
        }

        Ok(SendGridRequest {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: email.to.clone(),
                    name: None,
                }],
            }],
            from: EmailAddress {
                email: email
                    .from
                    .clone()
                    .unwrap_or_else(|| self.config.from_email.clone()),
                name: Some(self.config.from_name.clone()),
            },
            reply_to: email.reply_to.as_ref().map(|r| EmailAddress {
                email: r.clone(),
                name: None,
            }),
            subject: email.subject.clone(),
            content,
            attachments,
        })
    }
}

/// SendGrid API request payload
#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<EmailAddress>,
    subject: String,
    content: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct Attachment {
    content: String,
    filename: String,
    #[serde(rename = "type")]
    content_type: String,
    disposition: &'static str,
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    fn quota_period(&self) -> QuotaPeriod {
        QuotaPeriod::PerSecond
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendResult> {
        let request = self.build_request(email).await?;

        self.quota.acquire().await;

        debug!(
            to = %email.to,
            subject = %email.subject,
            attachments = request.attachments.len(),
            "Sending email via SendGrid"
        );

        let response = self
            .client
            .post(SENDGRID_API_URL)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| eyre!("SendGrid request failed: {}", e))?;

        let status = response.status();

        if status.is_success() {
            // SendGrid returns message ID in X-Message-Id header
            let message_id = response
                .headers()
                .get("X-Message-Id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            debug!(message_id = ?message_id, "Email accepted by SendGrid");

            Ok(SendResult { message_id })
        } else {
            let error_body = response.text().await.unwrap_or_default();
            error!(
                status = %status,
                error = %error_body,
                "SendGrid API error"
            );

            match status.as_u16() {
                429 => Err(eyre!("rate limit exceeded")),
                400 => Err(eyre!("invalid request: {}", error_body)),
                401 | 403 => Err(eyre!("authentication failed")),
                _ => Err(eyre!("SendGrid error ({}): {}", status, error_body)),
            }
        }
    }

    fn rate_limit(&self) -> RateLimitWindow {
        self.quota.window()
    }

    async fn health_check(&self) -> Result<()> {
        if self.config.api_key.is_empty() {
            return Err(eyre!("SendGrid API key not configured"));
        }
        Ok(())
    }
}
