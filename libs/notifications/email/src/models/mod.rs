use crate::error::{NotificationError, NotificationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum::Display;
use uuid::Uuid;

/// Reference to a file produced elsewhere that should ride along with a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// File name presented to the recipient
    pub filename: String,
    /// Location of the file on local storage
    pub path: PathBuf,
    /// MIME type; guessed from the extension when absent
    #[serde(default)]
    pub content_type: Option<String>,
}

impl AttachmentRef {
    pub fn new(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// MIME type for the attachment.
    pub fn mime_type(&self) -> &str {
        if let Some(content_type) = &self.content_type {
            return content_type;
        }

        let extension = Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pdf") => "application/pdf",
            Some("zip") => "application/zip",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("svg") => "image/svg+xml",
            Some("txt") => "text/plain",
            Some("html") | Some("htm") => "text/html",
            Some("csv") => "text/csv",
            _ => "application/octet-stream",
        }
    }

    /// Read the referenced file.
    pub async fn load(&self) -> NotificationResult<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| NotificationError::Attachment {
                path: self.path.clone(),
                source,
            })
    }
}

/// Message handed to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    /// Recipient email address
    pub to: String,
    /// Sender (defaults to the provider's configured from address)
    #[serde(default)]
    pub from: Option<String>,
    /// Reply-to address
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Email subject
    pub subject: String,
    /// Plain text body
    #[serde(default)]
    pub body_text: Option<String>,
    /// HTML body
    #[serde(default)]
    pub body_html: Option<String>,
    /// Files to attach
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl OutboundEmail {
    /// Create a new email with required fields
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: None,
            reply_to: None,
            subject: subject.into(),
            body_text: None,
            body_html: None,
            attachments: Vec::new(),
        }
    }

    /// Set plain text body
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body_text = Some(text.into());
        self
    }

    /// Set HTML body
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = Some(html.into());
        self
    }

    /// Set sender
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Set reply-to
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Add an attachment reference
    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Reject messages no provider could send.
    pub fn validate(&self) -> NotificationResult<()> {
        if self.to.trim().is_empty() {
            return Err(NotificationError::InvalidInput("recipient is empty".to_string()));
        }
        if self.body_text.is_none() && self.body_html.is_none() {
            return Err(NotificationError::InvalidInput(
                "email must have either text or HTML body".to_string(),
            ));
        }
        Ok(())
    }
}

/// Delivery status of a queued item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    /// `Sent` and `Failed` are never attempted again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// One message tracked by a delivery queue
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryItem {
    pub id: Uuid,
    pub email: OutboundEmail,
    pub status: DeliveryStatus,
    /// Send attempts made so far
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Set once the item is sent
    pub completed_at: Option<DateTime<Utc>>,
    /// Error text of the most recent failed attempt
    pub last_error: Option<String>,
    /// Provider-specific message ID of the successful send
    pub message_id: Option<String>,
}

impl DeliveryItem {
    pub fn new(email: OutboundEmail) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            status: DeliveryStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            completed_at: None,
            last_error: None,
            message_id: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_guessed_from_extension() {
        assert_eq!(AttachmentRef::new("report.PDF", "/tmp/a").mime_type(), "application/pdf");
        assert_eq!(AttachmentRef::new("photo.jpeg", "/tmp/b").mime_type(), "image/jpeg");
        assert_eq!(
            AttachmentRef::new("blob", "/tmp/c").mime_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let attachment = AttachmentRef::new("book.pdf", "/tmp/book").with_content_type("application/x-custom");
        assert_eq!(attachment.mime_type(), "application/x-custom");
    }

    #[tokio::test]
    async fn test_load_missing_attachment() {
        let attachment = AttachmentRef::new("nope.pdf", "/definitely/not/here.pdf");
        let err = attachment.load().await.unwrap_err();
        assert!(matches!(err, NotificationError::Attachment { .. }));
    }

    #[test]
    fn test_validate_requires_body() {
        let email = OutboundEmail::new("user@example.com", "Hello");
        assert!(email.validate().is_err());
        assert!(email.with_text("Hi").validate().is_ok());
    }

    #[test]
    fn test_validate_requires_recipient() {
        let email = OutboundEmail::new("  ", "Hello").with_html("<p>Hi</p>");
        assert!(matches!(email.validate(), Err(NotificationError::InvalidInput(_))));
    }

    #[test]
    fn test_deserialize_manifest_entry() {
        let email: OutboundEmail = serde_json::from_value(serde_json::json!({
            "to": "reader@example.com",
            "subject": "Your book",
            "body_html": "<p>Attached</p>",
            "attachments": [{ "filename": "book.pdf", "path": "/srv/out/book.pdf" }]
        }))
        .unwrap();

        assert_eq!(email.to, "reader@example.com");
        assert!(email.body_text.is_none());
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].mime_type(), "application/pdf");
    }

    #[test]
    fn test_new_item_is_pending() {
        let item = DeliveryItem::new(OutboundEmail::new("a@example.com", "s").with_text("b"));
        assert!(item.is_pending());
        assert_eq!(item.attempts, 0);
        assert!(!item.status.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert_eq!(DeliveryStatus::Sent.to_string(), "sent");
    }
}
