//! Error types for the email delivery library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors raised while configuring providers or preparing a message.
///
/// Failures of an individual send never surface as this type from the queue;
/// they are recorded on the delivery item instead.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] core_config::ConfigError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider setup error (SMTP transport, SendGrid client, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Attachment reference could not be read
    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
