//! Delivery manifest
//!
//! A JSON array of messages, one per recipient:
//!
//! ```json
//! [
//!   {
//!     "to": "ada@example.com",
//!     "subject": "Your invoice",
//!     "body_html": "<p>Attached.</p>",
//!     "attachments": [{ "filename": "invoice.pdf", "path": "out/ada.pdf" }]
//!   }
//! ]
//! ```

use email::OutboundEmail;
use eyre::{Result, WrapErr, bail};
use std::path::Path;

/// Read and validate a manifest. Any invalid entry rejects the whole manifest.
pub async fn load(path: &Path) -> Result<Vec<OutboundEmail>> {
    let raw = tokio::fs::read(path)
        .await
        .wrap_err_with(|| format!("Failed to read manifest {}", path.display()))?;

    parse(&raw).wrap_err_with(|| format!("Invalid manifest {}", path.display()))
}

pub fn parse(raw: &[u8]) -> Result<Vec<OutboundEmail>> {
    let emails: Vec<OutboundEmail> =
        serde_json::from_slice(raw).wrap_err("Manifest must be a JSON array of deliveries")?;

    for (index, email) in emails.iter().enumerate() {
        if let Err(e) = email.validate() {
            bail!("Delivery #{index} ({}): {e}", email.to);
        }
    }

    Ok(emails)
}
