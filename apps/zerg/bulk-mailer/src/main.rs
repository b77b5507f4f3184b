//! Bulk Mailer - Entry Point
//!
//! Sends a manifest of emails through a rate-limited delivery queue.

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    zerg_bulk_mailer::run().await
}
