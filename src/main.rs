/// Outreach: campaign workflow engine for outbound email sequences
///
/// Main entry point. Loads configuration from the environment and starts the HTTP
/// server, which also resumes any campaign that was sending at shutdown.

use outreach::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Flow upload and campaign lifecycle at /api/campaigns/*
/// - Provider delivery events at /webhooks/events
/// - Open pixel and click redirects at /track/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
