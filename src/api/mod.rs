/// HTTP API Layer
///
/// This module provides the REST endpoints of the engine. It handles:
/// - Flow upload and campaign start/stop/status
/// - Provider delivery webhooks
/// - Open pixel and click redirect tracking

use crate::error::EngineError;
use crate::flow::FlowRegistry;
use crate::runtime::{CampaignSupervisor, DailyResetService, EventProcessor};
use crate::store::Store;
use axum::http::StatusCode;
use axum::Router;
use std::sync::Arc;

// Campaign flow and lifecycle endpoints
pub mod campaigns;

// Provider event webhook
pub mod webhooks;

// Open pixel and click redirect
pub mod tracking;

/// Application state containing shared resources
#[derive(Debug, Clone)]
pub struct AppState {
    /// Repositories over the shared pool
    pub store: Store,
    /// Hot-reload registry read by interpreter tasks
    pub flows: Arc<FlowRegistry>,
    /// Owner of the per-campaign interpreter tasks
    pub supervisor: Arc<CampaignSupervisor>,
    /// Ledger update and inbox forwarding for engagement events
    pub events: EventProcessor,
    /// Daily sender reset job, held for the lifetime of the router
    pub scheduler: Arc<DailyResetService>,
}

/// All API routes bound to the shared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(campaigns::create_campaign_routes())
        .merge(webhooks::create_webhook_routes())
        .merge(tracking::create_tracking_routes())
        .with_state(state)
}

/// Log an engine error and turn it into the response status
pub(crate) fn reject(context: &str, error: EngineError) -> StatusCode {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!("❌ {}: {}", context, error);
    } else {
        tracing::warn!("⚠️ {}: {}", context, error);
    }
    status
}
