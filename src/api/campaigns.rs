/// Campaign REST API endpoints
///
/// Flow upload with hot-reload into the registry, and the start/stop/status
/// lifecycle backed by the campaign supervisor.

use crate::api::{reject, AppState};
use crate::flow::{Edge, Flow, Node};
use crate::store::{CampaignStatus, ExecutionState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

/// Request body for a flow upload; the campaign comes from the path
#[derive(Debug, Deserialize)]
pub struct FlowRequest {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Response for flow uploads and lifecycle actions
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub campaign_id: String,
    pub status: CampaignStatus,
    pub message: String,
}

/// Campaign status with its live execution state, if any
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub campaign_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub running: bool,
    pub execution: Option<ExecutionState>,
}

pub fn create_campaign_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/campaigns/{id}/flow",
            get(get_flow).put(put_flow).delete(delete_flow),
        )
        .route("/api/campaigns/{id}/start", post(start_campaign))
        .route("/api/campaigns/{id}/stop", post(stop_campaign))
        .route("/api/campaigns/{id}/status", get(campaign_status))
}

/// Replace a campaign's flow
///
/// PUT /api/campaigns/:id/flow
/// Body: { "nodes": [...], "edges": [...] }
async fn put_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<FlowRequest>,
) -> Result<Json<CampaignResponse>, StatusCode> {
    let campaign = state
        .store
        .campaigns
        .require(&id)
        .await
        .map_err(|e| reject("Flow upload", e))?;

    if campaign.status == CampaignStatus::Sending {
        tracing::warn!("⚠️ Flow edit rejected for sending campaign: {}", id);
        return Err(StatusCode::CONFLICT);
    }

    let flow = Flow {
        campaign_id: id.clone(),
        nodes: payload.nodes,
        edges: payload.edges,
    };
    let flow = state
        .flows
        .publish(flow)
        .await
        .map_err(|e| reject("Flow upload", e))?;

    tracing::info!("🔥 Hot-reloaded flow for campaign {} ({} nodes)", id, flow.nodes.len());

    Ok(Json(CampaignResponse {
        campaign_id: id,
        status: campaign.status,
        message: format!("Flow with {} nodes saved", flow.nodes.len()),
    }))
}

/// GET /api/campaigns/:id/flow
async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Flow>, StatusCode> {
    match state.store.flows.get_flow(&id).await {
        Ok(Some(flow)) => Ok(Json(flow)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(reject("Flow lookup", e)),
    }
}

/// Remove a campaign's flow
///
/// DELETE /api/campaigns/:id/flow
async fn delete_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignResponse>, StatusCode> {
    let campaign = state
        .store
        .campaigns
        .require(&id)
        .await
        .map_err(|e| reject("Flow delete", e))?;

    if campaign.status == CampaignStatus::Sending {
        tracing::warn!("⚠️ Flow delete rejected for sending campaign: {}", id);
        return Err(StatusCode::CONFLICT);
    }

    match state.store.flows.delete_flow(&id).await {
        Ok(true) => {}
        Ok(false) => return Err(StatusCode::NOT_FOUND),
        Err(e) => return Err(reject("Flow delete", e)),
    }

    // drop the cached copy
    state
        .flows
        .reload(&id)
        .await
        .map_err(|e| reject("Flow delete", e))?;

    tracing::info!("🗑️ Deleted flow for campaign {}", id);

    Ok(Json(CampaignResponse {
        campaign_id: id,
        status: campaign.status,
        message: "Flow deleted".to_string(),
    }))
}

/// POST /api/campaigns/:id/start
async fn start_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignResponse>, StatusCode> {
    let execution = state
        .supervisor
        .start(&id)
        .await
        .map_err(|e| reject("Campaign start", e))?;

    Ok(Json(CampaignResponse {
        campaign_id: id,
        status: CampaignStatus::Sending,
        message: format!("Started at node {}", execution.current_node_id),
    }))
}

/// POST /api/campaigns/:id/stop
async fn stop_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignResponse>, StatusCode> {
    state
        .supervisor
        .stop(&id)
        .await
        .map_err(|e| reject("Campaign stop", e))?;

    Ok(Json(CampaignResponse {
        campaign_id: id,
        status: CampaignStatus::Paused,
        message: "Stopped; a restart begins at the entry node".to_string(),
    }))
}

/// GET /api/campaigns/:id/status
async fn campaign_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let campaign = state
        .store
        .campaigns
        .require(&id)
        .await
        .map_err(|e| reject("Status lookup", e))?;
    let execution = state
        .store
        .executions
        .get(&id)
        .await
        .map_err(|e| reject("Status lookup", e))?;

    Ok(Json(StatusResponse {
        running: state.supervisor.is_running(&id).await,
        campaign_id: campaign.id,
        name: campaign.name,
        status: campaign.status,
        execution,
    }))
}
