/// Provider delivery webhook
///
/// Mail providers post open, click and reply events here, keyed by the message id
/// returned at send time.

use crate::api::{reject, AppState};
use crate::runtime::DeliveryEvent;
use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde_json::{json, Value};

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/events", post(receive_event))
}

/// POST /webhooks/events
/// Body: { "event_type": "open|click|reply", "message_id": "...", "timestamp": "..." }
async fn receive_event(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<Value>, StatusCode> {
    // Parse JSON body manually to handle errors gracefully
    let event: DeliveryEvent = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("❌ Invalid delivery event payload: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    tracing::debug!("📥 Delivery event: {:?} for {}", event.event_type, event.message_id);

    let activity = state
        .events
        .process(&event)
        .await
        .map_err(|e| reject("Delivery event", e))?;

    Ok(Json(json!({
        "message_id": activity.message_id,
        "campaign_id": activity.campaign_id,
        "open_count": activity.open_count,
        "click_count": activity.click_count,
        "replied": activity.replied_at.is_some(),
    })))
}
