/// Engagement event processing
///
/// Provider webhooks and the tracking endpoints both land here. The ledger row is
/// updated first, then the updated activity is forwarded to the campaign's
/// interpreter, which alone decides whether a condition branch fires.

use crate::error::{EngineError, EngineResult};
use crate::runtime::interpreter::EngagementSignal;
use crate::runtime::supervisor::CampaignSupervisor;
use crate::store::{Activity, ActivityLedger, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Delivery event as posted by the mail provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub event_type: EventKind,
    pub message_id: String,
    /// Defaults to the time the event is received
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct EventProcessor {
    activities: ActivityLedger,
    supervisor: Arc<CampaignSupervisor>,
}

impl EventProcessor {
    pub fn new(activities: ActivityLedger, supervisor: Arc<CampaignSupervisor>) -> Self {
        Self {
            activities,
            supervisor,
        }
    }

    /// Apply a provider event keyed by message id
    pub async fn process(&self, event: &DeliveryEvent) -> EngineResult<Activity> {
        let at = event.timestamp.unwrap_or_else(Utc::now);
        let activity = self
            .activities
            .apply_event(event.event_type, &event.message_id, at)
            .await?;
        self.forward(event.event_type, activity).await
    }

    /// Apply a pixel or click hit keyed by tracking id
    pub async fn process_tracking(&self, kind: EventKind, tracking_id: &str) -> EngineResult<Activity> {
        let activity = self
            .activities
            .by_tracking_id(tracking_id)
            .await?
            .ok_or_else(|| EngineError::not_found("activity", tracking_id))?;
        let activity = self
            .activities
            .apply_event(kind, &activity.message_id, Utc::now())
            .await?;
        self.forward(kind, activity).await
    }

    async fn forward(&self, kind: EventKind, activity: Activity) -> EngineResult<Activity> {
        let campaign_id = activity.campaign_id.clone();
        let delivered = self
            .supervisor
            .notify(
                &campaign_id,
                EngagementSignal {
                    kind,
                    activity: activity.clone(),
                },
            )
            .await;

        tracing::info!(
            campaign_id = %campaign_id,
            message_id = %activity.message_id,
            event = ?kind,
            delivered,
            "📬 Engagement event recorded"
        );
        Ok(activity)
    }
}
