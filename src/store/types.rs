/// Persistence models for the campaign engine
///
/// Rows map one-to-one onto the tables created by `Database`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Sending,
    Paused,
    Completed,
}

impl CampaignStatus {
    /// Statuses from which a campaign may be started
    pub fn can_start(self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Paused)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Sending => write!(f, "sending"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: String,
    /// Owner; senders are drawn from this user's pool
    pub user_id: String,
    pub name: String,
    pub status: CampaignStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    /// Free-form template variables
    pub custom_fields: Json<Value>,
    pub is_bounced: bool,
    pub is_unsubscribed: bool,
    pub is_do_not_contact: bool,
}

impl Lead {
    /// Any exclusion flag permanently removes the lead from selection
    pub fn is_excluded(&self) -> bool {
        self.is_bounced || self.is_unsubscribed || self.is_do_not_contact
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Outbound identity with a daily quota
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sender {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub daily_limit: i64,
    pub sent_today: i64,
    pub is_active: bool,
}

impl Sender {
    pub fn remaining(&self) -> i64 {
        self.daily_limit - self.sent_today
    }
}

/// Engagement event kinds reported by the mail provider or tracking endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Open,
    Click,
    Reply,
}

/// Delivery and engagement record of one send
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub message_id: String,
    /// Local token embedded in the open pixel and click redirects
    pub tracking_id: String,
    pub campaign_id: String,
    pub lead_id: String,
    pub sender_id: String,
    pub user_id: String,
    /// Flow node that produced the send
    pub node_id: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub open_count: i64,
    pub clicked_at: Option<DateTime<Utc>>,
    pub click_count: i64,
    pub replied_at: Option<DateTime<Utc>>,
}

/// Fields written when a send succeeds
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub message_id: String,
    pub tracking_id: String,
    pub campaign_id: String,
    pub lead_id: String,
    pub sender_id: String,
    pub user_id: String,
    pub node_id: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
}

/// Live cursor of one running campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ExecutionState {
    pub campaign_id: String,
    pub current_node_id: String,
    /// Lead addressed by the current pass through the flow
    pub lead_id: Option<String>,
    /// Earliest time the current node may run; `None` means immediately
    pub next_run_at: Option<DateTime<Utc>>,
    pub emails_sent: i64,
    pub opens: i64,
    pub clicks: i64,
    pub replies: i64,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    /// Fresh cursor positioned at the flow's entry node
    pub fn at_entry(campaign_id: impl Into<String>, entry_node_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            campaign_id: campaign_id.into(),
            current_node_id: entry_node_id.into(),
            lead_id: None,
            next_run_at: Some(now),
            emails_sent: 0,
            opens: 0,
            clicks: 0,
            replies: 0,
            updated_at: now,
        }
    }

    /// Whether the current node is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at.map_or(true, |at| at <= now)
    }

    pub fn record_engagement(&mut self, kind: EventKind) {
        match kind {
            EventKind::Open => self.opens += 1,
            EventKind::Click => self.clicks += 1,
            EventKind::Reply => self.replies += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn start_is_only_allowed_from_draft_or_paused() {
        assert!(CampaignStatus::Draft.can_start());
        assert!(CampaignStatus::Paused.can_start());
        assert!(!CampaignStatus::Sending.can_start());
        assert!(!CampaignStatus::Completed.can_start());
    }

    #[test]
    fn due_check_honours_next_run_at() {
        let mut state = ExecutionState::at_entry("c1", "n1");
        let now = Utc::now();
        assert!(state.is_due(now + Duration::seconds(1)));

        state.next_run_at = Some(now + Duration::hours(1));
        assert!(!state.is_due(now));

        state.next_run_at = None;
        assert!(state.is_due(now));
    }

    #[test]
    fn engagement_counters_track_kind() {
        let mut state = ExecutionState::at_entry("c1", "n1");
        state.record_engagement(EventKind::Open);
        state.record_engagement(EventKind::Open);
        state.record_engagement(EventKind::Reply);
        assert_eq!((state.opens, state.clicks, state.replies), (2, 0, 1));
    }
}
