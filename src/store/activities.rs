/// Activity ledger
///
/// One row per successful send, keyed by the message id the mailer returned.
/// Engagement timestamps are set once; counters grow on every reported event,
/// so replayed webhooks bump `open_count` but never move `opened_at`.

use crate::error::{EngineError, EngineResult};
use crate::store::types::{Activity, EventKind, NewActivity};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

const ACTIVITY_COLUMNS: &str = "message_id, tracking_id, campaign_id, lead_id, sender_id, user_id, \
     node_id, subject, sent_at, opened_at, open_count, clicked_at, click_count, replied_at";

#[derive(Debug, Clone)]
pub struct ActivityLedger {
    pool: SqlitePool,
}

impl ActivityLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, activity: &NewActivity) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activities
                (message_id, tracking_id, campaign_id, lead_id, sender_id, user_id, node_id, subject, sent_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&activity.message_id)
        .bind(&activity.tracking_id)
        .bind(&activity.campaign_id)
        .bind(&activity.lead_id)
        .bind(&activity.sender_id)
        .bind(&activity.user_id)
        .bind(&activity.node_id)
        .bind(&activity.subject)
        .bind(activity.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn by_message_id(&self, message_id: &str) -> EngineResult<Option<Activity>> {
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE message_id = ?");
        let activity = sqlx::query_as::<_, Activity>(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(activity)
    }

    pub async fn by_tracking_id(&self, tracking_id: &str) -> EngineResult<Option<Activity>> {
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE tracking_id = ?");
        let activity = sqlx::query_as::<_, Activity>(&sql)
            .bind(tracking_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(activity)
    }

    /// Apply an engagement event and return the updated row
    pub async fn apply_event(
        &self,
        kind: EventKind,
        message_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<Activity> {
        let update = match kind {
            EventKind::Open => {
                "UPDATE activities SET opened_at = COALESCE(opened_at, ?), open_count = open_count + 1 WHERE message_id = ?"
            }
            EventKind::Click => {
                "UPDATE activities SET clicked_at = COALESCE(clicked_at, ?), click_count = click_count + 1 WHERE message_id = ?"
            }
            EventKind::Reply => {
                "UPDATE activities SET replied_at = COALESCE(replied_at, ?) WHERE message_id = ?"
            }
        };

        let result = sqlx::query(update)
            .bind(at)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("activity", message_id));
        }

        self.by_message_id(message_id)
            .await?
            .ok_or_else(|| EngineError::not_found("activity", message_id))
    }

    /// All sends of a campaign, oldest first
    pub async fn for_campaign(&self, campaign_id: &str) -> EngineResult<Vec<Activity>> {
        let sql = format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE campaign_id = ? ORDER BY sent_at, rowid"
        );
        let activities = sqlx::query_as::<_, Activity>(&sql)
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use chrono::Duration;

    fn new_activity(message_id: &str) -> NewActivity {
        NewActivity {
            message_id: message_id.to_string(),
            tracking_id: format!("t-{message_id}"),
            campaign_id: "c1".into(),
            lead_id: "l1".into(),
            sender_id: "s1".into(),
            user_id: "u1".into(),
            node_id: "hello".into(),
            subject: "Hi".into(),
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replayed_open_keeps_first_timestamp_but_counts_again() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ActivityLedger::new(db.pool().clone());
        ledger.record(&new_activity("m-1")).await.unwrap();

        let first = Utc::now();
        let later = first + Duration::minutes(5);
        let once = ledger.apply_event(EventKind::Open, "m-1", first).await.unwrap();
        let twice = ledger.apply_event(EventKind::Open, "m-1", later).await.unwrap();

        assert_eq!(once.open_count, 1);
        assert_eq!(twice.open_count, 2);
        assert_eq!(twice.opened_at, once.opened_at);
        assert!(twice.clicked_at.is_none());
    }

    #[tokio::test]
    async fn reply_is_set_once_without_counter() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ActivityLedger::new(db.pool().clone());
        ledger.record(&new_activity("m-1")).await.unwrap();

        let at = Utc::now();
        let replied = ledger.apply_event(EventKind::Reply, "m-1", at).await.unwrap();
        let again = ledger
            .apply_event(EventKind::Reply, "m-1", at + Duration::hours(1))
            .await
            .unwrap();
        assert!(replied.replied_at.is_some());
        assert_eq!(again.replied_at, replied.replied_at);
    }

    #[tokio::test]
    async fn unknown_message_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ActivityLedger::new(db.pool().clone());

        assert!(matches!(
            ledger.apply_event(EventKind::Click, "ghost", Utc::now()).await,
            Err(EngineError::NotFound { entity: "activity", .. })
        ));
    }

    #[tokio::test]
    async fn lookup_by_tracking_id() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ActivityLedger::new(db.pool().clone());
        ledger.record(&new_activity("m-1")).await.unwrap();
        ledger.record(&new_activity("m-2")).await.unwrap();

        let found = ledger.by_tracking_id("t-m-2").await.unwrap().unwrap();
        assert_eq!(found.message_id, "m-2");
        assert_eq!(ledger.for_campaign("c1").await.unwrap().len(), 2);
    }
}
