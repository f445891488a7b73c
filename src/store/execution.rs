/// Execution state persistence
///
/// One row per running campaign. Only the campaign's interpreter task writes it after
/// start; the supervisor creates it on start and deletes it on stop.

use crate::error::EngineResult;
use crate::store::types::ExecutionState;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone)]
pub struct ExecutionStore {
    pool: SqlitePool,
}

impl ExecutionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, campaign_id: &str) -> EngineResult<Option<ExecutionState>> {
        let state = sqlx::query_as::<_, ExecutionState>(
            r#"
            SELECT campaign_id, current_node_id, lead_id, next_run_at,
                   emails_sent, opens, clicks, replies, updated_at
            FROM execution_states
            WHERE campaign_id = ?
            "#,
        )
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    /// Insert or overwrite the state row, stamping `updated_at`
    pub async fn save(&self, state: &ExecutionState) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_states
                (campaign_id, current_node_id, lead_id, next_run_at,
                 emails_sent, opens, clicks, replies, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(campaign_id) DO UPDATE SET
                current_node_id = excluded.current_node_id,
                lead_id = excluded.lead_id,
                next_run_at = excluded.next_run_at,
                emails_sent = excluded.emails_sent,
                opens = excluded.opens,
                clicks = excluded.clicks,
                replies = excluded.replies,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.campaign_id)
        .bind(&state.current_node_id)
        .bind(&state.lead_id)
        .bind(state.next_run_at)
        .bind(state.emails_sent)
        .bind(state.opens)
        .bind(state.clicks)
        .bind(state.replies)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, campaign_id: &str) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM execution_states WHERE campaign_id = ?")
            .bind(campaign_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
