/// SQLite persistence layer for flow storage
///
/// Flows are stored as JSON, one row per campaign, the same way they are edited.

use crate::error::EngineResult;
use crate::flow::types::Flow;
use sqlx::{sqlite::SqlitePool, Row};

/// SQLite-based flow storage
#[derive(Debug, Clone)]
pub struct FlowStorage {
    pool: SqlitePool,
}

impl FlowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a new flow or replace the campaign's existing one
    pub async fn save_flow(&self, flow: &Flow) -> EngineResult<()> {
        let definition_json = serde_json::to_string(flow)?;

        sqlx::query(
            r#"
            INSERT INTO flows (campaign_id, definition, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(campaign_id) DO UPDATE SET
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&flow.campaign_id)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve the flow attached to a campaign
    pub async fn get_flow(&self, campaign_id: &str) -> EngineResult<Option<Flow>> {
        let row = sqlx::query("SELECT definition FROM flows WHERE campaign_id = ?")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                Ok(Some(serde_json::from_str(&definition_json)?))
            }
            None => Ok(None),
        }
    }

    pub async fn delete_flow(&self, campaign_id: &str) -> EngineResult<bool> {
        let result = sqlx::query("DELETE FROM flows WHERE campaign_id = ?")
            .bind(campaign_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
