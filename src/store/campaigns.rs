/// Campaign rows and their lead list attachments

use crate::error::{EngineError, EngineResult};
use crate::store::types::{Campaign, CampaignStatus};
use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone)]
pub struct CampaignStore {
    pool: SqlitePool,
}

impl CampaignStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a draft campaign
    pub async fn create(&self, id: &str, user_id: &str, name: &str) -> EngineResult<Campaign> {
        sqlx::query("INSERT INTO campaigns (id, user_id, name, status) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(user_id)
            .bind(name)
            .bind(CampaignStatus::Draft)
            .execute(&self.pool)
            .await?;

        self.require(id).await
    }

    pub async fn get(&self, id: &str) -> EngineResult<Option<Campaign>> {
        let campaign = sqlx::query_as::<_, Campaign>(
            "SELECT id, user_id, name, status FROM campaigns WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(campaign)
    }

    /// Like `get`, but absence is an error
    pub async fn require(&self, id: &str) -> EngineResult<Campaign> {
        self.get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("campaign", id))
    }

    pub async fn set_status(&self, id: &str, status: CampaignStatus) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE campaigns SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("campaign", id));
        }

        tracing::info!(campaign_id = id, %status, "Campaign status changed");
        Ok(())
    }

    /// Campaign ids currently in the given status
    pub async fn ids_with_status(&self, status: CampaignStatus) -> EngineResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM campaigns WHERE status = ?")
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Bind a lead list to a campaign; re-attaching is a no-op
    pub async fn attach_list(&self, campaign_id: &str, list_id: &str) -> EngineResult<()> {
        sqlx::query("INSERT OR IGNORE INTO campaign_lists (campaign_id, list_id) VALUES (?, ?)")
            .bind(campaign_id)
            .bind(list_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
