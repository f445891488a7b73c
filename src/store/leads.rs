/// Lead selection
///
/// Answers "who is next" for a campaign. A lead is eligible when it belongs to a list
/// attached to the campaign, carries no exclusion flag, and has no unreplied activity
/// in that campaign (repliers may be re-entered). Import and unsubscribe flows live
/// elsewhere; the write helpers here only maintain membership and flags.

use crate::error::{EngineError, EngineResult};
use crate::store::types::Lead;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::types::Json;

const LEAD_COLUMNS: &str = "l.id, l.email, l.first_name, l.last_name, l.company, l.custom_fields, \
     l.is_bounced, l.is_unsubscribed, l.is_do_not_contact";

/// Fields needed to create a lead
#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub custom_fields: Value,
}

/// Exclusion flags of a lead
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadFlags {
    pub is_bounced: bool,
    pub is_unsubscribed: bool,
    pub is_do_not_contact: bool,
}

#[derive(Debug, Clone)]
pub struct LeadSelector {
    pool: SqlitePool,
}

impl LeadSelector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Next eligible lead for the campaign, one per call, no ordering guarantee
    pub async fn next_lead(&self, campaign_id: &str) -> EngineResult<Option<Lead>> {
        let sql = format!(
            r#"
            SELECT {LEAD_COLUMNS}
            FROM leads l
            JOIN lead_list_members m ON m.lead_id = l.id
            JOIN campaign_lists cl ON cl.list_id = m.list_id
            WHERE cl.campaign_id = ?
              AND l.is_bounced = 0
              AND l.is_unsubscribed = 0
              AND l.is_do_not_contact = 0
              AND NOT EXISTS (
                  SELECT 1 FROM activities a
                  WHERE a.campaign_id = cl.campaign_id
                    AND a.lead_id = l.id
                    AND a.replied_at IS NULL
              )
            LIMIT 1
            "#
        );

        sqlx::query_as::<_, Lead>(&sql)
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::LeadFetch(e.to_string()))
    }

    /// Whether another lead could start a pass through the flow
    pub async fn has_remaining(&self, campaign_id: &str) -> EngineResult<bool> {
        Ok(self.next_lead(campaign_id).await?.is_some())
    }

    /// The lead with the given id, if it exists and carries no exclusion flag
    pub async fn eligible_lead(&self, lead_id: &str) -> EngineResult<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads l WHERE l.id = ?");
        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::LeadFetch(e.to_string()))?;

        Ok(lead.filter(|lead| !lead.is_excluded()))
    }

    pub async fn insert_lead(&self, lead: &NewLead) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO leads (id, email, first_name, last_name, company, custom_fields)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lead.id)
        .bind(&lead.email)
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.company)
        .bind(Json(&lead.custom_fields))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn create_list(&self, list_id: &str, user_id: &str, name: &str) -> EngineResult<()> {
        sqlx::query("INSERT INTO lead_lists (id, user_id, name) VALUES (?, ?, ?)")
            .bind(list_id)
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn add_to_list(&self, list_id: &str, lead_id: &str) -> EngineResult<()> {
        sqlx::query("INSERT OR IGNORE INTO lead_list_members (list_id, lead_id) VALUES (?, ?)")
            .bind(list_id)
            .bind(lead_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Overwrite the exclusion flags of a lead
    pub async fn set_flags(&self, lead_id: &str, flags: LeadFlags) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET is_bounced = ?, is_unsubscribed = ?, is_do_not_contact = ?
            WHERE id = ?
            "#,
        )
        .bind(flags.is_bounced)
        .bind(flags.is_unsubscribed)
        .bind(flags.is_do_not_contact)
        .bind(lead_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::not_found("lead", lead_id));
        }
        Ok(())
    }
}
