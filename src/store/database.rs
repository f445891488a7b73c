/// SQLite database bootstrap
///
/// Opens the connection pool and creates the engine schema:
/// - campaigns, lead lists and their attachment
/// - leads and list membership
/// - senders with daily quota counters
/// - flows (JSON definitions), execution states and activities

use crate::error::EngineResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Owner of the engine connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a database URL, creating the file and schema when missing
    pub async fn connect(url: &str) -> EngineResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Failed to create database directory '{}': {}", parent.display(), e);
                }
            }
        }

        tracing::info!("🗄️ Opening database: {}", options.get_filename().display());
        let pool = SqlitePool::connect_with(options).await?;

        let database = Self { pool };
        database.init_schema().await?;
        Ok(database)
    }

    /// Private in-memory database on a single pinned connection
    pub async fn in_memory() -> EngineResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.init_schema().await?;
        Ok(database)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes; safe to call repeatedly
    async fn init_schema(&self) -> EngineResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS lead_lists (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS campaign_lists (
                campaign_id TEXT NOT NULL,
                list_id TEXT NOT NULL,
                PRIMARY KEY (campaign_id, list_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                company TEXT NOT NULL DEFAULT '',
                custom_fields TEXT NOT NULL DEFAULT '{}',
                is_bounced INTEGER NOT NULL DEFAULT 0,
                is_unsubscribed INTEGER NOT NULL DEFAULT 0,
                is_do_not_contact INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS lead_list_members (
                list_id TEXT NOT NULL,
                lead_id TEXT NOT NULL,
                PRIMARY KEY (list_id, lead_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS senders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                email TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                daily_limit INTEGER NOT NULL,
                sent_today INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS flows (
                campaign_id TEXT PRIMARY KEY,
                definition JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS execution_states (
                campaign_id TEXT PRIMARY KEY,
                current_node_id TEXT NOT NULL,
                lead_id TEXT,
                next_run_at TEXT,
                emails_sent INTEGER NOT NULL DEFAULT 0,
                opens INTEGER NOT NULL DEFAULT 0,
                clicks INTEGER NOT NULL DEFAULT 0,
                replies INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                message_id TEXT PRIMARY KEY,
                tracking_id TEXT NOT NULL UNIQUE,
                campaign_id TEXT NOT NULL,
                lead_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                opened_at TEXT,
                open_count INTEGER NOT NULL DEFAULT 0,
                clicked_at TEXT,
                click_count INTEGER NOT NULL DEFAULT 0,
                replied_at TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_activities_campaign_lead ON activities(campaign_id, lead_id)",
            "CREATE INDEX IF NOT EXISTS idx_members_lead ON lead_list_members(lead_id)",
            "CREATE INDEX IF NOT EXISTS idx_senders_user ON senders(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.init_schema().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in ["activities", "campaigns", "execution_states", "flows", "senders"] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }
}
