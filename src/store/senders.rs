/// Sender capacity allocation
///
/// Greedy largest-remaining-capacity policy over a user's active senders. Reservations
/// are a single conditional UPDATE, so two campaigns of the same user can never push a
/// sender past its daily limit.

use crate::error::{EngineError, EngineResult};
use crate::store::types::Sender;
use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone)]
pub struct SenderAllocator {
    pool: SqlitePool,
}

impl SenderAllocator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Active sender with the most remaining quota, without reserving it
    ///
    /// Read-only counterpart of [`reserve`](Self::reserve); the interpreter always
    /// reserves, this is for inspecting which sender would be chosen next.
    pub async fn pick(&self, user_id: &str) -> EngineResult<Sender> {
        let sender = sqlx::query_as::<_, Sender>(
            r#"
            SELECT id, user_id, email, name, daily_limit, sent_today, is_active
            FROM senders
            WHERE user_id = ? AND is_active = 1
            ORDER BY daily_limit - sent_today DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match sender {
            Some(sender) if sender.remaining() > 0 => Ok(sender),
            _ => Err(EngineError::CapacityExhausted(user_id.to_string())),
        }
    }

    /// Pick the sender with the most remaining quota and consume one unit of it
    ///
    /// The returned row already reflects the reservation.
    pub async fn reserve(&self, user_id: &str) -> EngineResult<Sender> {
        let sender = sqlx::query_as::<_, Sender>(
            r#"
            UPDATE senders
            SET sent_today = sent_today + 1
            WHERE id = (
                SELECT id FROM senders
                WHERE user_id = ? AND is_active = 1 AND sent_today < daily_limit
                ORDER BY daily_limit - sent_today DESC
                LIMIT 1
            )
            AND sent_today < daily_limit
            RETURNING id, user_id, email, name, daily_limit, sent_today, is_active
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match sender {
            Some(sender) => {
                tracing::debug!(
                    sender_id = %sender.id,
                    remaining = sender.remaining(),
                    "Reserved sender capacity"
                );
                Ok(sender)
            }
            None => Err(EngineError::CapacityExhausted(user_id.to_string())),
        }
    }

    /// Return a reservation that did not result in a send
    pub async fn release(&self, sender_id: &str) -> EngineResult<()> {
        sqlx::query("UPDATE senders SET sent_today = MAX(sent_today - 1, 0) WHERE id = ?")
            .bind(sender_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Zero every sender's daily counter; returns the number of senders touched
    pub async fn reset_daily(&self) -> EngineResult<u64> {
        let result = sqlx::query("UPDATE senders SET sent_today = 0 WHERE sent_today <> 0")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn get(&self, sender_id: &str) -> EngineResult<Option<Sender>> {
        let sender = sqlx::query_as::<_, Sender>(
            "SELECT id, user_id, email, name, daily_limit, sent_today, is_active FROM senders WHERE id = ?",
        )
        .bind(sender_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sender)
    }

    pub async fn insert(&self, sender: &Sender) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO senders (id, user_id, email, name, daily_limit, sent_today, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sender.id)
        .bind(&sender.user_id)
        .bind(&sender.email)
        .bind(&sender.name)
        .bind(sender.daily_limit)
        .bind(sender.sent_today)
        .bind(sender.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sender(id: &str, user_id: &str, daily_limit: i64, sent_today: i64) -> Sender {
    Sender {
        id: id.to_string(),
        user_id: user_id.to_string(),
        email: format!("{id}@outbound.example"),
        name: id.to_uppercase(),
        daily_limit,
        sent_today,
        is_active: true,
    }
}
