use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    error::Result,
    repository::WebhookEventRepository,
};

/// Remembers provider event ids whose handling completed, so at-least-once
/// redeliveries of the same event are acknowledged without work.
pub struct SqliteWebhookEventRepository {
    pool: SqlitePool,
}

impl SqliteWebhookEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for SqliteWebhookEventRepository {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM webhook_events WHERE event_id = ?"
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn mark_processed(&self, event_id: &str, event_type: &str, outcome: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, outcome, processed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(event_id) DO NOTHING
            "#
        )
        .bind(event_id)
        .bind(event_type)
        .bind(outcome)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
