use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{DomainEventKind, NewDomainEvent, OutboxEvent, OutboxStatus},
    error::{AppError, Result},
    repository::{parse_uuid, OutboxRepository},
};

#[derive(FromRow)]
struct OutboxRow {
    id: String,
    booking_id: String,
    kind: String,
    payload: String,
    dedupe_key: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: NaiveDateTime,
    dispatched_at: Option<NaiveDateTime>,
}

const OUTBOX_COLUMNS: &str = r#"
    id, booking_id, kind, payload, dedupe_key, status,
    attempts, last_error, created_at, dispatched_at
"#;

pub struct SqliteOutboxRepository {
    pool: SqlitePool,
}

impl SqliteOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: OutboxRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            kind: DomainEventKind::from_str(&row.kind)
                .ok_or_else(|| AppError::Database(format!("Invalid outbox event kind: {}", row.kind)))?,
            payload: serde_json::from_str(&row.payload)
                .map_err(|e| AppError::Database(format!("Invalid outbox payload: {}", e)))?,
            dedupe_key: row.dedupe_key,
            status: Self::parse_status(&row.status)?,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            dispatched_at: row.dispatched_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
        })
    }

    fn parse_status(s: &str) -> Result<OutboxStatus> {
        match s {
            "Pending" => Ok(OutboxStatus::Pending),
            "Processing" => Ok(OutboxStatus::Processing),
            "Dispatched" => Ok(OutboxStatus::Dispatched),
            "Failed" => Ok(OutboxStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid outbox status: {}", s))),
        }
    }
}

#[async_trait]
impl OutboxRepository for SqliteOutboxRepository {
    async fn record(&self, event: NewDomainEvent) -> Result<bool> {
        let payload = serde_json::to_string(&event.payload)?;

        let result = sqlx::query(
            r#"
            INSERT INTO outbox_events (id, booking_id, kind, payload, dedupe_key, status, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, 'Pending', 0, ?)
            ON CONFLICT(dedupe_key) DO NOTHING
            "#
        )
        .bind(Uuid::new_v4().to_string())
        .bind(event.booking_id.to_string())
        .bind(event.kind.as_str())
        .bind(payload)
        .bind(&event.dedupe_key)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let sql = format!(
            "SELECT {} FROM outbox_events WHERE status = 'Pending' ORDER BY created_at LIMIT ?",
            OUTBOX_COLUMNS
        );
        let rows = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(Self::row_to_event)
            .collect()
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'Processing', attempts = attempts + 1
            WHERE id = ? AND status = 'Pending'
            "#
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_dispatched(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET status = 'Dispatched', dispatched_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_events SET status = 'Failed', last_error = ?, dispatched_at = ? WHERE id = ?"
        )
        .bind(error)
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> Result<Vec<OutboxEvent>> {
        let sql = format!(
            "SELECT {} FROM outbox_events WHERE booking_id = ? ORDER BY created_at",
            OUTBOX_COLUMNS
        );
        let rows = sqlx::query_as::<_, OutboxRow>(&sql)
            .bind(booking_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(Self::row_to_event)
            .collect()
    }
}
