use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{DeliveryStatus, NotificationLogEntry},
    error::{AppError, Result},
    repository::{parse_optional_uuid, parse_uuid, NotificationLogRepository},
};

#[derive(FromRow)]
struct NotificationLogRow {
    id: String,
    booking_id: String,
    outbox_event_id: Option<String>,
    channel: String,
    recipient: String,
    template: String,
    status: String,
    error: Option<String>,
    created_at: NaiveDateTime,
}

pub struct SqliteNotificationLogRepository {
    pool: SqlitePool,
}

impl SqliteNotificationLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_status(s: &str) -> Result<DeliveryStatus> {
        match s {
            "Sent" => Ok(DeliveryStatus::Sent),
            "Failed" => Ok(DeliveryStatus::Failed),
            "Skipped" => Ok(DeliveryStatus::Skipped),
            _ => Err(AppError::Database(format!("Invalid delivery status: {}", s))),
        }
    }

    fn status_to_str(status: &DeliveryStatus) -> &'static str {
        match status {
            DeliveryStatus::Sent => "Sent",
            DeliveryStatus::Failed => "Failed",
            DeliveryStatus::Skipped => "Skipped",
        }
    }
}

#[async_trait]
impl NotificationLogRepository for SqliteNotificationLogRepository {
    async fn record(&self, entry: NotificationLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_log (
                id, booking_id, outbox_event_id, channel, recipient,
                template, status, error, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(entry.id.to_string())
        .bind(entry.booking_id.to_string())
        .bind(entry.outbox_event_id.map(|id| id.to_string()))
        .bind(&entry.channel)
        .bind(&entry.recipient)
        .bind(&entry.template)
        .bind(Self::status_to_str(&entry.status))
        .bind(&entry.error)
        .bind(entry.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> Result<Vec<NotificationLogEntry>> {
        let rows = sqlx::query_as::<_, NotificationLogRow>(
            r#"
            SELECT id, booking_id, outbox_event_id, channel, recipient,
                   template, status, error, created_at
            FROM notification_log
            WHERE booking_id = ?
            ORDER BY created_at
            "#
        )
        .bind(booking_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(NotificationLogEntry {
                    id: parse_uuid(&row.id)?,
                    booking_id: parse_uuid(&row.booking_id)?,
                    outbox_event_id: parse_optional_uuid(row.outbox_event_id.as_deref())?,
                    channel: row.channel,
                    recipient: row.recipient,
                    template: row.template,
                    status: Self::parse_status(&row.status)?,
                    error: row.error,
                    created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
                })
            })
            .collect()
    }
}
