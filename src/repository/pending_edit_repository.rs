use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{NewPendingEdit, PendingEdit, PendingEditStatus, Selection},
    error::{AppError, Result},
    repository::{parse_uuid, PendingEditRepository},
};

#[derive(FromRow)]
struct PendingEditRow {
    id: String,
    booking_id: String,
    schedule_id: String,
    pickup_id: String,
    pickup_time_id: String,
    adult_count: i64,
    child_count: i64,
    base_total_cents: i64,
    quoted_total_cents: i64,
    currency: String,
    status: String,
    failure_reason: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePendingEditRepository {
    pool: SqlitePool,
}

impl SqlitePendingEditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_edit(row: PendingEditRow) -> Result<PendingEdit> {
        Ok(PendingEdit {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            selection: Selection {
                schedule_id: parse_uuid(&row.schedule_id)?,
                pickup_id: parse_uuid(&row.pickup_id)?,
                pickup_time_id: parse_uuid(&row.pickup_time_id)?,
            },
            adult_count: row.adult_count,
            child_count: row.child_count,
            base_total_cents: row.base_total_cents,
            quoted_total_cents: row.quoted_total_cents,
            currency: row.currency,
            status: Self::parse_status(&row.status)?,
            failure_reason: row.failure_reason,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<PendingEditStatus> {
        match s {
            "AwaitingPayment" => Ok(PendingEditStatus::AwaitingPayment),
            "Applied" => Ok(PendingEditStatus::Applied),
            "Failed" => Ok(PendingEditStatus::Failed),
            "Abandoned" => Ok(PendingEditStatus::Abandoned),
            _ => Err(AppError::Database(format!("Invalid pending edit status: {}", s))),
        }
    }

    fn status_to_str(status: &PendingEditStatus) -> &'static str {
        match status {
            PendingEditStatus::AwaitingPayment => "AwaitingPayment",
            PendingEditStatus::Applied => "Applied",
            PendingEditStatus::Failed => "Failed",
            PendingEditStatus::Abandoned => "Abandoned",
        }
    }
}

#[async_trait]
impl PendingEditRepository for SqlitePendingEditRepository {
    async fn create(&self, edit: NewPendingEdit) -> Result<PendingEdit> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO pending_edits (
                id, booking_id, schedule_id, pickup_id, pickup_time_id,
                adult_count, child_count, base_total_cents, quoted_total_cents,
                currency, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(edit.booking_id.to_string())
        .bind(edit.selection.schedule_id.to_string())
        .bind(edit.selection.pickup_id.to_string())
        .bind(edit.selection.pickup_time_id.to_string())
        .bind(edit.adult_count)
        .bind(edit.child_count)
        .bind(edit.base_total_cents)
        .bind(edit.quoted.total_cents)
        .bind(&edit.quoted.currency)
        .bind(Self::status_to_str(&PendingEditStatus::AwaitingPayment))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created pending edit".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PendingEdit>> {
        let row = sqlx::query_as::<_, PendingEditRow>(
            r#"
            SELECT id, booking_id, schedule_id, pickup_id, pickup_time_id,
                   adult_count, child_count, base_total_cents, quoted_total_cents,
                   currency, status, failure_reason, created_at, updated_at
            FROM pending_edits
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_edit).transpose()
    }

    async fn list_awaiting_payment(&self, booking_id: Uuid) -> Result<Vec<PendingEdit>> {
        let rows = sqlx::query_as::<_, PendingEditRow>(
            r#"
            SELECT id, booking_id, schedule_id, pickup_id, pickup_time_id,
                   adult_count, child_count, base_total_cents, quoted_total_cents,
                   currency, status, failure_reason, created_at, updated_at
            FROM pending_edits
            WHERE booking_id = ? AND status = ?
            ORDER BY created_at
            "#
        )
        .bind(booking_id.to_string())
        .bind(Self::status_to_str(&PendingEditStatus::AwaitingPayment))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_edit).collect()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[PendingEditStatus],
        to: PendingEditStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<PendingEdit>> {
        if from.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE pending_edits
            SET status = ?,
                failure_reason = COALESCE(?, failure_reason),
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(Self::status_to_str(&to))
            .bind(failure_reason)
            .bind(Utc::now().naive_utc())
            .bind(id.to_string());
        for status in from {
            query = query.bind(Self::status_to_str(status));
        }

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }
}
