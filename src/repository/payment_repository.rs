use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{NewPayment, Payment, PaymentKind, PaymentStatus, RefundRecord, RefundStatus},
    error::{AppError, Result},
    repository::{parse_optional_uuid, parse_uuid, PaymentRepository},
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    booking_id: String,
    kind: String,
    intent_id: String,
    status: String,
    amount_cents: i64,
    currency: String,
    receipt_url: Option<String>,
    refund_status: String,
    refunded_cents: i64,
    pending_edit_id: Option<String>,
    metadata: String,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct RefundRow {
    id: String,
    payment_id: String,
    amount_cents: i64,
    status: String,
}

const PAYMENT_COLUMNS: &str = r#"
    id, booking_id, kind, intent_id, status, amount_cents, currency,
    receipt_url, refund_status, refunded_cents, pending_edit_id, metadata,
    paid_at, created_at, updated_at
"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            booking_id: parse_uuid(&row.booking_id)?,
            kind: Self::parse_kind(&row.kind)?,
            intent_id: row.intent_id,
            status: Self::parse_payment_status(&row.status)?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            receipt_url: row.receipt_url,
            refund_status: Self::parse_refund_status(&row.refund_status)?,
            refunded_cents: row.refunded_cents,
            pending_edit_id: parse_optional_uuid(row.pending_edit_id.as_deref())?,
            metadata: serde_json::from_str(&row.metadata)
                .map_err(|e| AppError::Database(format!("Invalid payment metadata: {}", e)))?,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_kind(s: &str) -> Result<PaymentKind> {
        match s {
            "Initial" => Ok(PaymentKind::Initial),
            "Upcharge" => Ok(PaymentKind::Upcharge),
            _ => Err(AppError::Database(format!("Invalid payment kind: {}", s))),
        }
    }

    fn kind_to_str(kind: &PaymentKind) -> &'static str {
        match kind {
            PaymentKind::Initial => "Initial",
            PaymentKind::Upcharge => "Upcharge",
        }
    }

    fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
        match s {
            "Pending" => Ok(PaymentStatus::Pending),
            "Completed" => Ok(PaymentStatus::Completed),
            "Failed" => Ok(PaymentStatus::Failed),
            "Refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }

    fn payment_status_to_str(status: &PaymentStatus) -> &'static str {
        match status {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }

    fn parse_refund_status(s: &str) -> Result<RefundStatus> {
        match s {
            "NotRefunded" => Ok(RefundStatus::NotRefunded),
            "Pending" => Ok(RefundStatus::Pending),
            "Refunded" => Ok(RefundStatus::Refunded),
            "Failed" => Ok(RefundStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid refund status: {}", s))),
        }
    }

    fn refund_status_to_str(status: &RefundStatus) -> &'static str {
        match status {
            RefundStatus::NotRefunded => "NotRefunded",
            RefundStatus::Pending => "Pending",
            RefundStatus::Refunded => "Refunded",
            RefundStatus::Failed => "Failed",
        }
    }

    async fn fetch_optional(&self, clause: &str, value: String) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE {}", PAYMENT_COLUMNS, clause);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: NewPayment) -> Result<Payment> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let metadata = serde_json::to_string(&payment.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, booking_id, kind, intent_id, status, amount_cents, currency,
                refund_status, refunded_cents, pending_edit_id, metadata,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(payment.booking_id.to_string())
        .bind(Self::kind_to_str(&payment.kind))
        .bind(&payment.intent_id)
        .bind(Self::payment_status_to_str(&PaymentStatus::Pending))
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(Self::refund_status_to_str(&RefundStatus::NotRefunded))
        .bind(payment.pending_edit_id.map(|e| e.to_string()))
        .bind(metadata)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created payment".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        self.fetch_optional("id = ?", id.to_string()).await
    }

    async fn find_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>> {
        self.fetch_optional("intent_id = ?", intent_id.to_string()).await
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE booking_id = ? ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(booking_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    async fn find_latest_pending(&self, booking_id: Uuid, kind: PaymentKind) -> Result<Option<Payment>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE booking_id = ? AND kind = ? AND status = 'Pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(booking_id.to_string())
            .bind(Self::kind_to_str(&kind))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_latest_completed(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE booking_id = ? AND status = 'Completed'
            ORDER BY COALESCE(paid_at, created_at) DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn transition_status(&self, id: Uuid, from: &[PaymentStatus], to: PaymentStatus) -> Result<Option<Payment>> {
        if from.is_empty() {
            return Ok(None);
        }

        let now = Utc::now().naive_utc();

        // If status is completed, also stamp paid_at
        let paid_at_naive = if to == PaymentStatus::Completed {
            Some(now)
        } else {
            None
        };

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE payments
            SET status = ?,
                paid_at = COALESCE(?, paid_at),
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(Self::payment_status_to_str(&to))
            .bind(paid_at_naive)
            .bind(now)
            .bind(id.to_string());
        for status in from {
            query = query.bind(Self::payment_status_to_str(status));
        }

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    async fn set_receipt_url(&self, id: Uuid, receipt_url: &str) -> Result<()> {
        sqlx::query("UPDATE payments SET receipt_url = ?, updated_at = ? WHERE id = ?")
            .bind(receipt_url)
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_refund_state(
        &self,
        id: Uuid,
        refund_status: RefundStatus,
        refunded_cents: i64,
        status: PaymentStatus,
    ) -> Result<Payment> {
        sqlx::query(
            r#"
            UPDATE payments
            SET refund_status = ?,
                refunded_cents = ?,
                status = ?,
                updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(Self::refund_status_to_str(&refund_status))
        .bind(refunded_cents)
        .bind(Self::payment_status_to_str(&status))
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated payment".to_string())
        })
    }

    async fn upsert_refund(&self, refund: &RefundRecord) -> Result<()> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO refunds (id, payment_id, amount_cents, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                amount_cents = excluded.amount_cents,
                status = CASE WHEN refunds.status = 'succeeded' THEN refunds.status ELSE excluded.status END,
                updated_at = excluded.updated_at
            "#
        )
        .bind(&refund.id)
        .bind(refund.payment_id.to_string())
        .bind(refund.amount_cents)
        .bind(&refund.status)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_refunds(&self, payment_id: Uuid) -> Result<Vec<RefundRecord>> {
        let rows = sqlx::query_as::<_, RefundRow>(
            "SELECT id, payment_id, amount_cents, status FROM refunds WHERE payment_id = ? ORDER BY created_at"
        )
        .bind(payment_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RefundRecord {
                    id: row.id,
                    payment_id: parse_uuid(&row.payment_id)?,
                    amount_cents: row.amount_cents,
                    status: row.status,
                })
            })
            .collect()
    }
}
