use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{Booking, BookingChanges, BookingStatus, NewBooking, PricingBreakdown},
    error::{AppError, Result},
    repository::{parse_uuid, BookingRepository, SqliteCatalogRepository},
};

#[derive(FromRow)]
struct BookingRow {
    id: String,
    reference: String,
    user_id: String,
    contact_name: String,
    contact_email: String,
    booking_type: String,
    bookable_id: String,
    schedule_id: String,
    pickup_id: String,
    pickup_time_id: String,
    adult_count: i64,
    child_count: i64,
    adult_price_cents: i64,
    child_price_cents: Option<i64>,
    adult_total_cents: i64,
    child_total_cents: i64,
    total_cents: i64,
    currency: String,
    status: String,
    notes: String,
    review_followup_id: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const BOOKING_COLUMNS: &str = r#"
    b.id, b.reference, b.user_id, b.contact_name, b.contact_email,
    b.booking_type, b.bookable_id, b.schedule_id, b.pickup_id, b.pickup_time_id,
    b.adult_count, b.child_count, b.adult_price_cents, b.child_price_cents,
    b.adult_total_cents, b.child_total_cents, b.total_cents, b.currency,
    b.status, b.notes, b.review_followup_id, b.created_at, b.updated_at
"#;

pub struct SqliteBookingRepository {
    pool: SqlitePool,
}

impl SqliteBookingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: BookingRow) -> Result<Booking> {
        Ok(Booking {
            id: parse_uuid(&row.id)?,
            reference: row.reference,
            user_id: parse_uuid(&row.user_id)?,
            contact_name: row.contact_name,
            contact_email: row.contact_email,
            booking_type: SqliteCatalogRepository::parse_kind(&row.booking_type)?,
            bookable_id: parse_uuid(&row.bookable_id)?,
            schedule_id: parse_uuid(&row.schedule_id)?,
            pickup_id: parse_uuid(&row.pickup_id)?,
            pickup_time_id: parse_uuid(&row.pickup_time_id)?,
            adult_count: row.adult_count,
            child_count: row.child_count,
            pricing: PricingBreakdown {
                adult_price_cents: row.adult_price_cents,
                child_price_cents: row.child_price_cents,
                adult_total_cents: row.adult_total_cents,
                child_total_cents: row.child_total_cents,
                total_cents: row.total_cents,
                currency: row.currency,
            },
            status: Self::parse_status(&row.status)?,
            notes: row.notes,
            review_followup_id: row.review_followup_id,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_status(s: &str) -> Result<BookingStatus> {
        match s {
            "Pending" => Ok(BookingStatus::Pending),
            "Confirmed" => Ok(BookingStatus::Confirmed),
            "Cancelled" => Ok(BookingStatus::Cancelled),
            "Completed" => Ok(BookingStatus::Completed),
            _ => Err(AppError::Database(format!("Invalid booking status: {}", s))),
        }
    }

    fn status_to_str(status: &BookingStatus) -> &'static str {
        match status {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Completed => "Completed",
        }
    }

    async fn fetch_one_where(&self, clause: &str, value: String) -> Result<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings b WHERE {}", BOOKING_COLUMNS, clause);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_booking).transpose()
    }
}

#[async_trait]
impl BookingRepository for SqliteBookingRepository {
    async fn create(&self, booking: NewBooking) -> Result<Booking> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, reference, user_id, contact_name, contact_email,
                booking_type, bookable_id, schedule_id, pickup_id, pickup_time_id,
                adult_count, child_count, adult_price_cents, child_price_cents,
                adult_total_cents, child_total_cents, total_cents, currency,
                status, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&booking.reference)
        .bind(booking.user_id.to_string())
        .bind(&booking.contact_name)
        .bind(&booking.contact_email)
        .bind(SqliteCatalogRepository::kind_to_str(&booking.booking_type))
        .bind(booking.bookable_id.to_string())
        .bind(booking.selection.schedule_id.to_string())
        .bind(booking.selection.pickup_id.to_string())
        .bind(booking.selection.pickup_time_id.to_string())
        .bind(booking.adult_count)
        .bind(booking.child_count)
        .bind(booking.pricing.adult_price_cents)
        .bind(booking.pricing.child_price_cents)
        .bind(booking.pricing.adult_total_cents)
        .bind(booking.pricing.child_total_cents)
        .bind(booking.pricing.total_cents)
        .bind(&booking.pricing.currency)
        .bind(Self::status_to_str(&BookingStatus::Pending))
        .bind(&booking.notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created booking".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>> {
        self.fetch_one_where("b.id = ?", id.to_string()).await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>> {
        self.fetch_one_where("b.reference = ?", reference.to_string()).await
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings b WHERE b.user_id = ? ORDER BY b.created_at DESC",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(Self::row_to_booking)
            .collect()
    }

    async fn transition_status(&self, id: Uuid, from: &[BookingStatus], to: BookingStatus) -> Result<Option<Booking>> {
        if from.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(Self::status_to_str(&to))
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

    async fn apply_changes(&self, id: Uuid, changes: &BookingChanges) -> Result<Booking> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET schedule_id = ?,
                pickup_id = ?,
                pickup_time_id = ?,
                adult_count = ?,
                child_count = ?,
                adult_price_cents = ?,
                child_price_cents = ?,
                adult_total_cents = ?,
                child_total_cents = ?,
                total_cents = ?,
                currency = ?,
                updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(changes.selection.schedule_id.to_string())
        .bind(changes.selection.pickup_id.to_string())
        .bind(changes.selection.pickup_time_id.to_string())
        .bind(changes.adult_count)
        .bind(changes.child_count)
        .bind(changes.pricing.adult_price_cents)
        .bind(changes.pricing.child_price_cents)
        .bind(changes.pricing.adult_total_cents)
        .bind(changes.pricing.child_total_cents)
        .bind(changes.pricing.total_cents)
        .bind(&changes.pricing.currency)
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Booking {} not found", id)));
        }

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated booking".to_string())
        })
    }

    async fn append_note(&self, id: Uuid, note: &str) -> Result<()> {
        let stamped = format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M UTC"), note);

        sqlx::query(
            r#"
            UPDATE bookings
            SET notes = CASE WHEN notes = '' THEN ? ELSE notes || char(10) || ? END,
                updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(&stamped)
        .bind(&stamped)
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_review_followup(&self, id: Uuid, followup_id: &str) -> Result<()> {
        sqlx::query("UPDATE bookings SET review_followup_id = ?, updated_at = ? WHERE id = ?")
            .bind(followup_id)
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_confirmed_starting_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM bookings b
            JOIN schedules s ON s.id = b.schedule_id
            WHERE b.status = 'Confirmed' AND s.starts_at < ?
            ORDER BY s.starts_at
            "#,
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(cutoff.naive_utc())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(Self::row_to_booking)
            .collect()
    }
}
