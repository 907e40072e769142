use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{
        Bookable, BookableKind, CreateBookableRequest, CreatePickupRequest, Pickup, PickupTime,
        Schedule,
    },
    error::{AppError, Result},
    repository::{parse_optional_uuid, parse_uuid, CatalogRepository},
};

#[derive(FromRow)]
struct BookableRow {
    id: String,
    kind: String,
    title: String,
    slug: String,
    currency: String,
    active: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct ScheduleRow {
    id: String,
    bookable_id: String,
    starts_at: NaiveDateTime,
    active: bool,
}

#[derive(FromRow)]
struct PickupRow {
    id: String,
    bookable_id: String,
    schedule_id: Option<String>,
    name: String,
    adult_price_cents: i64,
    child_price_cents: Option<i64>,
    active: bool,
}

#[derive(FromRow)]
struct PickupTimeRow {
    id: String,
    pickup_id: String,
    label: String,
    active: bool,
}

pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_bookable(row: BookableRow) -> Result<Bookable> {
        Ok(Bookable {
            id: parse_uuid(&row.id)?,
            kind: Self::parse_kind(&row.kind)?,
            title: row.title,
            slug: row.slug,
            currency: row.currency,
            active: row.active,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn row_to_schedule(row: ScheduleRow) -> Result<Schedule> {
        Ok(Schedule {
            id: parse_uuid(&row.id)?,
            bookable_id: parse_uuid(&row.bookable_id)?,
            starts_at: DateTime::from_naive_utc_and_offset(row.starts_at, Utc),
            active: row.active,
        })
    }

    fn row_to_pickup(row: PickupRow) -> Result<Pickup> {
        Ok(Pickup {
            id: parse_uuid(&row.id)?,
            bookable_id: parse_uuid(&row.bookable_id)?,
            schedule_id: parse_optional_uuid(row.schedule_id.as_deref())?,
            name: row.name,
            adult_price_cents: row.adult_price_cents,
            child_price_cents: row.child_price_cents,
            active: row.active,
        })
    }

    fn row_to_pickup_time(row: PickupTimeRow) -> Result<PickupTime> {
        Ok(PickupTime {
            id: parse_uuid(&row.id)?,
            pickup_id: parse_uuid(&row.pickup_id)?,
            label: row.label,
            active: row.active,
        })
    }

    pub(crate) fn parse_kind(s: &str) -> Result<BookableKind> {
        match s {
            "Event" => Ok(BookableKind::Event),
            "Tour" => Ok(BookableKind::Tour),
            _ => Err(AppError::Database(format!("Invalid bookable kind: {}", s))),
        }
    }

    pub(crate) fn kind_to_str(kind: &BookableKind) -> &'static str {
        match kind {
            BookableKind::Event => "Event",
            BookableKind::Tour => "Tour",
        }
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn create_bookable(&self, request: CreateBookableRequest) -> Result<Bookable> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO bookables (id, kind, title, slug, currency, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(Self::kind_to_str(&request.kind))
        .bind(&request.title)
        .bind(&request.slug)
        .bind(request.currency.to_uppercase())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_bookable(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created bookable".to_string())
        })
    }

    async fn create_schedule(&self, bookable_id: Uuid, starts_at: DateTime<Utc>) -> Result<Schedule> {
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO schedules (id, bookable_id, starts_at, active, created_at) VALUES (?, ?, ?, 1, ?)"
        )
        .bind(id.to_string())
        .bind(bookable_id.to_string())
        .bind(starts_at.naive_utc())
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        self.find_schedule(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created schedule".to_string())
        })
    }

    async fn create_pickup(&self, request: CreatePickupRequest) -> Result<Pickup> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO pickups (
                id, bookable_id, schedule_id, name,
                adult_price_cents, child_price_cents, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.bookable_id.to_string())
        .bind(request.schedule_id.map(|s| s.to_string()))
        .bind(&request.name)
        .bind(request.adult_price_cents)
        .bind(request.child_price_cents)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        self.find_pickup(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created pickup".to_string())
        })
    }

    async fn create_pickup_time(&self, pickup_id: Uuid, label: &str) -> Result<PickupTime> {
        let id = Uuid::new_v4();

        sqlx::query("INSERT INTO pickup_times (id, pickup_id, label, active) VALUES (?, ?, ?, 1)")
            .bind(id.to_string())
            .bind(pickup_id.to_string())
            .bind(label)
            .execute(&self.pool)
            .await?;

        self.find_pickup_time(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created pickup time".to_string())
        })
    }

    async fn find_bookable(&self, id: Uuid) -> Result<Option<Bookable>> {
        let row = sqlx::query_as::<_, BookableRow>(
            r#"
            SELECT id, kind, title, slug, currency, active, created_at, updated_at
            FROM bookables
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_bookable).transpose()
    }

    async fn find_schedule(&self, id: Uuid) -> Result<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT id, bookable_id, starts_at, active FROM schedules WHERE id = ?"
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_schedule).transpose()
    }

    async fn find_pickup(&self, id: Uuid) -> Result<Option<Pickup>> {
        let row = sqlx::query_as::<_, PickupRow>(
            r#"
            SELECT id, bookable_id, schedule_id, name,
                   adult_price_cents, child_price_cents, active
            FROM pickups
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_pickup).transpose()
    }

    async fn find_pickup_time(&self, id: Uuid) -> Result<Option<PickupTime>> {
        let row = sqlx::query_as::<_, PickupTimeRow>(
            "SELECT id, pickup_id, label, active FROM pickup_times WHERE id = ?"
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_pickup_time).transpose()
    }

    async fn set_schedule_active(&self, id: Uuid, active: bool) -> Result<()> {
        sqlx::query("UPDATE schedules SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_pickup_active(&self, id: Uuid, active: bool) -> Result<()> {
        sqlx::query("UPDATE pickups SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_pickup_prices(&self, id: Uuid, adult_price_cents: i64, child_price_cents: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE pickups SET adult_price_cents = ?, child_price_cents = ? WHERE id = ?")
            .bind(adult_price_cents)
            .bind(child_price_cents)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
