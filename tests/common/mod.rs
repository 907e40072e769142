#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use uuid::Uuid;

use tourdesk::{
    domain::{
        Bookable, BookableKind, Booking, CreateBookableRequest, CreateBookingRequest,
        CreatePickupRequest, EditBookingRequest, Pickup, PickupTime, Schedule,
    },
    payments::{FakePaymentGateway, PaymentGateway, WebhookEvent},
    repository::CatalogRepository,
    service::{ReconcileOutcome, ServiceContext},
};

pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    // One connection, otherwise every connection gets its own in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub struct Catalog {
    pub tour: Bookable,
    pub schedule: Schedule,
    pub later_schedule: Schedule,
    pub past_schedule: Schedule,
    /// 50.00 adult / 25.00 child
    pub harbour: Pickup,
    pub harbour_time: PickupTime,
    /// 80.00 adult / 40.00 child
    pub station: Pickup,
    pub station_time: PickupTime,
    /// 30.00 adult / 15.00 child
    pub village: Pickup,
    pub village_time: PickupTime,
}

pub struct TestApp {
    pub pool: SqlitePool,
    pub ctx: Arc<ServiceContext>,
    pub gateway: Arc<FakePaymentGateway>,
    pub catalog: Catalog,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        let pool = test_pool().await?;
        let gateway = Arc::new(FakePaymentGateway::new());
        let dyn_gateway: Arc<dyn PaymentGateway> = gateway.clone();
        let ctx = Arc::new(ServiceContext::new(pool.clone(), Some(dyn_gateway)));
        let catalog = seed_catalog(&ctx).await?;
        Ok(Self { pool, ctx, gateway, catalog })
    }

    pub fn create_request(&self, adults: i64, children: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            bookable_id: Some(self.catalog.tour.id),
            schedule_id: Some(self.catalog.schedule.id),
            pickup_location_id: Some(self.catalog.harbour.id),
            pickup_time_id: Some(self.catalog.harbour_time.id),
            adult_count: adults,
            child_count: children,
            contact_name: "Ana Silva".to_string(),
            contact_email: "ana@example.com".to_string(),
            notes: None,
        }
    }

    pub fn edit_to(&self, pickup: &Pickup, time: &PickupTime, adults: i64, children: i64) -> EditBookingRequest {
        EditBookingRequest {
            schedule_id: self.catalog.schedule.id,
            pickup_location_id: pickup.id,
            pickup_time_id: time.id,
            adult_count: adults,
            child_count: children,
        }
    }

    pub async fn deliver(&self, payload: serde_json::Value) -> anyhow::Result<ReconcileOutcome> {
        let reconciler = self
            .ctx
            .reconciler
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("reconciler not configured"))?;
        let event = WebhookEvent::parse(&payload.to_string())?;
        Ok(reconciler.handle(event).await?)
    }

    /// Books 2 adults at the harbour pickup (100.00) and pays for it.
    pub async fn confirmed_booking(&self) -> anyhow::Result<(Booking, String)> {
        let booking = self
            .ctx
            .booking_service
            .create_booking(Uuid::new_v4(), self.create_request(2, 0))
            .await?;
        let intent = self
            .ctx
            .booking_service
            .initiate_payment(booking.id, booking.pricing.total_cents)
            .await?;

        let outcome = self
            .deliver(intent_event(
                "evt_confirm",
                "payment_intent.succeeded",
                &intent.payment_intent_id,
                booking.pricing.total_cents,
                json!({ "bookingId": booking.id.to_string() }),
            ))
            .await?;
        assert_eq!(outcome, ReconcileOutcome::Processed);

        let booking = self.ctx.booking_service.get_booking(booking.id).await?;
        Ok((booking, intent.payment_intent_id))
    }
}

pub async fn seed_catalog(ctx: &ServiceContext) -> anyhow::Result<Catalog> {
    let repo = &ctx.catalog_repo;
    let tour = repo
        .create_bookable(CreateBookableRequest {
            kind: BookableKind::Tour,
            title: "Coastal Cliffs Day Tour".to_string(),
            slug: "coastal-cliffs".to_string(),
            currency: "USD".to_string(),
        })
        .await?;

    let schedule = repo.create_schedule(tour.id, Utc::now() + Duration::days(7)).await?;
    let later_schedule = repo.create_schedule(tour.id, Utc::now() + Duration::days(14)).await?;
    let past_schedule = repo.create_schedule(tour.id, Utc::now() - Duration::days(2)).await?;

    let pickup = |name: &str, adult: i64, child: i64| CreatePickupRequest {
        bookable_id: tour.id,
        schedule_id: None,
        name: name.to_string(),
        adult_price_cents: adult,
        child_price_cents: Some(child),
    };

    let harbour = repo.create_pickup(pickup("Harbour Square", 5000, 2500)).await?;
    let station = repo.create_pickup(pickup("Central Station", 8000, 4000)).await?;
    let village = repo.create_pickup(pickup("Village Green", 3000, 1500)).await?;

    let harbour_time = repo.create_pickup_time(harbour.id, "08:00").await?;
    let station_time = repo.create_pickup_time(station.id, "07:30").await?;
    let village_time = repo.create_pickup_time(village.id, "08:30").await?;

    Ok(Catalog {
        tour,
        schedule,
        later_schedule,
        past_schedule,
        harbour,
        harbour_time,
        station,
        station_time,
        village,
        village_time,
    })
}

pub fn intent_event(
    event_id: &str,
    event_type: &str,
    intent_id: &str,
    amount_cents: i64,
    metadata: serde_json::Value,
) -> serde_json::Value {
    let payment_error = if event_type == "payment_intent.payment_failed" {
        json!({ "message": "Your card was declined." })
    } else {
        serde_json::Value::Null
    };

    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "object": "payment_intent",
                "amount": amount_cents,
                "currency": "usd",
                "metadata": metadata,
                "latest_charge": null,
                "last_payment_error": payment_error
            }
        }
    })
}

pub fn refund_updated_event(
    event_id: &str,
    refund_id: &str,
    intent_id: &str,
    amount_cents: i64,
    status: &str,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": "charge.refund.updated",
        "data": {
            "object": {
                "id": refund_id,
                "object": "refund",
                "amount": amount_cents,
                "status": status,
                "payment_intent": intent_id,
                "charge": "ch_test"
            }
        }
    })
}

/// `refunds` are `(refund_id, amount_cents, status)` triples.
pub fn charge_refunded_event(
    event_id: &str,
    intent_id: &str,
    amount_cents: i64,
    amount_refunded_cents: i64,
    refunds: &[(&str, i64, &str)],
) -> serde_json::Value {
    let data: Vec<serde_json::Value> = refunds
        .iter()
        .map(|(id, amount, status)| {
            json!({ "id": id, "amount": amount, "status": status, "payment_intent": intent_id })
        })
        .collect();

    json!({
        "id": event_id,
        "object": "event",
        "type": "charge.refunded",
        "data": {
            "object": {
                "id": "ch_test",
                "object": "charge",
                "payment_intent": intent_id,
                "amount": amount_cents,
                "amount_refunded": amount_refunded_cents,
                "receipt_url": null,
                "metadata": {},
                "refunds": { "object": "list", "data": data }
            }
        }
    })
}
