use chrono::{Duration, Utc};
use clap::Parser;
use fake::{
    faker::{internet::en::SafeEmail, name::en::Name},
    Fake,
};
use rand::seq::SliceRandom;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use tourdesk::{
    domain::{
        BookableKind, BookingStatus, CreateBookableRequest, CreatePickupRequest, NewBooking,
        NewPayment, PaymentKind, PaymentStatus, Selection,
    },
    repository::{
        BookingRepository, CatalogRepository, PaymentRepository, SqliteBookingRepository,
        SqliteCatalogRepository, SqlitePaymentRepository,
    },
    service::{booking_service::generate_reference, pricing},
};

/// Populates a database with a demo catalog and bookings.
#[derive(Debug, Parser)]
struct SeedArgs {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:tourdesk.db?mode=rwc")]
    database_url: String,

    /// Number of demo bookings to create
    #[arg(long, default_value_t = 6)]
    bookings: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = SeedArgs::parse();
    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let catalog = SqliteCatalogRepository::new(db_pool.clone());
    let bookings = SqliteBookingRepository::new(db_pool.clone());
    let payments = SqlitePaymentRepository::new(db_pool.clone());

    println!("🗺️  Creating catalog...");

    // Tour: pickups apply to every date
    let tour = catalog.create_bookable(CreateBookableRequest {
        kind: BookableKind::Tour,
        title: "Coastal Cliffs Day Tour".to_string(),
        slug: "coastal-cliffs".to_string(),
        currency: "EUR".to_string(),
    }).await?;

    let mut tour_schedules = Vec::new();
    for days in [3, 10, 17] {
        tour_schedules.push(catalog.create_schedule(tour.id, Utc::now() + Duration::days(days)).await?);
    }

    let harbour = catalog.create_pickup(CreatePickupRequest {
        bookable_id: tour.id,
        schedule_id: None,
        name: "Harbour Square".to_string(),
        adult_price_cents: 6500,
        child_price_cents: Some(3500),
    }).await?;
    let station = catalog.create_pickup(CreatePickupRequest {
        bookable_id: tour.id,
        schedule_id: None,
        name: "Central Station".to_string(),
        adult_price_cents: 7200,
        child_price_cents: Some(3900),
    }).await?;

    let harbour_time = catalog.create_pickup_time(harbour.id, "08:00").await?;
    catalog.create_pickup_time(harbour.id, "08:45").await?;
    let station_time = catalog.create_pickup_time(station.id, "07:30").await?;

    println!("  ✅ Created tour with {} dates and 2 pickups", tour_schedules.len());

    // Event: a single dated occurrence with its own pickup, adults only
    let event = catalog.create_bookable(CreateBookableRequest {
        kind: BookableKind::Event,
        title: "Midsummer Lighthouse Concert".to_string(),
        slug: "lighthouse-concert".to_string(),
        currency: "EUR".to_string(),
    }).await?;
    let concert = catalog.create_schedule(event.id, Utc::now() + Duration::days(24)).await?;
    let concert_pickup = catalog.create_pickup(CreatePickupRequest {
        bookable_id: event.id,
        schedule_id: Some(concert.id),
        name: "Old Town Gate".to_string(),
        adult_price_cents: 4500,
        child_price_cents: None,
    }).await?;
    let concert_time = catalog.create_pickup_time(concert_pickup.id, "18:15").await?;

    println!("  ✅ Created event with 1 date");

    println!("🎫 Creating {} demo bookings...", args.bookings);

    let tour_options = [(&harbour, &harbour_time), (&station, &station_time)];
    let mut rng = rand::thread_rng();
    let mut confirmed = 0;

    for i in 0..args.bookings {
        let name: String = Name().fake();
        let email: String = SafeEmail().fake();

        let (bookable, schedule_id, pickup, pickup_time, children) = if i % 3 == 2 {
            (&event, concert.id, &concert_pickup, &concert_time, 0)
        } else {
            let schedule = tour_schedules.choose(&mut rng).unwrap_or(&tour_schedules[0]);
            let (pickup, time) = tour_options[i % tour_options.len()];
            (&tour, schedule.id, pickup, time, (i % 3) as i64)
        };

        let adults = 1 + (i % 4) as i64;
        let quote = pricing::calculate(pickup, &bookable.currency, adults, children)?;

        let booking = bookings.create(NewBooking {
            reference: generate_reference(),
            user_id: Uuid::new_v4(),
            contact_name: name,
            contact_email: email,
            booking_type: bookable.kind,
            bookable_id: bookable.id,
            selection: Selection {
                schedule_id,
                pickup_id: pickup.id,
                pickup_time_id: pickup_time.id,
            },
            adult_count: adults,
            child_count: children,
            pricing: quote.clone(),
            notes: String::new(),
        }).await?;

        // Every other booking is paid and confirmed
        if i % 2 == 0 {
            let payment = payments.create(NewPayment {
                booking_id: booking.id,
                kind: PaymentKind::Initial,
                intent_id: format!("pi_seed_{}", booking.reference),
                amount_cents: quote.total_cents,
                currency: quote.currency.clone(),
                pending_edit_id: None,
                metadata: serde_json::json!({ "bookingId": booking.id.to_string() }),
            }).await?;
            payments
                .transition_status(payment.id, &PaymentStatus::sources_of(PaymentStatus::Completed), PaymentStatus::Completed)
                .await?;
            bookings
                .transition_status(booking.id, &BookingStatus::sources_of(BookingStatus::Confirmed), BookingStatus::Confirmed)
                .await?;
            confirmed += 1;
        }

        println!("  • {} {} ({} adults, {} children)", booking.reference, bookable.title, adults, children);
    }

    println!("  ✅ Created {} bookings, {} confirmed", args.bookings, confirmed);
    println!("\n✨ Database seeding complete!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_falls_back_to_env() {
        std::env::set_var("DATABASE_URL", "sqlite::memory:");
        let args = SeedArgs::try_parse_from(["seed"]).unwrap();
        assert_eq!(args.database_url, "sqlite::memory:");
        assert_eq!(args.bookings, 6);

        let args = SeedArgs::try_parse_from(["seed", "--database-url", "sqlite:other.db"]).unwrap();
        assert_eq!(args.database_url, "sqlite:other.db");
    }
}
