use std::{sync::Arc, time::Duration};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tourdesk::{
    api,
    config::Settings,
    notifications::{EmailChannel, HttpReviewScheduler, NotificationDispatcher, ReviewChannel},
    payments::{PaymentGateway, StripeGateway},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tourdesk=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Tourdesk server on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Initialize Stripe gateway if configured
    let gateway: Option<Arc<dyn PaymentGateway>> = if settings.stripe.enabled {
        match (&settings.stripe.secret_key, &settings.stripe.webhook_secret) {
            (Some(api_key), Some(_)) => {
                tracing::info!("Stripe payment processing enabled");
                Some(Arc::new(StripeGateway::new(api_key.clone())))
            }
            _ => {
                tracing::warn!("Stripe enabled but missing secret_key or webhook_secret");
                None
            }
        }
    } else {
        tracing::info!("Stripe payment processing disabled");
        None
    };

    let service_context = Arc::new(ServiceContext::new(db_pool.clone(), gateway));

    // Notification channels
    let dispatcher = Arc::new(NotificationDispatcher::new(
        service_context.outbox_repo.clone(),
        service_context.notification_log_repo.clone(),
        service_context.booking_repo.clone(),
        settings.outbox.batch_size,
    ));

    dispatcher
        .register(Arc::new(EmailChannel::from_settings(&settings)?))
        .await;

    if settings.reviews.enabled {
        let scheduler = HttpReviewScheduler::new(&settings.reviews)?;
        dispatcher
            .register(Arc::new(ReviewChannel::new(
                Arc::new(scheduler),
                service_context.catalog_repo.clone(),
                service_context.booking_repo.clone(),
                settings.reviews.delay_days,
            )))
            .await;
    } else {
        tracing::info!("Review follow-ups disabled");
    }

    dispatcher
        .clone()
        .spawn_worker(Duration::from_secs(settings.outbox.poll_interval_secs.max(1)));

    let settings = Arc::new(settings);
    let app = api::create_app(service_context, dispatcher, settings.clone());

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
