pub mod pricing;
pub mod booking_service;
pub mod reconciler;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::payments::PaymentGateway;
use crate::repository::*;

pub use booking_service::BookingService;
pub use reconciler::{ReconcileOutcome, WebhookReconciler};

pub struct ServiceContext {
    pub catalog_repo: Arc<dyn CatalogRepository>,
    pub booking_repo: Arc<dyn BookingRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub pending_edit_repo: Arc<dyn PendingEditRepository>,
    pub outbox_repo: Arc<dyn OutboxRepository>,
    pub notification_log_repo: Arc<dyn NotificationLogRepository>,
    pub webhook_event_repo: Arc<dyn WebhookEventRepository>,
    pub booking_service: Arc<BookingService>,
    /// Absent when payments are disabled.
    pub reconciler: Option<Arc<WebhookReconciler>>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(db_pool: SqlitePool, gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        let catalog_repo: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalogRepository::new(db_pool.clone()));
        let booking_repo: Arc<dyn BookingRepository> = Arc::new(SqliteBookingRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let pending_edit_repo: Arc<dyn PendingEditRepository> = Arc::new(SqlitePendingEditRepository::new(db_pool.clone()));
        let outbox_repo: Arc<dyn OutboxRepository> = Arc::new(SqliteOutboxRepository::new(db_pool.clone()));
        let notification_log_repo: Arc<dyn NotificationLogRepository> =
            Arc::new(SqliteNotificationLogRepository::new(db_pool.clone()));
        let webhook_event_repo: Arc<dyn WebhookEventRepository> =
            Arc::new(SqliteWebhookEventRepository::new(db_pool.clone()));

        let booking_service = Arc::new(BookingService::new(
            catalog_repo.clone(),
            booking_repo.clone(),
            payment_repo.clone(),
            pending_edit_repo.clone(),
            outbox_repo.clone(),
            gateway.clone(),
        ));

        let reconciler = gateway.map(|gateway| {
            Arc::new(WebhookReconciler::new(
                booking_repo.clone(),
                payment_repo.clone(),
                pending_edit_repo.clone(),
                outbox_repo.clone(),
                webhook_event_repo.clone(),
                booking_service.clone(),
                gateway,
            ))
        });

        Self {
            catalog_repo,
            booking_repo,
            payment_repo,
            pending_edit_repo,
            outbox_repo,
            notification_log_repo,
            webhook_event_repo,
            booking_service,
            reconciler,
            db_pool,
        }
    }
}
