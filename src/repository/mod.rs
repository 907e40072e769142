use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod catalog_repository;
pub mod booking_repository;
pub mod payment_repository;
pub mod pending_edit_repository;
pub mod outbox_repository;
pub mod notification_log_repository;
pub mod webhook_event_repository;

pub use catalog_repository::SqliteCatalogRepository;
pub use booking_repository::SqliteBookingRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use pending_edit_repository::SqlitePendingEditRepository;
pub use outbox_repository::SqliteOutboxRepository;
pub use notification_log_repository::SqliteNotificationLogRepository;
pub use webhook_event_repository::SqliteWebhookEventRepository;

/// Read access to the bookable catalog, plus the writes the seed binary and
/// tests need.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn create_bookable(&self, request: CreateBookableRequest) -> Result<Bookable>;
    async fn create_schedule(&self, bookable_id: Uuid, starts_at: DateTime<Utc>) -> Result<Schedule>;
    async fn create_pickup(&self, request: CreatePickupRequest) -> Result<Pickup>;
    async fn create_pickup_time(&self, pickup_id: Uuid, label: &str) -> Result<PickupTime>;
    async fn find_bookable(&self, id: Uuid) -> Result<Option<Bookable>>;
    async fn find_schedule(&self, id: Uuid) -> Result<Option<Schedule>>;
    async fn find_pickup(&self, id: Uuid) -> Result<Option<Pickup>>;
    async fn find_pickup_time(&self, id: Uuid) -> Result<Option<PickupTime>>;
    async fn set_schedule_active(&self, id: Uuid, active: bool) -> Result<()>;
    async fn set_pickup_active(&self, id: Uuid, active: bool) -> Result<()>;
    async fn set_pickup_prices(&self, id: Uuid, adult_price_cents: i64, child_price_cents: Option<i64>) -> Result<()>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: NewBooking) -> Result<Booking>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>>;
    /// Moves the booking to `to` only if its current status is one of
    /// `from`. Returns `None` when the guard did not match.
    async fn transition_status(&self, id: Uuid, from: &[BookingStatus], to: BookingStatus) -> Result<Option<Booking>>;
    /// Partial update of the selection, guest counts and pricing columns.
    async fn apply_changes(&self, id: Uuid, changes: &BookingChanges) -> Result<Booking>;
    async fn append_note(&self, id: Uuid, note: &str) -> Result<()>;
    async fn set_review_followup(&self, id: Uuid, followup_id: &str) -> Result<()>;
    async fn list_confirmed_starting_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>>;
    async fn list_by_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>>;
    async fn find_latest_pending(&self, booking_id: Uuid, kind: PaymentKind) -> Result<Option<Payment>>;
    async fn find_latest_completed(&self, booking_id: Uuid) -> Result<Option<Payment>>;
    /// Guarded status change, same contract as `BookingRepository::transition_status`.
    async fn transition_status(&self, id: Uuid, from: &[PaymentStatus], to: PaymentStatus) -> Result<Option<Payment>>;
    async fn set_receipt_url(&self, id: Uuid, receipt_url: &str) -> Result<()>;
    async fn update_refund_state(
        &self,
        id: Uuid,
        refund_status: RefundStatus,
        refunded_cents: i64,
        status: PaymentStatus,
    ) -> Result<Payment>;
    async fn upsert_refund(&self, refund: &RefundRecord) -> Result<()>;
    async fn list_refunds(&self, payment_id: Uuid) -> Result<Vec<RefundRecord>>;
}

#[async_trait]
pub trait PendingEditRepository: Send + Sync {
    async fn create(&self, edit: NewPendingEdit) -> Result<PendingEdit>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PendingEdit>>;
    /// Edits whose upcharge has not been paid yet, oldest first.
    async fn list_awaiting_payment(&self, booking_id: Uuid) -> Result<Vec<PendingEdit>>;
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[PendingEditStatus],
        to: PendingEditStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<PendingEdit>>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Returns false when an event with the same dedupe key already exists.
    async fn record(&self, event: NewDomainEvent) -> Result<bool>;
    async fn list_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>>;
    /// Pending -> processing. False if another consumer got there first.
    async fn claim(&self, id: Uuid) -> Result<bool>;
    async fn mark_dispatched(&self, id: Uuid) -> Result<()>;
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;
    async fn list_by_booking(&self, booking_id: Uuid) -> Result<Vec<OutboxEvent>>;
}

#[async_trait]
pub trait NotificationLogRepository: Send + Sync {
    async fn record(&self, entry: NotificationLogEntry) -> Result<()>;
    async fn list_by_booking(&self, booking_id: Uuid) -> Result<Vec<NotificationLogEntry>>;
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool>;
    async fn mark_processed(&self, event_id: &str, event_type: &str, outcome: &str) -> Result<()>;
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn parse_optional_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
    s.map(parse_uuid).transpose()
}
