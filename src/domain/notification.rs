use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Domain events recorded after a booking/payment state transition commits.
/// Notification delivery consumes them; it never feeds back into the
/// transition itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventKind {
    BookingConfirmed,
    BookingCancelled,
    BookingUpdated,
    PaymentFailed,
    RefundConfirmed,
    ReviewFollowup,
    EditReconciliationFailed,
    DuplicatePayment,
}

impl DomainEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventKind::BookingConfirmed => "booking_confirmed",
            DomainEventKind::BookingCancelled => "booking_cancelled",
            DomainEventKind::BookingUpdated => "booking_updated",
            DomainEventKind::PaymentFailed => "payment_failed",
            DomainEventKind::RefundConfirmed => "refund_confirmed",
            DomainEventKind::ReviewFollowup => "review_followup",
            DomainEventKind::EditReconciliationFailed => "edit_reconciliation_failed",
            DomainEventKind::DuplicatePayment => "duplicate_payment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "booking_confirmed" => Some(DomainEventKind::BookingConfirmed),
            "booking_cancelled" => Some(DomainEventKind::BookingCancelled),
            "booking_updated" => Some(DomainEventKind::BookingUpdated),
            "payment_failed" => Some(DomainEventKind::PaymentFailed),
            "refund_confirmed" => Some(DomainEventKind::RefundConfirmed),
            "review_followup" => Some(DomainEventKind::ReviewFollowup),
            "edit_reconciliation_failed" => Some(DomainEventKind::EditReconciliationFailed),
            "duplicate_payment" => Some(DomainEventKind::DuplicatePayment),
            _ => None,
        }
    }
}

/// An event to append to the outbox. The dedupe key makes recording
/// idempotent: a second event with the same key is dropped.
#[derive(Debug, Clone)]
pub struct NewDomainEvent {
    pub booking_id: Uuid,
    pub kind: DomainEventKind,
    pub payload: serde_json::Value,
    pub dedupe_key: String,
}

impl NewDomainEvent {
    pub fn booking_confirmed(booking_id: Uuid) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::BookingConfirmed,
            payload: serde_json::json!({}),
            dedupe_key: format!("booking-confirmed:{}", booking_id),
        }
    }

    pub fn review_followup(booking_id: Uuid) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::ReviewFollowup,
            payload: serde_json::json!({}),
            dedupe_key: format!("review-followup:{}", booking_id),
        }
    }

    pub fn booking_cancelled(booking_id: Uuid) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::BookingCancelled,
            payload: serde_json::json!({}),
            dedupe_key: format!("booking-cancelled:{}", booking_id),
        }
    }

    /// `change_id` is the pending edit id for upcharges, or a fresh id for
    /// direct and downgrade edits.
    pub fn booking_updated(booking_id: Uuid, change_id: Uuid, difference_cents: i64) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::BookingUpdated,
            payload: serde_json::json!({ "difference_cents": difference_cents }),
            dedupe_key: format!("booking-updated:{}", change_id),
        }
    }

    pub fn payment_failed(booking_id: Uuid, intent_id: &str, reason: Option<&str>) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::PaymentFailed,
            payload: serde_json::json!({ "intent_id": intent_id, "reason": reason }),
            dedupe_key: format!("payment-failed:{}", intent_id),
        }
    }

    /// Keyed by the cumulative refunded total so the same refund reported by
    /// several provider events produces one confirmation.
    pub fn refund_confirmed(booking_id: Uuid, payment_id: Uuid, refunded_cents: i64, currency: &str) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::RefundConfirmed,
            payload: serde_json::json!({
                "payment_id": payment_id,
                "refunded_cents": refunded_cents,
                "currency": currency,
            }),
            dedupe_key: format!("refund-confirmed:{}:{}", payment_id, refunded_cents),
        }
    }

    pub fn edit_reconciliation_failed(booking_id: Uuid, pending_edit_id: Uuid, intent_id: &str, reason: &str) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::EditReconciliationFailed,
            payload: serde_json::json!({
                "pending_edit_id": pending_edit_id,
                "intent_id": intent_id,
                "reason": reason,
            }),
            dedupe_key: format!("edit-reconciliation-failed:{}", pending_edit_id),
        }
    }

    /// A booking collected a second initial payment; someone has to refund it.
    pub fn duplicate_payment(booking_id: Uuid, intent_id: &str, amount_cents: i64) -> Self {
        Self {
            booking_id,
            kind: DomainEventKind::DuplicatePayment,
            payload: serde_json::json!({
                "intent_id": intent_id,
                "amount_cents": amount_cents,
            }),
            dedupe_key: format!("duplicate-payment:{}", intent_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub kind: DomainEventKind,
    pub payload: serde_json::Value,
    pub dedupe_key: String,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Dispatched,
    Failed,
}

/// Audit row written for every notification attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationLogEntry {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub outbox_event_id: Option<Uuid>,
    pub channel: String,
    pub recipient: String,
    pub template: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            DomainEventKind::BookingConfirmed,
            DomainEventKind::BookingCancelled,
            DomainEventKind::BookingUpdated,
            DomainEventKind::PaymentFailed,
            DomainEventKind::RefundConfirmed,
            DomainEventKind::ReviewFollowup,
            DomainEventKind::EditReconciliationFailed,
            DomainEventKind::DuplicatePayment,
        ] {
            assert_eq!(DomainEventKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_refund_dedupe_key_tracks_total() {
        let booking = Uuid::new_v4();
        let payment = Uuid::new_v4();
        let first = NewDomainEvent::refund_confirmed(booking, payment, 3000, "USD");
        let again = NewDomainEvent::refund_confirmed(booking, payment, 3000, "USD");
        let more = NewDomainEvent::refund_confirmed(booking, payment, 5000, "USD");
        assert_eq!(first.dedupe_key, again.dedupe_key);
        assert_ne!(first.dedupe_key, more.dedupe_key);
    }
}
