use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{BookingStatus, PricingBreakdown, Selection};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub kind: PaymentKind,
    pub intent_id: String,
    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub receipt_url: Option<String>,
    pub refund_status: RefundStatus,
    pub refunded_cents: i64,
    pub pending_edit_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub booking_id: Uuid,
    pub kind: PaymentKind,
    pub intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub pending_edit_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Initial,
    Upcharge,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn sources_of(next: PaymentStatus) -> Vec<PaymentStatus> {
        Self::ALL.into_iter().filter(|status| status.can_transition_to(next)).collect()
    }

    /// A failed attempt may still succeed later on the same intent (the
    /// customer retries with another card), so failed -> completed is allowed.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Failed, Completed) | (Completed, Refunded)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    NotRefunded,
    Pending,
    Refunded,
    Failed,
}

/// A provider refund as last reported for a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: String,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub status: String,
}

impl RefundRecord {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

/// Where a (booking, payment) pair sits in the reconciliation state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationState {
    AwaitingPayment,
    PaymentFailed,
    PaymentSucceeded,
    Confirmed,
    RefundRequested,
    Refunded,
    UpchargeAwaiting,
    UpchargeSucceeded,
    BookingUpdated,
}

impl ReconciliationState {
    pub fn derive(
        booking_status: BookingStatus,
        payment: &Payment,
        edit_status: Option<PendingEditStatus>,
    ) -> Self {
        match payment.refund_status {
            RefundStatus::Refunded => return ReconciliationState::Refunded,
            RefundStatus::Pending => return ReconciliationState::RefundRequested,
            _ => {}
        }

        match (payment.kind, payment.status) {
            (PaymentKind::Upcharge, PaymentStatus::Completed) => {
                if edit_status == Some(PendingEditStatus::Applied) {
                    ReconciliationState::BookingUpdated
                } else {
                    ReconciliationState::UpchargeSucceeded
                }
            }
            (PaymentKind::Upcharge, PaymentStatus::Pending) => ReconciliationState::UpchargeAwaiting,
            (_, PaymentStatus::Failed) => ReconciliationState::PaymentFailed,
            (_, PaymentStatus::Pending) => ReconciliationState::AwaitingPayment,
            (_, PaymentStatus::Refunded) => ReconciliationState::Refunded,
            (PaymentKind::Initial, PaymentStatus::Completed) => match booking_status {
                BookingStatus::Confirmed | BookingStatus::Completed => ReconciliationState::Confirmed,
                _ => ReconciliationState::PaymentSucceeded,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub reconciliation_state: ReconciliationState,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentIntentRequest {
    pub booking_id: Uuid,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AdminRefundRequest {
    /// Omit for a full refund of what remains.
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

// =============================================================================
// Pending edits
// =============================================================================

/// A proposed booking change persisted while its upcharge payment is in
/// flight. The upcharge intent references it by id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingEdit {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub selection: Selection,
    pub adult_count: i64,
    pub child_count: i64,
    /// Booking total the upcharge was priced against. Applying the edit on
    /// top of any other total would charge for the wrong difference.
    pub base_total_cents: i64,
    pub quoted_total_cents: i64,
    pub currency: String,
    pub status: PendingEditStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PendingEditStatus {
    AwaitingPayment,
    Applied,
    Failed,
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct NewPendingEdit {
    pub booking_id: Uuid,
    pub selection: Selection,
    pub adult_count: i64,
    pub child_count: i64,
    pub base_total_cents: i64,
    pub quoted: PricingBreakdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(kind: PaymentKind, status: PaymentStatus, refund_status: RefundStatus) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            kind,
            intent_id: "pi_test".to_string(),
            status,
            amount_cents: 12500,
            currency: "USD".to_string(),
            receipt_url: None,
            refund_status,
            refunded_cents: 0,
            pending_edit_id: None,
            metadata: serde_json::json!({}),
            paid_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_payment_transitions() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Pending));

        assert_eq!(PaymentStatus::sources_of(Completed), vec![Pending, Failed]);
        assert_eq!(PaymentStatus::sources_of(Failed), vec![Pending]);
        assert_eq!(PaymentStatus::sources_of(Refunded), vec![Completed]);
    }

    #[test]
    fn test_reconciliation_state() {
        let p = payment(PaymentKind::Initial, PaymentStatus::Pending, RefundStatus::NotRefunded);
        assert_eq!(
            ReconciliationState::derive(BookingStatus::Pending, &p, None),
            ReconciliationState::AwaitingPayment
        );

        let p = payment(PaymentKind::Initial, PaymentStatus::Completed, RefundStatus::NotRefunded);
        assert_eq!(
            ReconciliationState::derive(BookingStatus::Confirmed, &p, None),
            ReconciliationState::Confirmed
        );
        assert_eq!(
            ReconciliationState::derive(BookingStatus::Pending, &p, None),
            ReconciliationState::PaymentSucceeded
        );

        let p = payment(PaymentKind::Initial, PaymentStatus::Completed, RefundStatus::Pending);
        assert_eq!(
            ReconciliationState::derive(BookingStatus::Confirmed, &p, None),
            ReconciliationState::RefundRequested
        );

        let p = payment(PaymentKind::Upcharge, PaymentStatus::Completed, RefundStatus::NotRefunded);
        assert_eq!(
            ReconciliationState::derive(BookingStatus::Confirmed, &p, Some(PendingEditStatus::Applied)),
            ReconciliationState::BookingUpdated
        );
        assert_eq!(
            ReconciliationState::derive(BookingStatus::Confirmed, &p, Some(PendingEditStatus::Failed)),
            ReconciliationState::UpchargeSucceeded
        );
    }
}
