use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{BookableKind, Selection};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub contact_name: String,
    pub contact_email: String,
    pub booking_type: BookableKind,
    pub bookable_id: Uuid,
    pub schedule_id: Uuid,
    pub pickup_id: Uuid,
    pub pickup_time_id: Uuid,
    pub adult_count: i64,
    pub child_count: i64,
    pub pricing: PricingBreakdown,
    pub status: BookingStatus,
    pub notes: String,
    pub review_followup_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn selection(&self) -> Selection {
        Selection {
            schedule_id: self.schedule_id,
            pickup_id: self.pickup_id,
            pickup_time_id: self.pickup_time_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Cancelled,
        BookingStatus::Completed,
    ];

    /// States a booking may legally leave for `next`. Used as the guard of
    /// conditional status updates.
    pub fn sources_of(next: BookingStatus) -> Vec<BookingStatus> {
        Self::ALL.into_iter().filter(|status| status.can_transition_to(next)).collect()
    }

    /// Forward-only lifecycle; cancellation is reachable from pending and
    /// confirmed. Staying in the same state is not a transition.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }
}

/// Price snapshot taken when the booking (or an edit) was last priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricingBreakdown {
    pub adult_price_cents: i64,
    pub child_price_cents: Option<i64>,
    pub adult_total_cents: i64,
    pub child_total_cents: i64,
    pub total_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiffClassification {
    Upcharge,
    Downgrade,
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriceDiff {
    pub original_cents: i64,
    pub new_cents: i64,
    /// Signed: positive for an upcharge, negative for a downgrade.
    pub difference_cents: i64,
    pub currency: String,
    pub classification: DiffClassification,
}

/// Fields written back to a booking by an edit. Applied as a partial merge so
/// concurrent writers touching other columns are not clobbered.
#[derive(Debug, Clone)]
pub struct BookingChanges {
    pub selection: Selection,
    pub adult_count: i64,
    pub child_count: i64,
    pub pricing: PricingBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateBookingRequest {
    pub bookable_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub pickup_location_id: Option<Uuid>,
    pub pickup_time_id: Option<Uuid>,
    #[validate(range(min = 1, max = 50, message = "at least one adult is required"))]
    pub adult_count: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = 50, message = "child count cannot be negative"))]
    pub child_count: i64,
    #[validate(length(min = 1, max = 200, message = "contact name is required"))]
    pub contact_name: String,
    #[validate(email(message = "a valid contact email is required"))]
    pub contact_email: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// A proposed change to an existing booking's selection and guest counts.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct EditBookingRequest {
    pub schedule_id: Uuid,
    pub pickup_location_id: Uuid,
    pub pickup_time_id: Uuid,
    #[validate(range(min = 1, max = 50, message = "at least one adult is required"))]
    pub adult_count: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = 50, message = "child count cannot be negative"))]
    pub child_count: i64,
}

impl EditBookingRequest {
    pub fn selection(&self) -> Selection {
        Selection {
            schedule_id: self.schedule_id,
            pickup_id: self.pickup_location_id,
            pickup_time_id: self.pickup_time_id,
        }
    }
}

/// Everything needed to insert a new booking row.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub reference: String,
    pub user_id: Uuid,
    pub contact_name: String,
    pub contact_email: String,
    pub booking_type: BookableKind,
    pub bookable_id: Uuid,
    pub selection: Selection,
    pub adult_count: i64,
    pub child_count: i64,
    pub pricing: PricingBreakdown,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelBookingRequest {
    pub booking_id: Uuid,
}

/// Price comparison for a proposed edit, plus the breakdown it would carry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EditQuote {
    pub diff: PriceDiff,
    pub pricing: PricingBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundSummary {
    pub refund_id: String,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
}

/// What applying an edit did. An upcharge leaves the booking untouched until
/// the customer pays the difference.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    Updated {
        booking: Booking,
    },
    RefundIssued {
        booking: Booking,
        refund: RefundSummary,
    },
    PaymentRequired {
        pending_edit_id: Uuid,
        payment_intent_id: String,
        client_secret: String,
        amount_cents: i64,
        currency: String,
    },
}
