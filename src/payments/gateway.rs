use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{domain::BookableKind, error::Result};

pub const META_BOOKING_ID: &str = "bookingId";
pub const META_BOOKING_TYPE: &str = "bookingType";
pub const META_BOOKING_REFERENCE: &str = "bookingReference";
pub const META_PAYMENT_TYPE: &str = "paymentType";
pub const META_PENDING_EDIT_ID: &str = "pendingEditId";
pub const PAYMENT_TYPE_UPCHARGE: &str = "upcharge";

/// Port over the payment provider's PaymentIntent lifecycle. Constructed
/// once at startup and passed in; tests substitute `FakePaymentGateway`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: CreateIntent) -> Result<GatewayIntent>;
    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent>;
    /// Makes an unpaid intent unconfirmable. Fails for intents that already
    /// succeeded or are processing.
    async fn cancel_intent(&self, intent_id: &str) -> Result<GatewayIntent>;
    async fn retrieve_charge(&self, charge_id: &str) -> Result<GatewayCharge>;
    async fn create_refund(&self, request: CreateRefund) -> Result<GatewayRefund>;
}

#[derive(Debug, Clone)]
pub struct CreateIntent {
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: IntentMetadata,
    /// Same key, same intent: a retried create never charges twice.
    pub idempotency_key: String,
    pub description: String,
    pub receipt_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl IntentStatus {
    /// The client can still confirm an intent in one of these states, so it
    /// may be handed out again instead of creating a duplicate.
    pub fn is_reusable(&self) -> bool {
        matches!(
            self,
            IntentStatus::RequiresPaymentMethod
                | IntentStatus::RequiresConfirmation
                | IntentStatus::RequiresAction
        )
    }

    /// Money may already be moving; the intent can no longer be withdrawn.
    pub fn is_settling(&self) -> bool {
        matches!(
            self,
            IntentStatus::Processing | IntentStatus::RequiresCapture | IntentStatus::Succeeded
        )
    }
}

#[derive(Debug, Clone)]
pub struct GatewayIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub metadata: HashMap<String, String>,
    pub latest_charge_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayCharge {
    pub id: String,
    pub payment_intent_id: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateRefund {
    pub intent_id: String,
    pub amount_cents: i64,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub id: String,
    pub amount_cents: i64,
    pub status: String,
}

/// Correlation data embedded in every intent so webhook events can be tied
/// back to a booking without a separate lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMetadata {
    pub booking_id: Uuid,
    pub booking_type: BookableKind,
    pub booking_reference: String,
    /// Set for upcharges only.
    pub pending_edit_id: Option<Uuid>,
}

impl IntentMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(META_BOOKING_ID.to_string(), self.booking_id.to_string());
        metadata.insert(META_BOOKING_TYPE.to_string(), self.booking_type.as_str().to_string());
        metadata.insert(META_BOOKING_REFERENCE.to_string(), self.booking_reference.clone());
        if let Some(edit_id) = self.pending_edit_id {
            metadata.insert(META_PAYMENT_TYPE.to_string(), PAYMENT_TYPE_UPCHARGE.to_string());
            metadata.insert(META_PENDING_EDIT_ID.to_string(), edit_id.to_string());
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upcharge_metadata_carries_payment_type() {
        let booking_id = Uuid::new_v4();
        let edit_id = Uuid::new_v4();
        let meta = IntentMetadata {
            booking_id,
            booking_type: BookableKind::Tour,
            booking_reference: "TD-ABCD2345".to_string(),
            pending_edit_id: Some(edit_id),
        };

        let map = meta.to_map();
        assert_eq!(map.get(META_BOOKING_ID), Some(&booking_id.to_string()));
        assert_eq!(map.get(META_BOOKING_TYPE).map(String::as_str), Some("tour"));
        assert_eq!(map.get(META_PAYMENT_TYPE).map(String::as_str), Some(PAYMENT_TYPE_UPCHARGE));
        assert_eq!(map.get(META_PENDING_EDIT_ID), Some(&edit_id.to_string()));
    }

    #[test]
    fn test_regular_metadata_has_no_payment_type() {
        let meta = IntentMetadata {
            booking_id: Uuid::new_v4(),
            booking_type: BookableKind::Event,
            booking_reference: "TD-ABCD2345".to_string(),
            pending_edit_id: None,
        };

        let map = meta.to_map();
        assert!(!map.contains_key(META_PAYMENT_TYPE));
        assert!(!map.contains_key(META_PENDING_EDIT_ID));
    }

    #[test]
    fn test_reusable_statuses() {
        assert!(IntentStatus::RequiresPaymentMethod.is_reusable());
        assert!(IntentStatus::RequiresAction.is_reusable());
        assert!(!IntentStatus::Succeeded.is_reusable());
        assert!(!IntentStatus::Canceled.is_reusable());
        assert!(!IntentStatus::Processing.is_reusable());
    }

    #[test]
    fn test_settling_statuses() {
        assert!(IntentStatus::Succeeded.is_settling());
        assert!(IntentStatus::Processing.is_settling());
        assert!(!IntentStatus::RequiresPaymentMethod.is_settling());
        assert!(!IntentStatus::Canceled.is_settling());
    }
}
