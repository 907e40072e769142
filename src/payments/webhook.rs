//! Stripe webhook boundary: signature verification and conversion of the
//! event into a closed set of typed events. Nothing past this module
//! touches untyped event payloads.

use std::collections::HashMap;

use serde::Deserialize;
use stripe::{Event, EventObject, EventType, Webhook, WebhookError};
use uuid::Uuid;

use crate::{
    domain::BookableKind,
    error::{AppError, Result},
    payments::gateway::{
        META_BOOKING_ID, META_BOOKING_REFERENCE, META_BOOKING_TYPE, META_PAYMENT_TYPE,
        META_PENDING_EDIT_ID, PAYMENT_TYPE_UPCHARGE,
    },
};

/// Header name Stripe signs deliveries with.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Builds a valid `Stripe-Signature` header value for `payload`.
#[cfg(feature = "test-utils")]
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    use hmac::{Hmac, Mac};

    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|e| panic!("signing test payload: {}", e));
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

// =============================================================================
// Typed events
// =============================================================================

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: WebhookEventKind,
}

#[derive(Debug, Clone)]
pub enum WebhookEventKind {
    PaymentIntentSucceeded(IntentObject),
    PaymentIntentFailed(IntentObject),
    PaymentIntentCanceled(IntentObject),
    ChargeRefunded(ChargeObject),
    ChargeRefundUpdated(RefundObject),
    ChargeUpdated(ChargeObject),
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct IntentObject {
    pub id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: EventMetadata,
    pub latest_charge_id: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChargeObject {
    pub id: String,
    pub payment_intent_id: Option<String>,
    pub amount_cents: i64,
    pub amount_refunded_cents: i64,
    pub receipt_url: Option<String>,
    pub metadata: EventMetadata,
    pub refunds: Vec<RefundObject>,
}

#[derive(Debug, Clone)]
pub struct RefundObject {
    pub id: String,
    pub amount_cents: i64,
    pub status: String,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
}

/// Correlation metadata as it arrived on the event. Every field is optional:
/// intents created outside this service carry none of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    pub booking_id: Option<Uuid>,
    pub booking_type: Option<BookableKind>,
    pub booking_reference: Option<String>,
    pub is_upcharge: bool,
    pub pending_edit_id: Option<Uuid>,
}

impl EventMetadata {
    fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            booking_id: map.get(META_BOOKING_ID).and_then(|v| Uuid::parse_str(v).ok()),
            booking_type: map.get(META_BOOKING_TYPE).and_then(|v| BookableKind::from_str(v)),
            booking_reference: map.get(META_BOOKING_REFERENCE).cloned(),
            is_upcharge: map.get(META_PAYMENT_TYPE).map(String::as_str) == Some(PAYMENT_TYPE_UPCHARGE),
            pending_edit_id: map.get(META_PENDING_EDIT_ID).and_then(|v| Uuid::parse_str(v).ok()),
        }
    }
}

impl WebhookEvent {
    /// Verifies the `Stripe-Signature` header (signature and a five minute
    /// timestamp window) and converts the event. Objects the SDK cannot model
    /// are read by `parse` once the signature has been checked.
    pub fn construct(payload: &str, signature: &str, secret: &str) -> Result<Self> {
        match Webhook::construct_event(payload, signature, secret) {
            Ok(event) => Self::from_stripe(event),
            Err(WebhookError::BadParse(e)) => {
                tracing::debug!("SDK could not model webhook object, parsing directly: {}", e);
                Self::parse(payload)
            }
            Err(WebhookError::BadKey) => Err(AppError::Internal("Invalid webhook secret".to_string())),
            Err(WebhookError::BadTimestamp(_)) => {
                Err(AppError::BadRequest("Webhook timestamp outside tolerance".to_string()))
            }
            Err(e) => Err(AppError::BadRequest(format!("Invalid webhook signature: {}", e))),
        }
    }

    fn from_stripe(event: Event) -> Result<Self> {
        let event_type = event.type_.to_string();
        let object = event.data.object;

        let kind = match event.type_ {
            EventType::PaymentIntentSucceeded => WebhookEventKind::PaymentIntentSucceeded(typed_intent(object)?),
            EventType::PaymentIntentPaymentFailed => WebhookEventKind::PaymentIntentFailed(typed_intent(object)?),
            EventType::PaymentIntentCanceled => WebhookEventKind::PaymentIntentCanceled(typed_intent(object)?),
            EventType::ChargeRefunded => WebhookEventKind::ChargeRefunded(typed_charge(object)?),
            EventType::ChargeRefundUpdated => WebhookEventKind::ChargeRefundUpdated(typed_refund(object)?),
            EventType::ChargeUpdated => WebhookEventKind::ChargeUpdated(typed_charge(object)?),
            _ => WebhookEventKind::Unrecognized,
        };

        Ok(Self {
            id: event.id.to_string(),
            event_type,
            kind,
        })
    }

    /// Parses a raw event. Unknown event types are accepted as
    /// `Unrecognized`; a known type with a malformed object is a `BadRequest`.
    pub fn parse(payload: &str) -> Result<Self> {
        let raw: RawEvent = serde_json::from_str(payload)
            .map_err(|e| AppError::BadRequest(format!("Malformed webhook payload: {}", e)))?;

        let kind = match raw.event_type.as_str() {
            "payment_intent.succeeded" => WebhookEventKind::PaymentIntentSucceeded(intent(raw.data.object)?),
            "payment_intent.payment_failed" => WebhookEventKind::PaymentIntentFailed(intent(raw.data.object)?),
            "payment_intent.canceled" => WebhookEventKind::PaymentIntentCanceled(intent(raw.data.object)?),
            "charge.refunded" => WebhookEventKind::ChargeRefunded(charge(raw.data.object)?),
            "charge.refund.updated" => WebhookEventKind::ChargeRefundUpdated(refund(raw.data.object)?),
            "charge.updated" => WebhookEventKind::ChargeUpdated(charge(raw.data.object)?),
            _ => WebhookEventKind::Unrecognized,
        };

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            kind,
        })
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// Stripe sends related objects either as a bare id or expanded.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpandableId {
    Id(String),
    Object { id: String },
}

impl ExpandableId {
    fn into_id(self) -> String {
        match self {
            ExpandableId::Id(id) => id,
            ExpandableId::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct RawIntent {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    latest_charge: Option<ExpandableId>,
    #[serde(default)]
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Deserialize)]
struct RawPaymentError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawCharge {
    id: String,
    #[serde(default)]
    payment_intent: Option<ExpandableId>,
    amount: i64,
    #[serde(default)]
    amount_refunded: i64,
    #[serde(default)]
    receipt_url: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    refunds: Option<RawRefundList>,
}

#[derive(Deserialize)]
struct RawRefundList {
    #[serde(default)]
    data: Vec<RawRefund>,
}

#[derive(Deserialize)]
struct RawRefund {
    id: String,
    amount: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_intent: Option<ExpandableId>,
    #[serde(default)]
    charge: Option<ExpandableId>,
}

impl From<RawRefund> for RefundObject {
    fn from(raw: RawRefund) -> Self {
        Self {
            id: raw.id,
            amount_cents: raw.amount,
            status: raw.status.unwrap_or_else(|| "pending".to_string()),
            payment_intent_id: raw.payment_intent.map(ExpandableId::into_id),
            charge_id: raw.charge.map(ExpandableId::into_id),
        }
    }
}

fn unexpected_object(expected: &str) -> AppError {
    AppError::BadRequest(format!("Webhook event does not carry a {}", expected))
}

fn typed_intent(object: EventObject) -> Result<IntentObject> {
    let EventObject::PaymentIntent(intent) = object else {
        return Err(unexpected_object("payment intent"));
    };
    Ok(IntentObject {
        id: intent.id.to_string(),
        amount_cents: intent.amount,
        currency: intent.currency.to_string().to_uppercase(),
        metadata: EventMetadata::from_map(&intent.metadata),
        latest_charge_id: intent.latest_charge.map(|c| c.id().to_string()),
        failure_message: intent.last_payment_error.and_then(|e| e.message),
    })
}

fn typed_charge(object: EventObject) -> Result<ChargeObject> {
    let EventObject::Charge(charge) = object else {
        return Err(unexpected_object("charge"));
    };
    Ok(ChargeObject {
        id: charge.id.to_string(),
        payment_intent_id: charge.payment_intent.map(|pi| pi.id().to_string()),
        amount_cents: charge.amount,
        amount_refunded_cents: charge.amount_refunded,
        receipt_url: charge.receipt_url,
        metadata: EventMetadata::from_map(&charge.metadata),
        refunds: charge
            .refunds
            .map(|list| list.data.into_iter().map(RefundObject::from).collect())
            .unwrap_or_default(),
    })
}

fn typed_refund(object: EventObject) -> Result<RefundObject> {
    let EventObject::Refund(refund) = object else {
        return Err(unexpected_object("refund"));
    };
    Ok(RefundObject::from(refund))
}

impl From<stripe::Refund> for RefundObject {
    fn from(refund: stripe::Refund) -> Self {
        Self {
            id: refund.id.to_string(),
            amount_cents: refund.amount,
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
            payment_intent_id: refund.payment_intent.as_ref().map(|pi| pi.id().to_string()),
            charge_id: refund.charge.as_ref().map(|c| c.id().to_string()),
        }
    }
}

fn malformed(e: serde_json::Error) -> AppError {
    AppError::BadRequest(format!("Malformed webhook object: {}", e))
}

fn intent(object: serde_json::Value) -> Result<IntentObject> {
    let raw: RawIntent = serde_json::from_value(object).map_err(malformed)?;
    Ok(IntentObject {
        id: raw.id,
        amount_cents: raw.amount,
        currency: raw.currency.to_uppercase(),
        metadata: EventMetadata::from_map(&raw.metadata.unwrap_or_default()),
        latest_charge_id: raw.latest_charge.map(ExpandableId::into_id),
        failure_message: raw.last_payment_error.and_then(|e| e.message),
    })
}

fn charge(object: serde_json::Value) -> Result<ChargeObject> {
    let raw: RawCharge = serde_json::from_value(object).map_err(malformed)?;
    Ok(ChargeObject {
        id: raw.id,
        payment_intent_id: raw.payment_intent.map(ExpandableId::into_id),
        amount_cents: raw.amount,
        amount_refunded_cents: raw.amount_refunded,
        receipt_url: raw.receipt_url,
        metadata: EventMetadata::from_map(&raw.metadata.unwrap_or_default()),
        refunds: raw
            .refunds
            .map(|list| list.data.into_iter().map(RefundObject::from).collect())
            .unwrap_or_default(),
    })
}

fn refund(object: serde_json::Value) -> Result<RefundObject> {
    let raw: RawRefund = serde_json::from_value(object).map_err(malformed)?;
    Ok(raw.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upcharge_succeeded() {
        let booking_id = Uuid::new_v4();
        let edit_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": {
                "id": "pi_1",
                "amount": 2500,
                "currency": "usd",
                "latest_charge": "ch_1",
                "metadata": {
                    "bookingId": booking_id.to_string(),
                    "bookingType": "tour",
                    "bookingReference": "TD-ABCD2345",
                    "paymentType": "upcharge",
                    "pendingEditId": edit_id.to_string(),
                }
            }}
        })
        .to_string();

        let event = WebhookEvent::parse(&payload).unwrap();
        match event.kind {
            WebhookEventKind::PaymentIntentSucceeded(intent) => {
                assert_eq!(intent.id, "pi_1");
                assert_eq!(intent.currency, "USD");
                assert_eq!(intent.latest_charge_id.as_deref(), Some("ch_1"));
                assert!(intent.metadata.is_upcharge);
                assert_eq!(intent.metadata.booking_id, Some(booking_id));
                assert_eq!(intent.metadata.pending_edit_id, Some(edit_id));
                assert_eq!(intent.metadata.booking_type, Some(BookableKind::Tour));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_parse_charge_refunded_with_expanded_intent() {
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": { "object": {
                "id": "ch_1",
                "amount": 10000,
                "amount_refunded": 4000,
                "payment_intent": { "id": "pi_1", "object": "payment_intent" },
                "refunds": { "data": [
                    { "id": "re_1", "amount": 4000, "status": "succeeded", "payment_intent": "pi_1" }
                ]}
            }}
        })
        .to_string();

        let event = WebhookEvent::parse(&payload).unwrap();
        match event.kind {
            WebhookEventKind::ChargeRefunded(charge) => {
                assert_eq!(charge.payment_intent_id.as_deref(), Some("pi_1"));
                assert_eq!(charge.amount_refunded_cents, 4000);
                assert_eq!(charge.refunds.len(), 1);
                assert_eq!(charge.refunds[0].status, "succeeded");
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let payload = r#"{"id":"evt_3","type":"customer.created","data":{"object":{"id":"cus_1"}}}"#;
        let event = WebhookEvent::parse(payload).unwrap();
        assert!(matches!(event.kind, WebhookEventKind::Unrecognized));
        assert_eq!(event.event_type, "customer.created");
    }

    #[test]
    fn test_malformed_known_type_is_bad_request() {
        let payload = r#"{"id":"evt_4","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        assert!(matches!(WebhookEvent::parse(payload), Err(AppError::BadRequest(_))));
    }
}
