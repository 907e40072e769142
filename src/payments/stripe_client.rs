use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use stripe::{
    CancelPaymentIntent, Charge, ChargeId, Client, CreatePaymentIntent,
    CreatePaymentIntentAutomaticPaymentMethods, Currency, Expandable, PaymentIntent,
    PaymentIntentId, PaymentIntentStatus, Refund, RequestStrategy,
};

use crate::{
    error::{AppError, Result},
    payments::gateway::{
        CreateIntent, CreateRefund, GatewayCharge, GatewayIntent, GatewayRefund, IntentStatus,
        PaymentGateway,
    },
};

/// `PaymentGateway` backed by the Stripe API.
pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    pub fn new(api_key: String) -> Self {
        let client = Client::new(api_key);
        Self { client }
    }

    fn idempotent_client(&self, key: &str) -> Client {
        self.client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(key.to_string()))
    }

    fn parse_currency(code: &str) -> Result<Currency> {
        code.to_lowercase()
            .parse::<Currency>()
            .map_err(|_| AppError::Validation(format!("Unsupported currency: {}", code)))
    }

    fn parse_intent_id(intent_id: &str) -> Result<PaymentIntentId> {
        intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| AppError::PaymentGateway(format!("Invalid PaymentIntent id {}: {}", intent_id, e)))
    }

    fn convert_status(status: PaymentIntentStatus) -> IntentStatus {
        match status {
            PaymentIntentStatus::RequiresPaymentMethod => IntentStatus::RequiresPaymentMethod,
            PaymentIntentStatus::RequiresConfirmation => IntentStatus::RequiresConfirmation,
            PaymentIntentStatus::RequiresAction => IntentStatus::RequiresAction,
            PaymentIntentStatus::Processing => IntentStatus::Processing,
            PaymentIntentStatus::RequiresCapture => IntentStatus::RequiresCapture,
            PaymentIntentStatus::Canceled => IntentStatus::Canceled,
            PaymentIntentStatus::Succeeded => IntentStatus::Succeeded,
        }
    }

    fn convert_intent(intent: PaymentIntent) -> GatewayIntent {
        let latest_charge_id = intent.latest_charge.as_ref().map(|charge| match charge {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(charge) => charge.id.to_string(),
        });

        GatewayIntent {
            id: intent.id.to_string(),
            client_secret: intent.client_secret.clone(),
            amount_cents: intent.amount,
            currency: intent.currency.to_string().to_uppercase(),
            status: Self::convert_status(intent.status),
            metadata: metadata_map(&intent.metadata),
            latest_charge_id,
        }
    }
}

/// Stripe metadata is a flat string map; normalize whatever shape the SDK
/// exposes it as.
fn metadata_map<T: Serialize>(metadata: &T) -> HashMap<String, String> {
    serde_json::to_value(metadata)
        .ok()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: CreateIntent) -> Result<GatewayIntent> {
        let currency = Self::parse_currency(&request.currency)?;
        let client = self.idempotent_client(&request.idempotency_key);

        let mut params = CreatePaymentIntent::new(request.amount_cents, currency);
        params.metadata = Some(request.metadata.to_map());
        params.description = Some(&request.description);
        params.receipt_email = request.receipt_email.as_deref();
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            ..Default::default()
        });

        let intent = PaymentIntent::create(&client, params).await?;

        tracing::info!(
            intent_id = %intent.id,
            booking_id = %request.metadata.booking_id,
            amount_cents = request.amount_cents,
            "Created PaymentIntent"
        );

        Ok(Self::convert_intent(intent))
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent> {
        let id = Self::parse_intent_id(intent_id)?;

        let intent = PaymentIntent::retrieve(&self.client, &id, &[]).await?;

        Ok(Self::convert_intent(intent))
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<GatewayIntent> {
        let id = Self::parse_intent_id(intent_id)?;

        let intent = PaymentIntent::cancel(&self.client, id.as_str(), CancelPaymentIntent::default()).await?;

        tracing::info!(intent_id = %intent.id, "Canceled PaymentIntent");

        Ok(Self::convert_intent(intent))
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<GatewayCharge> {
        let id = charge_id
            .parse::<ChargeId>()
            .map_err(|e| AppError::PaymentGateway(format!("Invalid charge id {}: {}", charge_id, e)))?;

        let charge = Charge::retrieve(&self.client, &id, &[]).await?;

        let payment_intent_id = charge.payment_intent.as_ref().map(|intent| match intent {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(intent) => intent.id.to_string(),
        });

        Ok(GatewayCharge {
            id: charge.id.to_string(),
            payment_intent_id,
            receipt_url: charge.receipt_url.clone(),
        })
    }

    async fn create_refund(&self, request: CreateRefund) -> Result<GatewayRefund> {
        let intent_id = Self::parse_intent_id(&request.intent_id)?;
        let client = self.idempotent_client(&request.idempotency_key);

        let mut params = stripe::CreateRefund::new();
        params.payment_intent = Some(intent_id);
        params.amount = Some(request.amount_cents);
        params.metadata = Some(request.metadata.clone());

        let refund = Refund::create(&client, params).await?;

        tracing::info!(
            refund_id = %refund.id,
            intent_id = %request.intent_id,
            amount_cents = refund.amount,
            "Created refund"
        );

        Ok(GatewayRefund {
            id: refund.id.to_string(),
            amount_cents: refund.amount,
            status: refund.status.clone().unwrap_or_else(|| "pending".to_string()),
        })
    }
}
