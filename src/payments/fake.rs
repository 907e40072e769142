use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    error::{AppError, Result},
    payments::gateway::{
        CreateIntent, CreateRefund, GatewayCharge, GatewayIntent, GatewayRefund, IntentStatus,
        PaymentGateway,
    },
};

/// In-memory gateway for tests. Honors idempotency keys the way Stripe does
/// and records every call so tests can assert on provider traffic.
#[derive(Default)]
pub struct FakePaymentGateway {
    state: Mutex<FakeState>,
    counter: AtomicUsize,
}

#[derive(Default)]
struct FakeState {
    intents: HashMap<String, GatewayIntent>,
    by_idempotency_key: HashMap<String, String>,
    charges: HashMap<String, GatewayCharge>,
    created: Vec<CreateIntent>,
    canceled: Vec<String>,
    refunds: Vec<CreateRefund>,
    fail_next: Option<String>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_fake_{:04}", prefix, n)
    }

    fn take_failure(&self) -> Result<()> {
        let mut state = self.lock();
        match state.fail_next.take() {
            Some(message) => Err(AppError::PaymentGateway(message)),
            None => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn find_by_idempotency_key(&self, key: &str) -> Option<GatewayIntent> {
        let state = self.lock();
        let id = state.by_idempotency_key.get(key)?;
        let intent = state.intents.get(id).cloned();
        intent
    }

    /// The next gateway call fails with a `PaymentGateway` error.
    pub fn fail_next_call(&self, message: &str) {
        self.lock().fail_next = Some(message.to_string());
    }

    pub fn set_intent_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.lock().intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    pub fn add_charge(&self, charge_id: &str, intent_id: &str, receipt_url: &str) {
        let mut state = self.lock();
        state.charges.insert(
            charge_id.to_string(),
            GatewayCharge {
                id: charge_id.to_string(),
                payment_intent_id: Some(intent_id.to_string()),
                receipt_url: Some(receipt_url.to_string()),
            },
        );
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.latest_charge_id = Some(charge_id.to_string());
        }
    }

    pub fn created_intents(&self) -> Vec<CreateIntent> {
        self.lock().created.clone()
    }

    pub fn canceled_intents(&self) -> Vec<String> {
        self.lock().canceled.clone()
    }

    pub fn intent_status(&self, intent_id: &str) -> Option<IntentStatus> {
        self.lock().intents.get(intent_id).map(|intent| intent.status)
    }

    pub fn refunds(&self) -> Vec<CreateRefund> {
        self.lock().refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_intent(&self, request: CreateIntent) -> Result<GatewayIntent> {
        self.take_failure()?;

        let existing = self.find_by_idempotency_key(&request.idempotency_key);
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let id = self.next_id("pi");
        let intent = GatewayIntent {
            id: id.clone(),
            client_secret: Some(format!("{}_secret", id)),
            amount_cents: request.amount_cents,
            currency: request.currency.to_uppercase(),
            status: IntentStatus::RequiresPaymentMethod,
            metadata: request.metadata.to_map(),
            latest_charge_id: None,
        };

        let mut state = self.lock();
        state.by_idempotency_key.insert(request.idempotency_key.clone(), id.clone());
        state.intents.insert(id, intent.clone());
        state.created.push(request);

        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent> {
        self.take_failure()?;
        self.lock()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| AppError::PaymentGateway(format!("No such payment_intent: {}", intent_id)))
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<GatewayIntent> {
        self.take_failure()?;
        let mut state = self.lock();
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| AppError::PaymentGateway(format!("No such payment_intent: {}", intent_id)))?;

        if intent.status.is_settling() {
            return Err(AppError::PaymentGateway(format!(
                "You cannot cancel this PaymentIntent because it has a status of {:?}",
                intent.status
            )));
        }
        intent.status = IntentStatus::Canceled;
        let canceled = intent.clone();
        state.canceled.push(intent_id.to_string());

        Ok(canceled)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<GatewayCharge> {
        self.take_failure()?;
        self.lock()
            .charges
            .get(charge_id)
            .cloned()
            .ok_or_else(|| AppError::PaymentGateway(format!("No such charge: {}", charge_id)))
    }

    async fn create_refund(&self, request: CreateRefund) -> Result<GatewayRefund> {
        self.take_failure()?;
        let id = self.next_id("re");
        let refund = GatewayRefund {
            id,
            amount_cents: request.amount_cents,
            status: "pending".to_string(),
        };
        self.lock().refunds.push(request);
        Ok(refund)
    }
}
