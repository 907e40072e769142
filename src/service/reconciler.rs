use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::*,
    error::Result,
    payments::{
        webhook::{ChargeObject, IntentObject, RefundObject},
        PaymentGateway, WebhookEvent, WebhookEventKind,
    },
    repository::{
        BookingRepository, OutboxRepository, PaymentRepository, PendingEditRepository,
        WebhookEventRepository,
    },
    service::BookingService,
};

/// What handling one webhook delivery amounted to. Every variant is
/// acknowledged to the provider; only an `Err` from `handle` asks for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Processed,
    /// Event id seen before.
    Duplicate,
    /// No local payment matches the intent.
    Orphan,
    /// Recognized, but carried nothing to act on.
    Ignored,
    Unrecognized,
    /// Upcharge succeeded but its edit could not be applied.
    EditFailed,
    /// Booking was already paid by another initial payment.
    DuplicatePayment,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Processed => "processed",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Orphan => "orphan",
            ReconcileOutcome::Ignored => "ignored",
            ReconcileOutcome::Unrecognized => "unrecognized",
            ReconcileOutcome::EditFailed => "edit_failed",
            ReconcileOutcome::DuplicatePayment => "duplicate_payment",
        }
    }
}

/// Applies provider events to local payment and booking state. Every
/// handler is safe to run more than once and in any order.
pub struct WebhookReconciler {
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    edits: Arc<dyn PendingEditRepository>,
    outbox: Arc<dyn OutboxRepository>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    booking_service: Arc<BookingService>,
    gateway: Arc<dyn PaymentGateway>,
}

impl WebhookReconciler {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        edits: Arc<dyn PendingEditRepository>,
        outbox: Arc<dyn OutboxRepository>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        booking_service: Arc<BookingService>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            bookings,
            payments,
            edits,
            outbox,
            webhook_events,
            booking_service,
            gateway,
        }
    }

    pub async fn handle(&self, event: WebhookEvent) -> Result<ReconcileOutcome> {
        if self.webhook_events.is_processed(&event.id).await? {
            tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook delivery");
            return Ok(ReconcileOutcome::Duplicate);
        }

        let outcome = match event.kind {
            WebhookEventKind::PaymentIntentSucceeded(intent) => self.on_intent_succeeded(intent).await?,
            WebhookEventKind::PaymentIntentFailed(intent) => self.on_intent_failed(intent).await?,
            WebhookEventKind::PaymentIntentCanceled(intent) => self.on_intent_canceled(intent).await?,
            WebhookEventKind::ChargeRefunded(charge) => {
                let total = Some(charge.amount_refunded_cents);
                self.on_refund_activity(charge.payment_intent_id, charge.refunds, total)
                    .await?
            }
            WebhookEventKind::ChargeRefundUpdated(refund) => self.on_refund_updated(refund).await?,
            WebhookEventKind::ChargeUpdated(charge) => self.on_charge_updated(charge).await?,
            WebhookEventKind::Unrecognized => {
                tracing::debug!(event_type = %event.event_type, "Unhandled webhook event type");
                ReconcileOutcome::Unrecognized
            }
        };

        self.webhook_events
            .mark_processed(&event.id, &event.event_type, outcome.as_str())
            .await?;

        Ok(outcome)
    }

    async fn find_payment(&self, intent_id: &str, booking_hint: Option<Uuid>) -> Result<Option<Payment>> {
        let payment = self.payments.find_by_intent_id(intent_id).await?;
        if payment.is_none() {
            tracing::warn!(
                intent_id,
                booking_id = ?booking_hint,
                "No payment record for intent; ignoring event"
            );
        }
        Ok(payment)
    }

    /// pending/failed -> completed. Never moves a refunded payment back.
    async fn mark_completed(&self, payment: &Payment) -> Result<()> {
        match payment.status {
            PaymentStatus::Completed => {}
            PaymentStatus::Refunded => {
                tracing::warn!(payment_id = %payment.id, "Success event for a refunded payment; leaving as refunded");
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {
                self.payments
                    .transition_status(
                        payment.id,
                        &PaymentStatus::sources_of(PaymentStatus::Completed),
                        PaymentStatus::Completed,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn store_receipt(&self, payment: &Payment, charge_id: Option<&str>) -> Result<()> {
        let Some(charge_id) = charge_id else {
            return Ok(());
        };
        if payment.receipt_url.is_some() {
            return Ok(());
        }

        match self.gateway.retrieve_charge(charge_id).await {
            Ok(charge) => {
                if let Some(url) = charge.receipt_url {
                    self.payments.set_receipt_url(payment.id, &url).await?;
                }
            }
            Err(e) => {
                tracing::warn!(payment_id = %payment.id, charge_id, "Could not fetch receipt: {}", e);
            }
        }
        Ok(())
    }

    async fn on_intent_succeeded(&self, intent: IntentObject) -> Result<ReconcileOutcome> {
        let Some(payment) = self.find_payment(&intent.id, intent.metadata.booking_id).await? else {
            return Ok(ReconcileOutcome::Orphan);
        };

        if payment.amount_cents != intent.amount_cents {
            tracing::warn!(
                intent_id = %intent.id,
                recorded = payment.amount_cents,
                received = intent.amount_cents,
                "Intent amount differs from the recorded payment"
            );
        }

        if payment.kind == PaymentKind::Upcharge || intent.metadata.is_upcharge {
            return self.on_upcharge_succeeded(payment, intent).await;
        }

        self.mark_completed(&payment).await?;
        self.store_receipt(&payment, intent.latest_charge_id.as_deref()).await?;

        let Some(booking) = self.bookings.find_by_id(payment.booking_id).await? else {
            tracing::error!(booking_id = %payment.booking_id, intent_id = %intent.id, "Payment references a missing booking");
            return Ok(ReconcileOutcome::Orphan);
        };

        let already_paid = self
            .payments
            .list_by_booking(booking.id)
            .await?
            .into_iter()
            .any(|p| {
                p.id != payment.id
                    && p.kind == PaymentKind::Initial
                    && matches!(p.status, PaymentStatus::Completed | PaymentStatus::Refunded)
            });
        if already_paid {
            tracing::error!(
                booking_id = %booking.id,
                intent_id = %intent.id,
                amount_cents = intent.amount_cents,
                "Second initial payment completed for an already paid booking"
            );
            self.bookings
                .append_note(
                    booking.id,
                    &format!("Duplicate payment {} collected; refund required", intent.id),
                )
                .await?;
            self.outbox
                .record(NewDomainEvent::duplicate_payment(booking.id, &intent.id, intent.amount_cents))
                .await?;
            return Ok(ReconcileOutcome::DuplicatePayment);
        }

        let confirmed = match booking.status {
            BookingStatus::Pending => self
                .bookings
                .transition_status(booking.id, &BookingStatus::sources_of(BookingStatus::Confirmed), BookingStatus::Confirmed)
                .await?
                .map(|b| b.status == BookingStatus::Confirmed)
                .unwrap_or(false),
            BookingStatus::Confirmed | BookingStatus::Completed => true,
            BookingStatus::Cancelled => {
                tracing::error!(
                    booking_id = %booking.id,
                    intent_id = %intent.id,
                    "Payment succeeded for a cancelled booking; needs manual refund"
                );
                false
            }
        };

        if confirmed {
            tracing::info!(booking_id = %booking.id, intent_id = %intent.id, "Booking confirmed");
            self.outbox.record(NewDomainEvent::booking_confirmed(booking.id)).await?;
            self.outbox.record(NewDomainEvent::review_followup(booking.id)).await?;
        }

        Ok(ReconcileOutcome::Processed)
    }

    async fn on_upcharge_succeeded(&self, payment: Payment, intent: IntentObject) -> Result<ReconcileOutcome> {
        self.mark_completed(&payment).await?;
        self.store_receipt(&payment, intent.latest_charge_id.as_deref()).await?;

        let Some(edit_id) = payment.pending_edit_id.or(intent.metadata.pending_edit_id) else {
            tracing::error!(intent_id = %intent.id, booking_id = %payment.booking_id, "Upcharge has no pending edit");
            self.bookings
                .append_note(
                    payment.booking_id,
                    &format!("Upcharge {} succeeded with no pending edit attached", intent.id),
                )
                .await?;
            return Ok(ReconcileOutcome::EditFailed);
        };

        match self.booking_service.apply_pending_edit(edit_id).await {
            Ok(booking) => {
                self.outbox
                    .record(NewDomainEvent::booking_updated(booking.id, edit_id, intent.amount_cents))
                    .await?;
                Ok(ReconcileOutcome::Processed)
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(
                    intent_id = %intent.id,
                    booking_id = %payment.booking_id,
                    pending_edit_id = %edit_id,
                    "Upcharge paid but edit could not be applied: {}",
                    reason
                );

                self.edits
                    .transition_status(
                        edit_id,
                        &[PendingEditStatus::AwaitingPayment],
                        PendingEditStatus::Failed,
                        Some(&reason),
                    )
                    .await?;
                self.bookings
                    .append_note(
                        payment.booking_id,
                        &format!("Upcharge {} paid but the change could not be applied: {}", intent.id, reason),
                    )
                    .await?;
                self.outbox
                    .record(NewDomainEvent::edit_reconciliation_failed(
                        payment.booking_id,
                        edit_id,
                        &intent.id,
                        &reason,
                    ))
                    .await?;

                Ok(ReconcileOutcome::EditFailed)
            }
        }
    }

    async fn on_intent_failed(&self, intent: IntentObject) -> Result<ReconcileOutcome> {
        let Some(payment) = self.find_payment(&intent.id, intent.metadata.booking_id).await? else {
            return Ok(ReconcileOutcome::Orphan);
        };

        let failed = match payment.status {
            PaymentStatus::Pending => self
                .payments
                .transition_status(payment.id, &PaymentStatus::sources_of(PaymentStatus::Failed), PaymentStatus::Failed)
                .await?
                .is_some(),
            PaymentStatus::Failed => true,
            PaymentStatus::Completed | PaymentStatus::Refunded => {
                tracing::debug!(intent_id = %intent.id, "Failure event after completion; ignoring");
                false
            }
        };

        if failed {
            tracing::info!(
                intent_id = %intent.id,
                booking_id = %payment.booking_id,
                reason = ?intent.failure_message,
                "Payment failed"
            );
            self.outbox
                .record(NewDomainEvent::payment_failed(
                    payment.booking_id,
                    &intent.id,
                    intent.failure_message.as_deref(),
                ))
                .await?;
        }

        Ok(ReconcileOutcome::Processed)
    }

    async fn on_intent_canceled(&self, intent: IntentObject) -> Result<ReconcileOutcome> {
        let Some(payment) = self.find_payment(&intent.id, intent.metadata.booking_id).await? else {
            return Ok(ReconcileOutcome::Orphan);
        };

        self.payments
            .transition_status(payment.id, &PaymentStatus::sources_of(PaymentStatus::Failed), PaymentStatus::Failed)
            .await?;

        if let Some(edit_id) = payment.pending_edit_id {
            self.edits
                .transition_status(
                    edit_id,
                    &[PendingEditStatus::AwaitingPayment],
                    PendingEditStatus::Abandoned,
                    Some("payment intent canceled"),
                )
                .await?;
        }

        tracing::info!(intent_id = %intent.id, booking_id = %payment.booking_id, "PaymentIntent canceled");
        Ok(ReconcileOutcome::Processed)
    }

    async fn on_refund_updated(&self, refund: RefundObject) -> Result<ReconcileOutcome> {
        let intent_id = match (&refund.payment_intent_id, &refund.charge_id) {
            (Some(intent_id), _) => Some(intent_id.clone()),
            (None, Some(charge_id)) => self.gateway.retrieve_charge(charge_id).await?.payment_intent_id,
            (None, None) => None,
        };
        self.on_refund_activity(intent_id, vec![refund], None).await
    }

    /// Folds refund reports into the payment. Totals only grow, so events
    /// arriving out of order converge on the same state.
    async fn on_refund_activity(
        &self,
        intent_id: Option<String>,
        refunds: Vec<RefundObject>,
        reported_total: Option<i64>,
    ) -> Result<ReconcileOutcome> {
        let Some(intent_id) = intent_id else {
            tracing::warn!("Refund event without a payment intent; ignoring");
            return Ok(ReconcileOutcome::Ignored);
        };
        let Some(payment) = self.find_payment(&intent_id, None).await? else {
            return Ok(ReconcileOutcome::Orphan);
        };

        for refund in &refunds {
            self.payments
                .upsert_refund(&RefundRecord {
                    id: refund.id.clone(),
                    payment_id: payment.id,
                    amount_cents: refund.amount_cents,
                    status: refund.status.clone(),
                })
                .await?;
        }

        let known = self.payments.list_refunds(payment.id).await?;
        let succeeded: i64 = known.iter().filter(|r| r.succeeded()).map(|r| r.amount_cents).sum();
        let refunded_cents = payment
            .refunded_cents
            .max(succeeded)
            .max(reported_total.unwrap_or(0))
            .min(payment.amount_cents);

        let refund_status = if refunded_cents > 0 {
            RefundStatus::Refunded
        } else if known.iter().any(|r| r.status == "pending" || r.status == "requires_action") {
            RefundStatus::Pending
        } else if known.iter().any(|r| r.status == "failed" || r.status == "canceled") {
            RefundStatus::Failed
        } else {
            payment.refund_status
        };

        let status = if refunded_cents >= payment.amount_cents
            && payment.status.can_transition_to(PaymentStatus::Refunded)
        {
            PaymentStatus::Refunded
        } else {
            payment.status
        };

        self.payments
            .update_refund_state(payment.id, refund_status, refunded_cents, status)
            .await?;

        if refunded_cents > 0 {
            let recorded = self
                .outbox
                .record(NewDomainEvent::refund_confirmed(
                    payment.booking_id,
                    payment.id,
                    refunded_cents,
                    &payment.currency,
                ))
                .await?;
            if recorded {
                tracing::info!(
                    payment_id = %payment.id,
                    booking_id = %payment.booking_id,
                    refunded_cents,
                    "Refund confirmed"
                );
            }
        }

        Ok(ReconcileOutcome::Processed)
    }

    async fn on_charge_updated(&self, charge: ChargeObject) -> Result<ReconcileOutcome> {
        let Some(receipt_url) = charge.receipt_url else {
            return Ok(ReconcileOutcome::Ignored);
        };

        let by_intent = match &charge.payment_intent_id {
            Some(intent_id) => self.payments.find_by_intent_id(intent_id).await?,
            None => None,
        };
        let payment = match (by_intent, charge.metadata.booking_id) {
            (Some(payment), _) => Some(payment),
            (None, Some(booking_id)) => self.payments.find_latest_completed(booking_id).await?,
            (None, None) => None,
        };

        let Some(payment) = payment else {
            tracing::warn!(charge_id = %charge.id, "No payment for updated charge; ignoring");
            return Ok(ReconcileOutcome::Orphan);
        };

        self.payments.set_receipt_url(payment.id, &receipt_url).await?;
        tracing::debug!(payment_id = %payment.id, "Stored receipt URL");

        Ok(ReconcileOutcome::Processed)
    }
}
