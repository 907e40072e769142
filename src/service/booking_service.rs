use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::*,
    error::{AppError, Result},
    payments::{
        CreateIntent, CreateRefund, GatewayIntent, IntentMetadata, IntentStatus, PaymentGateway,
    },
    repository::{
        BookingRepository, CatalogRepository, OutboxRepository, PaymentRepository,
        PendingEditRepository,
    },
    service::pricing,
};

const REFERENCE_PREFIX: &str = "TD-";
const REFERENCE_LEN: usize = 8;
// No 0/O or 1/I, references get read out over the phone.
const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub struct BookingService {
    catalog: Arc<dyn CatalogRepository>,
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    edits: Arc<dyn PendingEditRepository>,
    outbox: Arc<dyn OutboxRepository>,
    gateway: Option<Arc<dyn PaymentGateway>>,
}

impl BookingService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        edits: Arc<dyn PendingEditRepository>,
        outbox: Arc<dyn OutboxRepository>,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self {
            catalog,
            bookings,
            payments,
            edits,
            outbox,
            gateway,
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>> {
        self.gateway
            .as_ref()
            .ok_or_else(|| AppError::ServiceUnavailable("Payments are not configured".to_string()))
    }

    pub async fn get_booking(&self, id: Uuid) -> Result<Booking> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    pub async fn list_bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>> {
        self.bookings.list_by_user(user_id).await
    }

    pub async fn list_payments(&self, booking_id: Uuid) -> Result<Vec<PaymentView>> {
        let booking = self.get_booking(booking_id).await?;
        let payments = self.payments.list_by_booking(booking_id).await?;

        let mut views = Vec::with_capacity(payments.len());
        for payment in payments {
            let edit_status = match payment.pending_edit_id {
                Some(edit_id) => self.edits.find_by_id(edit_id).await?.map(|e| e.status),
                None => None,
            };
            let reconciliation_state =
                ReconciliationState::derive(booking.status, &payment, edit_status);
            views.push(PaymentView {
                payment,
                reconciliation_state,
            });
        }

        Ok(views)
    }

    /// Looks up every part of a selection and checks they are active and
    /// belong together. Any stale or mismatched reference is a `NotFound`.
    pub async fn resolve_selection(
        &self,
        bookable_id: Uuid,
        selection: Selection,
    ) -> Result<ResolvedSelection> {
        let bookable = self
            .catalog
            .find_bookable(bookable_id)
            .await?
            .filter(|b| b.active)
            .ok_or_else(|| AppError::NotFound("Bookable not found".to_string()))?;

        let schedule = self
            .catalog
            .find_schedule(selection.schedule_id)
            .await?
            .filter(|s| s.active && s.bookable_id == bookable.id)
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

        let pickup = self
            .catalog
            .find_pickup(selection.pickup_id)
            .await?
            .filter(|p| {
                p.active
                    && p.bookable_id == bookable.id
                    && p.schedule_id.map_or(true, |id| id == schedule.id)
            })
            .ok_or_else(|| AppError::NotFound("Pickup location not found".to_string()))?;

        let pickup_time = self
            .catalog
            .find_pickup_time(selection.pickup_time_id)
            .await?
            .filter(|t| t.active && t.pickup_id == pickup.id)
            .ok_or_else(|| AppError::NotFound("Pickup time not found".to_string()))?;

        Ok(ResolvedSelection {
            bookable,
            schedule,
            pickup,
            pickup_time,
        })
    }

    pub async fn create_booking(&self, user_id: Uuid, request: CreateBookingRequest) -> Result<Booking> {
        request.validate()?;

        let bookable_id = required(request.bookable_id, "bookable_id")?;
        let selection = Selection {
            schedule_id: required(request.schedule_id, "schedule_id")?,
            pickup_id: required(request.pickup_location_id, "pickup_location_id")?,
            pickup_time_id: required(request.pickup_time_id, "pickup_time_id")?,
        };

        let resolved = self.resolve_selection(bookable_id, selection).await?;
        if resolved.schedule.has_started(Utc::now()) {
            return Err(AppError::Validation("This date is no longer bookable".to_string()));
        }

        let pricing = pricing::calculate(
            &resolved.pickup,
            &resolved.bookable.currency,
            request.adult_count,
            request.child_count,
        )?;

        let booking = self
            .bookings
            .create(NewBooking {
                reference: generate_reference(),
                user_id,
                contact_name: request.contact_name.trim().to_string(),
                contact_email: request.contact_email.trim().to_string(),
                booking_type: resolved.bookable.kind,
                bookable_id: resolved.bookable.id,
                selection: resolved.selection(),
                adult_count: request.adult_count,
                child_count: request.child_count,
                pricing,
                notes: request.notes.unwrap_or_default(),
            })
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            reference = %booking.reference,
            total_cents = booking.pricing.total_cents,
            "Created booking"
        );

        Ok(booking)
    }

    /// Returns a confirmable PaymentIntent for a pending booking, reusing the
    /// last one when it is still usable for the same amount. Any other pending
    /// intent is canceled first so only one can ever be paid.
    pub async fn initiate_payment(&self, booking_id: Uuid, amount_cents: i64) -> Result<PaymentIntentResponse> {
        let gateway = self.gateway()?;
        let booking = self.get_booking(booking_id).await?;

        if booking.status != BookingStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Booking is {}, not awaiting payment",
                booking.status.as_str()
            )));
        }
        if amount_cents != booking.pricing.total_cents {
            return Err(AppError::Validation(format!(
                "Amount {} does not match the booking total {}",
                amount_cents, booking.pricing.total_cents
            )));
        }

        if let Some(existing) = self.payments.find_latest_pending(booking.id, PaymentKind::Initial).await? {
            let intent = gateway.retrieve_intent(&existing.intent_id).await?;
            if existing.amount_cents == amount_cents
                && intent.amount_cents == amount_cents
                && intent.status.is_reusable()
            {
                if let Some(client_secret) = intent.client_secret.clone() {
                    tracing::debug!(intent_id = %intent.id, "Reusing pending PaymentIntent");
                    return Ok(PaymentIntentResponse {
                        client_secret,
                        payment_intent_id: intent.id.clone(),
                        amount_cents,
                        currency: booking.pricing.currency.clone(),
                    });
                }
            }
            self.retire_intent(gateway, &existing, &intent).await?;
        }

        let attempt = self
            .payments
            .list_by_booking(booking.id)
            .await?
            .iter()
            .filter(|p| p.kind == PaymentKind::Initial)
            .count();

        let metadata = IntentMetadata {
            booking_id: booking.id,
            booking_type: booking.booking_type,
            booking_reference: booking.reference.clone(),
            pending_edit_id: None,
        };

        let intent = gateway
            .create_intent(CreateIntent {
                amount_cents,
                currency: booking.pricing.currency.clone(),
                metadata: metadata.clone(),
                idempotency_key: format!("booking-{}-{}-{}", booking.id, amount_cents, attempt),
                description: format!("Booking {}", booking.reference),
                receipt_email: Some(booking.contact_email.clone()),
            })
            .await?;

        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| AppError::PaymentGateway("PaymentIntent has no client secret".to_string()))?;

        if self.payments.find_by_intent_id(&intent.id).await?.is_none() {
            self.payments
                .create(NewPayment {
                    booking_id: booking.id,
                    kind: PaymentKind::Initial,
                    intent_id: intent.id.clone(),
                    amount_cents,
                    currency: booking.pricing.currency.clone(),
                    pending_edit_id: None,
                    metadata: serde_json::to_value(metadata.to_map())?,
                })
                .await?;
        }

        Ok(PaymentIntentResponse {
            client_secret,
            payment_intent_id: intent.id,
            amount_cents,
            currency: booking.pricing.currency,
        })
    }

    async fn load_editable(&self, booking_id: Uuid) -> Result<Booking> {
        let booking = self.get_booking(booking_id).await?;

        if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
            return Err(AppError::Conflict(format!(
                "A {} booking cannot be edited",
                booking.status.as_str()
            )));
        }

        let schedule = self
            .catalog
            .find_schedule(booking.schedule_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;
        if schedule.has_started(Utc::now()) {
            return Err(AppError::Conflict("The booked date has already started".to_string()));
        }

        Ok(booking)
    }

    async fn quote(&self, booking: &Booking, request: &EditBookingRequest) -> Result<EditQuote> {
        request.validate()?;

        let resolved = self.resolve_selection(booking.bookable_id, request.selection()).await?;
        if resolved.schedule.has_started(Utc::now()) {
            return Err(AppError::Validation("The new date is no longer bookable".to_string()));
        }

        let pricing = pricing::calculate(
            &resolved.pickup,
            &resolved.bookable.currency,
            request.adult_count,
            request.child_count,
        )?;
        let diff = pricing::diff(&booking.pricing, &pricing)?;

        Ok(EditQuote { diff, pricing })
    }

    pub async fn calculate_edit_price_diff(&self, booking_id: Uuid, request: &EditBookingRequest) -> Result<EditQuote> {
        let booking = self.load_editable(booking_id).await?;
        self.quote(&booking, request).await
    }

    /// Routes an edit by its price difference.
    pub async fn apply_edit(&self, booking_id: Uuid, request: &EditBookingRequest) -> Result<EditOutcome> {
        let booking = self.load_editable(booking_id).await?;
        let quote = self.quote(&booking, request).await?;

        match quote.diff.classification {
            DiffClassification::NoChange => self.update_booking_direct(booking_id, request).await,
            DiffClassification::Downgrade => self.refund_downgrade(booking_id, request).await,
            DiffClassification::Upcharge => self.create_upcharge_intent(booking_id, request).await,
        }
    }

    /// Applies an edit whose total is unchanged. A pending booking has not
    /// been charged yet, so it accepts any total.
    pub async fn update_booking_direct(&self, booking_id: Uuid, request: &EditBookingRequest) -> Result<EditOutcome> {
        let booking = self.load_editable(booking_id).await?;
        let quote = self.quote(&booking, request).await?;

        if quote.diff.classification != DiffClassification::NoChange && !self.is_unpaid(&booking).await? {
            return Err(AppError::Validation(format!(
                "This edit changes the total by {} and must go through the payment flow",
                quote.diff.difference_cents
            )));
        }

        let updated = self.write_changes(&booking, request, quote).await?;
        Ok(EditOutcome::Updated { booking: updated })
    }

    pub async fn refund_downgrade(&self, booking_id: Uuid, request: &EditBookingRequest) -> Result<EditOutcome> {
        let booking = self.load_editable(booking_id).await?;
        let quote = self.quote(&booking, request).await?;

        if quote.diff.classification != DiffClassification::Downgrade {
            return Err(AppError::Validation("This edit does not lower the booking total".to_string()));
        }

        let payment = match self.payments.find_latest_completed(booking.id).await? {
            Some(payment) => payment,
            None if booking.status == BookingStatus::Pending => {
                let updated = self.write_changes(&booking, request, quote).await?;
                return Ok(EditOutcome::Updated { booking: updated });
            }
            None => {
                return Err(AppError::Conflict("No completed payment to refund".to_string()));
            }
        };

        self.supersede_awaiting_edits(&booking).await?;

        let amount_cents = quote.diff.difference_cents.abs();
        let idempotency_key = format!(
            "downgrade-{}-{}-{}",
            booking.id, payment.id, quote.pricing.total_cents
        );
        let refund = self
            .issue_refund(&booking, &payment, amount_cents, "booking_downgrade", idempotency_key)
            .await?;

        let updated = self.write_changes(&booking, request, quote).await?;
        Ok(EditOutcome::RefundIssued {
            booking: updated,
            refund,
        })
    }

    /// Persists the edit as pending and asks the customer to pay the
    /// difference. The booking changes when the upcharge succeeds.
    pub async fn create_upcharge_intent(&self, booking_id: Uuid, request: &EditBookingRequest) -> Result<EditOutcome> {
        let booking = self.load_editable(booking_id).await?;
        let quote = self.quote(&booking, request).await?;

        if quote.diff.classification != DiffClassification::Upcharge {
            return Err(AppError::Validation("This edit does not raise the booking total".to_string()));
        }

        if self.is_unpaid(&booking).await? {
            let updated = self.write_changes(&booking, request, quote).await?;
            return Ok(EditOutcome::Updated { booking: updated });
        }

        let gateway = self.gateway()?;
        let amount_cents = quote.diff.difference_cents;
        let currency = quote.pricing.currency.clone();

        self.supersede_awaiting_edits(&booking).await?;

        let edit = self
            .edits
            .create(NewPendingEdit {
                booking_id: booking.id,
                selection: request.selection(),
                adult_count: request.adult_count,
                child_count: request.child_count,
                base_total_cents: booking.pricing.total_cents,
                quoted: quote.pricing,
            })
            .await?;

        let metadata = IntentMetadata {
            booking_id: booking.id,
            booking_type: booking.booking_type,
            booking_reference: booking.reference.clone(),
            pending_edit_id: Some(edit.id),
        };

        let intent = gateway
            .create_intent(CreateIntent {
                amount_cents,
                currency: currency.clone(),
                metadata: metadata.clone(),
                idempotency_key: format!("upcharge-{}", edit.id),
                description: format!("Booking {} change", booking.reference),
                receipt_email: Some(booking.contact_email.clone()),
            })
            .await?;

        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| AppError::PaymentGateway("PaymentIntent has no client secret".to_string()))?;

        self.payments
            .create(NewPayment {
                booking_id: booking.id,
                kind: PaymentKind::Upcharge,
                intent_id: intent.id.clone(),
                amount_cents,
                currency: currency.clone(),
                pending_edit_id: Some(edit.id),
                metadata: serde_json::to_value(metadata.to_map())?,
            })
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            pending_edit_id = %edit.id,
            intent_id = %intent.id,
            amount_cents,
            "Created upcharge PaymentIntent"
        );

        Ok(EditOutcome::PaymentRequired {
            pending_edit_id: edit.id,
            payment_intent_id: intent.id,
            client_secret,
            amount_cents,
            currency,
        })
    }

    /// Merges a paid-for pending edit into its booking. Pricing is derived
    /// again from the current catalog; stale references fail with
    /// `NotFound`. An edit priced against a total the booking no longer has
    /// fails with `Conflict`. Applying an already applied edit is a no-op.
    pub async fn apply_pending_edit(&self, pending_edit_id: Uuid) -> Result<Booking> {
        let edit = self
            .edits
            .find_by_id(pending_edit_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Pending edit not found".to_string()))?;

        match edit.status {
            PendingEditStatus::Applied => return self.get_booking(edit.booking_id).await,
            PendingEditStatus::AwaitingPayment => {}
            other => {
                return Err(AppError::Conflict(format!("Pending edit is {:?}", other)));
            }
        }

        let booking = self.get_booking(edit.booking_id).await?;
        if booking.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Booking is {}",
                booking.status.as_str()
            )));
        }

        if booking.pricing.total_cents != edit.base_total_cents {
            return Err(AppError::Conflict(format!(
                "Booking total is {} but the change was priced against {}",
                booking.pricing.total_cents, edit.base_total_cents
            )));
        }

        let resolved = self.resolve_selection(booking.bookable_id, edit.selection).await?;
        let pricing = pricing::calculate(
            &resolved.pickup,
            &resolved.bookable.currency,
            edit.adult_count,
            edit.child_count,
        )?;

        if pricing.total_cents != edit.quoted_total_cents {
            tracing::warn!(
                pending_edit_id = %edit.id,
                quoted = edit.quoted_total_cents,
                current = pricing.total_cents,
                "Catalog prices changed while the upcharge was in flight"
            );
        }

        let updated = self
            .bookings
            .apply_changes(
                booking.id,
                &BookingChanges {
                    selection: resolved.selection(),
                    adult_count: edit.adult_count,
                    child_count: edit.child_count,
                    pricing,
                },
            )
            .await?;

        self.edits
            .transition_status(edit.id, &[PendingEditStatus::AwaitingPayment], PendingEditStatus::Applied, None)
            .await?;

        tracing::info!(booking_id = %booking.id, pending_edit_id = %edit.id, "Applied pending edit");

        Ok(updated)
    }

    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking> {
        let booking = self.get_booking(booking_id).await?;

        if booking.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Booking is already {}",
                booking.status.as_str()
            )));
        }

        let schedule = self
            .catalog
            .find_schedule(booking.schedule_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;
        if schedule.has_started(Utc::now()) {
            return Err(AppError::Conflict(
                "Bookings cannot be cancelled once the date has passed".to_string(),
            ));
        }

        let cancelled = self
            .bookings
            .transition_status(
                booking.id,
                &BookingStatus::sources_of(BookingStatus::Cancelled),
                BookingStatus::Cancelled,
            )
            .await?
            .ok_or_else(|| AppError::Conflict("Booking changed while cancelling".to_string()))?;

        self.record_event(NewDomainEvent::booking_cancelled(booking.id)).await;
        if let Err(e) = self.bookings.append_note(booking.id, "Cancelled by customer").await {
            tracing::warn!(booking_id = %booking.id, "Failed to add cancellation note: {}", e);
        }

        tracing::info!(booking_id = %booking.id, reference = %booking.reference, "Cancelled booking");

        Ok(cancelled)
    }

    /// Refunds a completed payment fully or partially. The refund stays
    /// pending until the provider confirms it by webhook.
    pub async fn request_refund(&self, booking_id: Uuid, request: AdminRefundRequest) -> Result<RefundSummary> {
        let booking = self.get_booking(booking_id).await?;
        let payment = self
            .payments
            .find_latest_completed(booking.id)
            .await?
            .ok_or_else(|| AppError::Conflict("No completed payment to refund".to_string()))?;

        let remaining = payment.amount_cents - payment.refunded_cents;
        let amount_cents = request.amount_cents.unwrap_or(remaining);
        let idempotency_key = format!("refund-{}-{}-{}", payment.id, payment.refunded_cents, amount_cents);

        let refund = self
            .issue_refund(&booking, &payment, amount_cents, "requested_by_admin", idempotency_key)
            .await?;

        let note = match request.reason {
            Some(reason) => format!("Refund of {} {} requested: {}", amount_cents, payment.currency, reason),
            None => format!("Refund of {} {} requested", amount_cents, payment.currency),
        };
        self.bookings.append_note(booking.id, &note).await?;

        Ok(refund)
    }

    /// Moves confirmed bookings whose date has started to completed.
    pub async fn complete_past_bookings(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let due = self.bookings.list_confirmed_starting_before(now).await?;
        let mut completed = Vec::new();

        for booking in due {
            if let Some(done) = self
                .bookings
                .transition_status(booking.id, &BookingStatus::sources_of(BookingStatus::Completed), BookingStatus::Completed)
                .await?
            {
                completed.push(done);
            }
        }

        if !completed.is_empty() {
            tracing::info!("Marked {} bookings completed", completed.len());
        }

        Ok(completed)
    }

    /// Withdraws a pending intent that will not be handed out again. Fails
    /// when the provider may already be collecting it.
    async fn retire_intent(
        &self,
        gateway: &Arc<dyn PaymentGateway>,
        payment: &Payment,
        intent: &GatewayIntent,
    ) -> Result<()> {
        if intent.status.is_settling() {
            return Err(AppError::Conflict(
                "A previous payment for this booking is still being processed".to_string(),
            ));
        }
        if intent.status != IntentStatus::Canceled {
            gateway.cancel_intent(&intent.id).await?;
        }
        self.payments
            .transition_status(
                payment.id,
                &PaymentStatus::sources_of(PaymentStatus::Failed),
                PaymentStatus::Failed,
            )
            .await?;

        tracing::info!(booking_id = %payment.booking_id, intent_id = %intent.id, "Canceled stale PaymentIntent");
        Ok(())
    }

    /// Only the newest change may be paid for: earlier edits still awaiting
    /// their upcharge are abandoned and their intents canceled.
    async fn supersede_awaiting_edits(&self, booking: &Booking) -> Result<()> {
        let awaiting = self.edits.list_awaiting_payment(booking.id).await?;
        if awaiting.is_empty() {
            return Ok(());
        }

        let gateway = self.gateway()?;
        let payments = self.payments.list_by_booking(booking.id).await?;

        for edit in awaiting {
            for payment in payments
                .iter()
                .filter(|p| p.pending_edit_id == Some(edit.id) && p.status == PaymentStatus::Pending)
            {
                let intent = gateway.retrieve_intent(&payment.intent_id).await?;
                self.retire_intent(gateway, payment, &intent).await?;
            }

            self.edits
                .transition_status(
                    edit.id,
                    &[PendingEditStatus::AwaitingPayment],
                    PendingEditStatus::Abandoned,
                    Some("superseded by a newer change"),
                )
                .await?;

            tracing::info!(booking_id = %booking.id, pending_edit_id = %edit.id, "Abandoned superseded pending edit");
        }

        Ok(())
    }

    async fn is_unpaid(&self, booking: &Booking) -> Result<bool> {
        Ok(booking.status == BookingStatus::Pending
            && self.payments.find_latest_completed(booking.id).await?.is_none())
    }

    async fn write_changes(
        &self,
        booking: &Booking,
        request: &EditBookingRequest,
        quote: EditQuote,
    ) -> Result<Booking> {
        let difference_cents = quote.diff.difference_cents;
        let updated = self
            .bookings
            .apply_changes(
                booking.id,
                &BookingChanges {
                    selection: request.selection(),
                    adult_count: request.adult_count,
                    child_count: request.child_count,
                    pricing: quote.pricing,
                },
            )
            .await?;

        self.record_event(NewDomainEvent::booking_updated(booking.id, Uuid::new_v4(), difference_cents))
            .await;

        Ok(updated)
    }

    async fn issue_refund(
        &self,
        booking: &Booking,
        payment: &Payment,
        amount_cents: i64,
        reason: &str,
        idempotency_key: String,
    ) -> Result<RefundSummary> {
        let remaining = payment.amount_cents - payment.refunded_cents;
        if amount_cents <= 0 || amount_cents > remaining {
            return Err(AppError::Validation(format!(
                "Refund amount must be between 1 and {}",
                remaining
            )));
        }

        let gateway = self.gateway()?;
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("bookingId".to_string(), booking.id.to_string());
        metadata.insert("bookingReference".to_string(), booking.reference.clone());
        metadata.insert("reason".to_string(), reason.to_string());

        let refund = gateway
            .create_refund(CreateRefund {
                intent_id: payment.intent_id.clone(),
                amount_cents,
                metadata,
                idempotency_key,
            })
            .await?;

        self.payments
            .upsert_refund(&RefundRecord {
                id: refund.id.clone(),
                payment_id: payment.id,
                amount_cents: refund.amount_cents,
                status: refund.status.clone(),
            })
            .await?;

        // The refunded total only moves when the provider confirms.
        let refund_status = if payment.refunded_cents > 0 {
            payment.refund_status
        } else {
            RefundStatus::Pending
        };
        self.payments
            .update_refund_state(payment.id, refund_status, payment.refunded_cents, payment.status)
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            payment_id = %payment.id,
            refund_id = %refund.id,
            amount_cents,
            reason,
            "Requested refund"
        );

        Ok(RefundSummary {
            refund_id: refund.id,
            payment_id: payment.id,
            amount_cents: refund.amount_cents,
            currency: payment.currency.clone(),
            status: refund.status,
        })
    }

    /// Outbox writes after a committed transition are logged, not returned:
    /// the caller's change already happened.
    async fn record_event(&self, event: NewDomainEvent) {
        let kind = event.kind;
        let booking_id = event.booking_id;
        if let Err(e) = self.outbox.record(event).await {
            tracing::error!(%booking_id, kind = kind.as_str(), "Failed to record domain event: {}", e);
        }
    }
}

fn required(value: Option<Uuid>, field: &str) -> Result<Uuid> {
    value.ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERENCE_LEN)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", REFERENCE_PREFIX, suffix)
}
