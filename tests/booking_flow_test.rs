mod common;

use common::TestApp;
use tourdesk::{
    domain::{
        BookingStatus, DiffClassification, DomainEventKind, EditOutcome, NewBooking, PaymentKind,
        PaymentStatus, RefundStatus, Selection,
    },
    error::AppError,
    payments::IntentStatus,
    repository::{BookingRepository, CatalogRepository, OutboxRepository, PaymentRepository},
    service::{booking_service::generate_reference, pricing},
};
use uuid::Uuid;

#[tokio::test]
async fn test_create_booking_prices_from_catalog() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let user_id = Uuid::new_v4();

    let booking = app
        .ctx
        .booking_service
        .create_booking(user_id, app.create_request(2, 1))
        .await?;

    assert_eq!(booking.status, BookingStatus::Pending);
    assert!(booking.reference.starts_with("TD-"));
    assert_eq!(booking.pricing.adult_total_cents, 10000);
    assert_eq!(booking.pricing.child_total_cents, 2500);
    assert_eq!(booking.pricing.total_cents, 12500);
    assert_eq!(booking.pricing.currency, "USD");

    let mine = app.ctx.booking_service.list_bookings_for_user(user_id).await?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, booking.id);

    Ok(())
}

#[tokio::test]
async fn test_create_booking_rejects_stale_selection() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    app.ctx.catalog_repo.set_pickup_active(app.catalog.harbour.id, false).await?;
    let err = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), app.create_request(2, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {:?}", err);

    // A pickup time that belongs to another pickup
    let mut request = app.create_request(2, 0);
    request.pickup_location_id = Some(app.catalog.station.id);
    request.pickup_time_id = Some(app.catalog.village_time.id);
    let err = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {:?}", err);

    Ok(())
}

#[tokio::test]
async fn test_create_booking_rejects_past_date_and_missing_fields() -> anyhow::Result<()> {
    let app = TestApp::new().await?;

    let mut request = app.create_request(2, 0);
    request.schedule_id = Some(app.catalog.past_schedule.id);
    let err = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);

    let mut request = app.create_request(2, 0);
    request.pickup_time_id = None;
    let err = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);

    Ok(())
}

#[tokio::test]
async fn test_initiate_payment_reuses_open_intent() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let booking = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), app.create_request(2, 0))
        .await?;

    let first = app.ctx.booking_service.initiate_payment(booking.id, 10000).await?;
    let second = app.ctx.booking_service.initiate_payment(booking.id, 10000).await?;

    assert_eq!(first.payment_intent_id, second.payment_intent_id);
    assert_eq!(first.client_secret, second.client_secret);
    assert_eq!(app.gateway.created_intents().len(), 1);

    let payments = app.ctx.payment_repo.list_by_booking(booking.id).await?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].kind, PaymentKind::Initial);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    assert_eq!(payments[0].metadata["bookingId"], booking.id.to_string());

    let err = app
        .ctx
        .booking_service
        .initiate_payment(booking.id, 9999)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);

    Ok(())
}

#[tokio::test]
async fn test_initiate_payment_surfaces_gateway_failure() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let booking = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), app.create_request(1, 0))
        .await?;

    app.gateway.fail_next_call("card network unavailable");
    let err = app
        .ctx
        .booking_service
        .initiate_payment(booking.id, booking.pricing.total_cents)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaymentGateway(_)), "got {:?}", err);
    assert!(app.ctx.payment_repo.list_by_booking(booking.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_changed_amount_cancels_previous_intent() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let booking = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), app.create_request(2, 0))
        .await?;
    let first = app.ctx.booking_service.initiate_payment(booking.id, 10000).await?;

    // Unpaid edit to 3 adults raises the total to 150.00
    app.ctx
        .booking_service
        .apply_edit(booking.id, &app.edit_to(&app.catalog.harbour, &app.catalog.harbour_time, 3, 0))
        .await?;
    let second = app.ctx.booking_service.initiate_payment(booking.id, 15000).await?;

    assert_ne!(first.payment_intent_id, second.payment_intent_id);
    assert_eq!(app.gateway.canceled_intents(), vec![first.payment_intent_id.clone()]);
    assert_eq!(app.gateway.intent_status(&first.payment_intent_id), Some(IntentStatus::Canceled));

    let stale = app
        .ctx
        .payment_repo
        .find_by_intent_id(&first.payment_intent_id)
        .await?
        .expect("first payment");
    assert_eq!(stale.status, PaymentStatus::Failed);

    let open: Vec<_> = app
        .ctx
        .payment_repo
        .list_by_booking(booking.id)
        .await?
        .into_iter()
        .filter(|p| p.status == PaymentStatus::Pending)
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].intent_id, second.payment_intent_id);

    // Asking again for the same amount hands out the open intent
    let again = app.ctx.booking_service.initiate_payment(booking.id, 15000).await?;
    assert_eq!(again.payment_intent_id, second.payment_intent_id);
    assert_eq!(app.gateway.created_intents().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_processing_intent_blocks_replacement() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let booking = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), app.create_request(2, 0))
        .await?;
    let first = app.ctx.booking_service.initiate_payment(booking.id, 10000).await?;
    app.gateway.set_intent_status(&first.payment_intent_id, IntentStatus::Processing);

    app.ctx
        .booking_service
        .apply_edit(booking.id, &app.edit_to(&app.catalog.harbour, &app.catalog.harbour_time, 3, 0))
        .await?;
    let err = app
        .ctx
        .booking_service
        .initiate_payment(booking.id, 15000)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);

    assert_eq!(app.gateway.created_intents().len(), 1);
    assert!(app.gateway.canceled_intents().is_empty());
    let payment = app
        .ctx
        .payment_repo
        .find_by_intent_id(&first.payment_intent_id)
        .await?
        .expect("payment");
    assert_eq!(payment.status, PaymentStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_price_diff_classification() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;
    let service = &app.ctx.booking_service;

    let up = service
        .calculate_edit_price_diff(booking.id, &app.edit_to(&app.catalog.station, &app.catalog.station_time, 2, 0))
        .await?;
    assert_eq!(up.diff.classification, DiffClassification::Upcharge);
    assert_eq!(up.diff.difference_cents, 6000);
    assert_eq!(up.pricing.total_cents, 16000);

    let down = service
        .calculate_edit_price_diff(booking.id, &app.edit_to(&app.catalog.village, &app.catalog.village_time, 2, 0))
        .await?;
    assert_eq!(down.diff.classification, DiffClassification::Downgrade);
    assert_eq!(down.diff.difference_cents, -4000);

    let same = service
        .calculate_edit_price_diff(booking.id, &app.edit_to(&app.catalog.harbour, &app.catalog.harbour_time, 2, 0))
        .await?;
    assert_eq!(same.diff.classification, DiffClassification::NoChange);

    // Quoting never writes
    let unchanged = service.get_booking(booking.id).await?;
    assert_eq!(unchanged.pricing.total_cents, 10000);
    assert_eq!(unchanged.pickup_id, app.catalog.harbour.id);

    Ok(())
}

#[tokio::test]
async fn test_unpaid_booking_edits_without_payment_flow() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let booking = app
        .ctx
        .booking_service
        .create_booking(Uuid::new_v4(), app.create_request(2, 0))
        .await?;

    let outcome = app
        .ctx
        .booking_service
        .apply_edit(booking.id, &app.edit_to(&app.catalog.station, &app.catalog.station_time, 3, 1))
        .await?;

    let updated = match outcome {
        EditOutcome::Updated { booking: updated } => updated,
        other => panic!("expected a direct update, got {:?}", other),
    };
    assert_eq!(updated.pickup_id, app.catalog.station.id);
    assert_eq!(updated.adult_count, 3);
    assert_eq!(updated.child_count, 1);
    assert_eq!(updated.pricing.total_cents, 28000);
    assert!(app.gateway.created_intents().is_empty());
    assert!(app.gateway.refunds().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_direct_update_rejects_price_change_on_paid_booking() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    let err = app
        .ctx
        .booking_service
        .update_booking_direct(booking.id, &app.edit_to(&app.catalog.station, &app.catalog.station_time, 2, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);

    // Moving to another date at the same price is fine
    let mut request = app.edit_to(&app.catalog.harbour, &app.catalog.harbour_time, 2, 0);
    request.schedule_id = app.catalog.later_schedule.id;
    let outcome = app.ctx.booking_service.update_booking_direct(booking.id, &request).await?;
    let updated = match outcome {
        EditOutcome::Updated { booking: updated } => updated,
        other => panic!("expected a direct update, got {:?}", other),
    };
    assert_eq!(updated.schedule_id, app.catalog.later_schedule.id);
    assert_eq!(updated.status, BookingStatus::Confirmed);

    Ok(())
}

#[tokio::test]
async fn test_downgrade_refunds_difference() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, intent_id) = app.confirmed_booking().await?;

    let outcome = app
        .ctx
        .booking_service
        .apply_edit(booking.id, &app.edit_to(&app.catalog.village, &app.catalog.village_time, 2, 0))
        .await?;

    let (updated, refund) = match outcome {
        EditOutcome::RefundIssued { booking: updated, refund } => (updated, refund),
        other => panic!("expected a refund, got {:?}", other),
    };
    assert_eq!(updated.pricing.total_cents, 6000);
    assert_eq!(refund.amount_cents, 4000);
    assert_eq!(refund.status, "pending");

    let refunds = app.gateway.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].intent_id, intent_id);
    assert_eq!(refunds[0].amount_cents, 4000);
    assert!(refunds[0].idempotency_key.starts_with("downgrade-"));

    // Refunded total moves only on provider confirmation
    let payment = app
        .ctx
        .payment_repo
        .find_by_intent_id(&intent_id)
        .await?
        .expect("payment");
    assert_eq!(payment.refund_status, RefundStatus::Pending);
    assert_eq!(payment.refunded_cents, 0);
    assert_eq!(payment.status, PaymentStatus::Completed);

    let events = app.ctx.outbox_repo.list_by_booking(booking.id).await?;
    assert!(events.iter().any(|e| e.kind == DomainEventKind::BookingUpdated));

    Ok(())
}

#[tokio::test]
async fn test_upcharge_leaves_booking_until_paid() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    let outcome = app
        .ctx
        .booking_service
        .apply_edit(booking.id, &app.edit_to(&app.catalog.station, &app.catalog.station_time, 2, 0))
        .await?;

    let (pending_edit_id, payment_intent_id, amount_cents) = match outcome {
        EditOutcome::PaymentRequired { pending_edit_id, payment_intent_id, amount_cents, .. } => (pending_edit_id, payment_intent_id, amount_cents),
        other => panic!("expected an upcharge, got {:?}", other),
    };
    assert_eq!(amount_cents, 6000);

    let unchanged = app.ctx.booking_service.get_booking(booking.id).await?;
    assert_eq!(unchanged.pickup_id, app.catalog.harbour.id);
    assert_eq!(unchanged.pricing.total_cents, 10000);

    let payment = app
        .ctx
        .payment_repo
        .find_by_intent_id(&payment_intent_id)
        .await?
        .expect("upcharge payment");
    assert_eq!(payment.kind, PaymentKind::Upcharge);
    assert_eq!(payment.pending_edit_id, Some(pending_edit_id));
    assert_eq!(payment.metadata["paymentType"], "upcharge");
    assert_eq!(payment.metadata["pendingEditId"], pending_edit_id.to_string());

    let created = app.gateway.created_intents();
    let upcharge = created.last().expect("intent");
    assert_eq!(upcharge.idempotency_key, format!("upcharge-{}", pending_edit_id));

    Ok(())
}

#[tokio::test]
async fn test_cancel_booking() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    let cancelled = app.ctx.booking_service.cancel_booking(booking.id).await?;
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let stored = app.ctx.booking_service.get_booking(booking.id).await?;
    assert!(stored.notes.contains("Cancelled"));

    let err = app.ctx.booking_service.cancel_booking(booking.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);

    let events = app.ctx.outbox_repo.list_by_booking(booking.id).await?;
    let cancellations = events
        .iter()
        .filter(|e| e.kind == DomainEventKind::BookingCancelled)
        .count();
    assert_eq!(cancellations, 1);

    Ok(())
}

#[tokio::test]
async fn test_cancel_survives_note_failure() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    sqlx::query(
        "CREATE TRIGGER reject_notes BEFORE UPDATE OF notes ON bookings \
         BEGIN SELECT RAISE(ABORT, 'notes are read-only'); END",
    )
    .execute(&app.pool)
    .await?;

    let cancelled = app.ctx.booking_service.cancel_booking(booking.id).await?;
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let events = app.ctx.outbox_repo.list_by_booking(booking.id).await?;
    assert!(events.iter().any(|e| e.kind == DomainEventKind::BookingCancelled));

    let stored = app.ctx.booking_service.get_booking(booking.id).await?;
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert!(!stored.notes.contains("Cancelled"));

    Ok(())
}

async fn insert_on_past_date(app: &TestApp) -> anyhow::Result<tourdesk::domain::Booking> {
    let quote = pricing::calculate(&app.catalog.harbour, "USD", 1, 0)?;
    Ok(app
        .ctx
        .booking_repo
        .create(NewBooking {
            reference: generate_reference(),
            user_id: Uuid::new_v4(),
            contact_name: "Ben Okafor".to_string(),
            contact_email: "ben@example.com".to_string(),
            booking_type: app.catalog.tour.kind,
            bookable_id: app.catalog.tour.id,
            selection: Selection {
                schedule_id: app.catalog.past_schedule.id,
                pickup_id: app.catalog.harbour.id,
                pickup_time_id: app.catalog.harbour_time.id,
            },
            adult_count: 1,
            child_count: 0,
            pricing: quote,
            notes: String::new(),
        })
        .await?)
}

#[tokio::test]
async fn test_cannot_cancel_or_edit_after_date_started() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let booking = insert_on_past_date(&app).await?;

    let err = app.ctx.booking_service.cancel_booking(booking.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);

    let err = app
        .ctx
        .booking_service
        .calculate_edit_price_diff(booking.id, &app.edit_to(&app.catalog.village, &app.catalog.village_time, 1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);

    let stored = app.ctx.booking_service.get_booking(booking.id).await?;
    assert_eq!(stored.status, BookingStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_complete_past_bookings() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let past = insert_on_past_date(&app).await?;
    app.ctx
        .booking_repo
        .transition_status(past.id, &[BookingStatus::Pending], BookingStatus::Confirmed)
        .await?;
    let (upcoming, _) = app.confirmed_booking().await?;

    let completed = app
        .ctx
        .booking_service
        .complete_past_bookings(chrono::Utc::now())
        .await?;
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, past.id);
    assert_eq!(completed[0].status, BookingStatus::Completed);

    let upcoming = app.ctx.booking_service.get_booking(upcoming.id).await?;
    assert_eq!(upcoming.status, BookingStatus::Confirmed);

    // Second run finds nothing left to do
    let again = app
        .ctx
        .booking_service
        .complete_past_bookings(chrono::Utc::now())
        .await?;
    assert!(again.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_admin_refund_bounds() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    let err = app
        .ctx
        .booking_service
        .request_refund(
            booking.id,
            tourdesk::domain::AdminRefundRequest {
                amount_cents: Some(20000),
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);

    let refund = app
        .ctx
        .booking_service
        .request_refund(booking.id, Default::default())
        .await?;
    assert_eq!(refund.amount_cents, 10000);
    assert_eq!(app.gateway.refunds().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_catalog_price_change_does_not_touch_existing_booking() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let (booking, _) = app.confirmed_booking().await?;

    app.ctx
        .catalog_repo
        .set_pickup_prices(app.catalog.harbour.id, 9000, Some(4500))
        .await?;

    let stored = app.ctx.booking_service.get_booking(booking.id).await?;
    assert_eq!(stored.pricing.adult_price_cents, 5000);
    assert_eq!(stored.pricing.total_cents, 10000);

    Ok(())
}
