use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    domain::{Booking, DeliveryStatus, DomainEventKind, NotificationLogEntry, OutboxEvent},
    error::Result,
    repository::{BookingRepository, NotificationLogRepository, OutboxRepository},
};

pub mod email;
pub mod review;

pub use email::{EmailChannel, EmailSender, LogEmailSender, OutgoingEmail, SmtpEmailSender};
pub use review::{HttpReviewScheduler, ReviewChannel, ReviewRequest, ReviewScheduler};

#[cfg(any(test, feature = "test-utils"))]
pub use email::RecordingEmailSender;
#[cfg(any(test, feature = "test-utils"))]
pub use review::FakeReviewScheduler;

/// Where a channel would send a notification for an event. A `None`
/// recipient means the channel is interested but has nobody to send to.
#[derive(Debug, Clone)]
pub struct Route {
    pub recipient: Option<String>,
    pub template: &'static str,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    /// `None` if this channel ignores the event.
    fn route(&self, event: &OutboxEvent, booking: &Booking) -> Option<Route>;
    async fn deliver(&self, recipient: &str, template: &str, event: &OutboxEvent, booking: &Booking) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchSummary {
    pub dispatched: usize,
    pub failed: usize,
}

/// Drains the outbox into the registered channels. Delivery failures are
/// logged and audited, never surfaced to whoever triggered the drain.
pub struct NotificationDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    log: Arc<dyn NotificationLogRepository>,
    bookings: Arc<dyn BookingRepository>,
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
    batch_size: i64,
}

impl NotificationDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        log: Arc<dyn NotificationLogRepository>,
        bookings: Arc<dyn BookingRepository>,
        batch_size: i64,
    ) -> Self {
        Self {
            outbox,
            log,
            bookings,
            channels: RwLock::new(Vec::new()),
            batch_size,
        }
    }

    pub async fn register(&self, channel: Arc<dyn NotificationChannel>) {
        let mut channels = self.channels.write().await;
        tracing::info!("Registered notification channel: {}", channel.name());
        channels.push(channel);
    }

    pub async fn dispatch_pending(&self) -> Result<DispatchSummary> {
        let pending = self.outbox.list_pending(self.batch_size).await?;
        let mut summary = DispatchSummary::default();

        for event in pending {
            match self.dispatch_one(event).await? {
                Some(true) => summary.dispatched += 1,
                Some(false) => summary.failed += 1,
                None => {}
            }
        }

        if summary.dispatched + summary.failed > 0 {
            tracing::debug!(
                dispatched = summary.dispatched,
                failed = summary.failed,
                "Outbox drained"
            );
        }

        Ok(summary)
    }

    /// `None` when another drain already claimed the event.
    async fn dispatch_one(&self, event: OutboxEvent) -> Result<Option<bool>> {
        if !self.outbox.claim(event.id).await? {
            return Ok(None);
        }

        let Some(booking) = self.bookings.find_by_id(event.booking_id).await? else {
            tracing::error!(event_id = %event.id, booking_id = %event.booking_id, "Outbox event for missing booking");
            self.outbox.mark_failed(event.id, "booking not found").await?;
            return Ok(Some(false));
        };

        let channels = self.channels.read().await.clone();
        let attempts = channels.iter().filter_map(|channel| {
            channel
                .route(&event, &booking)
                .map(|route| self.attempt(channel.as_ref(), route, &event, &booking))
        });
        let entries = join_all(attempts).await;

        let mut errors = Vec::new();
        for entry in entries {
            if entry.status == DeliveryStatus::Failed {
                errors.push(format!(
                    "{}: {}",
                    entry.channel,
                    entry.error.clone().unwrap_or_default()
                ));
            }
            self.log.record(entry).await?;
        }

        if errors.is_empty() {
            self.outbox.mark_dispatched(event.id).await?;
            Ok(Some(true))
        } else {
            self.outbox.mark_failed(event.id, &errors.join("; ")).await?;
            Ok(Some(false))
        }
    }

    async fn attempt(
        &self,
        channel: &dyn NotificationChannel,
        route: Route,
        event: &OutboxEvent,
        booking: &Booking,
    ) -> NotificationLogEntry {
        let mut entry = NotificationLogEntry {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            outbox_event_id: Some(event.id),
            channel: channel.name().to_string(),
            recipient: route.recipient.clone().unwrap_or_default(),
            template: route.template.to_string(),
            status: DeliveryStatus::Skipped,
            error: None,
            created_at: Utc::now(),
        };

        let Some(recipient) = route.recipient else {
            tracing::debug!(event_id = %event.id, channel = channel.name(), "No recipient; skipping");
            return entry;
        };

        match channel.deliver(&recipient, route.template, event, booking).await {
            Ok(()) => {
                tracing::debug!(
                    event_id = %event.id,
                    channel = channel.name(),
                    template = route.template,
                    "Notification sent"
                );
                entry.status = DeliveryStatus::Sent;
            }
            Err(e) => {
                tracing::error!(
                    event_id = %event.id,
                    booking_id = %booking.id,
                    channel = channel.name(),
                    "Notification failed: {}",
                    e
                );
                entry.status = DeliveryStatus::Failed;
                entry.error = Some(e.to_string());
            }
        }

        entry
    }

    /// Fire-and-forget drain, used right after a request commits a transition.
    pub fn spawn_drain(self: &Arc<Self>) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch_pending().await {
                tracing::error!("Outbox drain failed: {}", e);
            }
        });
    }

    /// Periodic drain so events recorded by a crashed request still go out.
    pub fn spawn_worker(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.dispatch_pending().await {
                    tracing::error!("Outbox worker drain failed: {}", e);
                }
            }
        })
    }
}

/// Events whose primary audience is the customer.
pub(crate) fn is_customer_event(kind: DomainEventKind) -> bool {
    !matches!(
        kind,
        DomainEventKind::ReviewFollowup
            | DomainEventKind::EditReconciliationFailed
            | DomainEventKind::DuplicatePayment
    )
}
