use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::ReviewConfig,
    domain::{Booking, DomainEventKind, OutboxEvent},
    error::{AppError, Result},
    notifications::{NotificationChannel, Route},
    repository::{BookingRepository, CatalogRepository},
};

/// A review invitation to be sent after the booked date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewRequest {
    pub reference: String,
    pub name: String,
    pub email: String,
    pub send_after: DateTime<Utc>,
}

#[async_trait]
pub trait ReviewScheduler: Send + Sync {
    /// Returns the review service's id for the scheduled follow-up.
    async fn schedule(&self, request: ReviewRequest) -> Result<String>;
}

pub struct HttpReviewScheduler {
    client: reqwest::Client,
    api_url: String,
    site_id: String,
    token: String,
}

#[derive(Deserialize)]
struct ScheduleResponse {
    id: String,
}

impl HttpReviewScheduler {
    pub fn new(config: &ReviewConfig) -> Result<Self> {
        let missing = |field: &str| AppError::Internal(format!("reviews.{} is required when reviews are enabled", field));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone().ok_or_else(|| missing("api_url"))?,
            site_id: config.site_id.clone().ok_or_else(|| missing("site_id"))?,
            token: config.token.clone().ok_or_else(|| missing("token"))?,
        })
    }
}

#[async_trait]
impl ReviewScheduler for HttpReviewScheduler {
    async fn schedule(&self, request: ReviewRequest) -> Result<String> {
        let url = format!("{}/sites/{}/invitations", self.api_url.trim_end_matches('/'), self.site_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("Review service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Notification(format!(
                "Review service returned {}",
                response.status()
            )));
        }

        let body: ScheduleResponse = response
            .json()
            .await
            .map_err(|e| AppError::Notification(format!("Unexpected review service response: {}", e)))?;

        Ok(body.id)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct FakeReviewScheduler {
    requests: std::sync::Mutex<Vec<ReviewRequest>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl FakeReviewScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ReviewRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl ReviewScheduler for FakeReviewScheduler {
    async fn schedule(&self, request: ReviewRequest) -> Result<String> {
        let mut requests = self
            .requests
            .lock()
            .map_err(|_| AppError::Internal("review fake poisoned".to_string()))?;
        requests.push(request);
        Ok(format!("rev_{}", requests.len()))
    }
}

/// Schedules a post-trip review invitation once per booking and stores the
/// follow-up id on it.
pub struct ReviewChannel {
    scheduler: Arc<dyn ReviewScheduler>,
    catalog: Arc<dyn CatalogRepository>,
    bookings: Arc<dyn BookingRepository>,
    delay_days: i64,
}

impl ReviewChannel {
    pub fn new(
        scheduler: Arc<dyn ReviewScheduler>,
        catalog: Arc<dyn CatalogRepository>,
        bookings: Arc<dyn BookingRepository>,
        delay_days: i64,
    ) -> Self {
        Self {
            scheduler,
            catalog,
            bookings,
            delay_days,
        }
    }
}

#[async_trait]
impl NotificationChannel for ReviewChannel {
    fn name(&self) -> &str {
        "review"
    }

    fn route(&self, event: &OutboxEvent, booking: &Booking) -> Option<Route> {
        if event.kind != DomainEventKind::ReviewFollowup {
            return None;
        }
        // Already scheduled by an earlier delivery.
        let recipient = match booking.review_followup_id {
            Some(_) => None,
            None => Some(booking.contact_email.clone()),
        };
        Some(Route {
            recipient,
            template: "review_invitation",
        })
    }

    async fn deliver(&self, recipient: &str, _template: &str, _event: &OutboxEvent, booking: &Booking) -> Result<()> {
        let schedule = self
            .catalog
            .find_schedule(booking.schedule_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))?;

        let followup_id = self
            .scheduler
            .schedule(ReviewRequest {
                reference: booking.reference.clone(),
                name: booking.contact_name.clone(),
                email: recipient.to_string(),
                send_after: schedule.starts_at + chrono::Duration::days(self.delay_days),
            })
            .await?;

        self.bookings.set_review_followup(booking.id, &followup_id).await?;
        tracing::info!(booking_id = %booking.id, followup_id = %followup_id, "Scheduled review follow-up");

        Ok(())
    }
}
