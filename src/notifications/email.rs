use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::{EmailConfig, Settings},
    domain::{Booking, DomainEventKind, OutboxEvent},
    error::{AppError, Result},
    notifications::{is_customer_event, NotificationChannel, Route},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| AppError::Internal("email.smtp_host is required when email is enabled".to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Internal(format!("Invalid SMTP relay {}: {}", host, e)))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| AppError::Notification(format!("Invalid recipient {}: {}", email.to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| AppError::Notification(format!("Could not build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Notification(format!("SMTP error: {}", e)))?;

        Ok(())
    }
}

/// Used when SMTP is disabled: emails are written to the log instead.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email (SMTP disabled)");
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: std::sync::Mutex<Vec<OutgoingEmail>>,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// While set, every send fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::Notification("recording sender set to fail".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email);
        }
        Ok(())
    }
}

/// Transactional booking emails, plus operations alerts for upcharges that
/// could not be applied and for duplicate payments.
pub struct EmailChannel {
    sender: Arc<dyn EmailSender>,
    base_url: String,
    operations_address: Option<String>,
}

impl EmailChannel {
    pub fn new(sender: Arc<dyn EmailSender>, base_url: String, operations_address: Option<String>) -> Self {
        Self {
            sender,
            base_url,
            operations_address,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let sender: Arc<dyn EmailSender> = if settings.email.enabled {
            Arc::new(SmtpEmailSender::new(&settings.email)?)
        } else {
            Arc::new(LogEmailSender)
        };
        Ok(Self::new(
            sender,
            settings.server.base_url.clone(),
            settings.email.operations_address.clone(),
        ))
    }

    fn render(&self, template: &str, event: &OutboxEvent, booking: &Booking) -> OutgoingEmail {
        let total = format_money(booking.pricing.total_cents, &booking.pricing.currency);
        let link = format!("{}/bookings/{}", self.base_url.trim_end_matches('/'), booking.id);
        let guests = guest_summary(booking);

        let (subject, body) = match template {
            "booking_confirmation" => (
                format!("Booking confirmed: {}", booking.reference),
                format!(
                    "Hi {},\n\nYour booking {} is confirmed for {}.\nTotal paid: {}.\n\nManage your booking: {}\n",
                    booking.contact_name, booking.reference, guests, total, link
                ),
            ),
            "booking_cancellation" => (
                format!("Booking cancelled: {}", booking.reference),
                format!(
                    "Hi {},\n\nYour booking {} has been cancelled.\nIf a refund is due it will be issued separately.\n",
                    booking.contact_name, booking.reference
                ),
            ),
            "booking_update" => {
                let difference = event.payload["difference_cents"].as_i64().unwrap_or(0);
                let change = match difference {
                    d if d > 0 => format!("You paid an additional {}.", format_money(d, &booking.pricing.currency)),
                    d if d < 0 => format!("A refund of {} is on its way.", format_money(-d, &booking.pricing.currency)),
                    _ => "The price did not change.".to_string(),
                };
                (
                    format!("Booking updated: {}", booking.reference),
                    format!(
                        "Hi {},\n\nYour booking {} now covers {}.\nNew total: {}. {}\n\nManage your booking: {}\n",
                        booking.contact_name, booking.reference, guests, total, change, link
                    ),
                )
            }
            "refund_confirmation" => {
                let refunded = event.payload["refunded_cents"].as_i64().unwrap_or(0);
                let currency = event.payload["currency"].as_str().unwrap_or(&booking.pricing.currency);
                (
                    format!("Refund processed: {}", booking.reference),
                    format!(
                        "Hi {},\n\nWe have refunded {} in total for booking {}.\nIt may take a few days to appear on your statement.\n",
                        booking.contact_name,
                        format_money(refunded, currency),
                        booking.reference
                    ),
                )
            }
            "payment_failed" => {
                let reason = event.payload["reason"].as_str().unwrap_or("the payment was declined");
                (
                    format!("Payment unsuccessful: {}", booking.reference),
                    format!(
                        "Hi {},\n\nWe could not take payment for booking {} ({}).\nYou can try again here: {}\n",
                        booking.contact_name, booking.reference, reason, link
                    ),
                )
            }
            "duplicate_payment_alert" => {
                let intent_id = event.payload["intent_id"].as_str().unwrap_or("unknown");
                let amount = event.payload["amount_cents"].as_i64().unwrap_or(0);
                (
                    format!("Action needed: duplicate payment for {}", booking.reference),
                    format!(
                        "Booking {} was already paid when intent {} collected another {}.\nRefund the extra payment.\n",
                        booking.reference,
                        intent_id,
                        format_money(amount, &booking.pricing.currency)
                    ),
                )
            }
            _ => {
                let reason = event.payload["reason"].as_str().unwrap_or("unknown");
                let intent_id = event.payload["intent_id"].as_str().unwrap_or("unknown");
                (
                    format!("Action needed: upcharge for {} not applied", booking.reference),
                    format!(
                        "Upcharge {} for booking {} succeeded but the change could not be applied.\nReason: {}\nThe customer has paid; update the booking by hand or refund the difference.\n",
                        intent_id, booking.reference, reason
                    ),
                )
            }
        };

        OutgoingEmail {
            to: String::new(),
            subject,
            body,
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn route(&self, event: &OutboxEvent, booking: &Booking) -> Option<Route> {
        let template = match event.kind {
            DomainEventKind::BookingConfirmed => "booking_confirmation",
            DomainEventKind::BookingCancelled => "booking_cancellation",
            DomainEventKind::BookingUpdated => "booking_update",
            DomainEventKind::RefundConfirmed => "refund_confirmation",
            DomainEventKind::PaymentFailed => "payment_failed",
            DomainEventKind::EditReconciliationFailed => "edit_reconciliation_alert",
            DomainEventKind::DuplicatePayment => "duplicate_payment_alert",
            DomainEventKind::ReviewFollowup => return None,
        };

        let recipient = if is_customer_event(event.kind) {
            Some(booking.contact_email.clone())
        } else {
            self.operations_address.clone()
        };

        Some(Route { recipient, template })
    }

    async fn deliver(&self, recipient: &str, template: &str, event: &OutboxEvent, booking: &Booking) -> Result<()> {
        let mut email = self.render(template, event, booking);
        email.to = recipient.to_string();
        self.sender.send(email).await
    }
}

pub fn format_money(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02} {}", sign, abs / 100, abs % 100, currency)
}

fn guest_summary(booking: &Booking) -> String {
    let adults = if booking.adult_count == 1 {
        "1 adult".to_string()
    } else {
        format!("{} adults", booking.adult_count)
    };
    match booking.child_count {
        0 => adults,
        1 => format!("{} and 1 child", adults),
        n => format!("{} and {} children", adults, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(12345, "USD"), "123.45 USD");
        assert_eq!(format_money(5, "EUR"), "0.05 EUR");
        assert_eq!(format_money(-2500, "USD"), "-25.00 USD");
    }
}
