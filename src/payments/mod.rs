pub mod gateway;
pub mod stripe_client;
pub mod webhook;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use gateway::*;
pub use stripe_client::StripeGateway;
pub use webhook::{WebhookEvent, WebhookEventKind};

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakePaymentGateway;
