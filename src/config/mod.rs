use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub reviews: ReviewConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL used in links inside customer emails.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Receives alerts that need manual follow-up (failed edit reconciliation).
    pub operations_address: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
            operations_address: None,
        }
    }
}

fn default_from_address() -> String {
    "Tourdesk <bookings@tourdesk.local>".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReviewConfig {
    #[serde(default)]
    pub enabled: bool,
    pub api_url: Option<String>,
    pub site_id: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_review_delay")]
    pub delay_days: i64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: None,
            site_id: None,
            token: None,
            delay_days: default_review_delay(),
        }
    }
}

fn default_review_delay() -> i64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutboxConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_batch_size() -> i64 {
    50
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://tourdesk.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("stripe.enabled", false)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with TOURDESK__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("TOURDESK").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://tourdesk.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            stripe: StripeConfig::default(),
            email: EmailConfig::default(),
            reviews: ReviewConfig::default(),
            outbox: OutboxConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_integrations_off() {
        let settings = Settings::default();
        assert!(!settings.stripe.enabled);
        assert!(!settings.email.enabled);
        assert!(!settings.reviews.enabled);
        assert!(settings.stripe.webhook_secret.is_none());
        assert_eq!(settings.outbox.batch_size, 50);
    }
}
