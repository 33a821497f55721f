//! Application configuration
//!
//! Typed configuration loaded from environment variables with the `config` and
//! `dotenvy` crates. Variables use the `READING_BILLING` prefix and `__` between
//! nested keys, e.g. `READING_BILLING__PAYMENT__STRIPE_API_KEY`.
//!
//! ```no_run
//! use reading_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod payment;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

const ENV_PREFIX: &str = "READING_BILLING";

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// Reads `.env` first when present, then every `READING_BILLING__*`
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::LoadError` when required values are missing or
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Semantic validation of every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
