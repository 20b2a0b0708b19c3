//! Configuration module for shipping-service.

use crate::services::fifo::ShortfallPricing;
use service_core::config::{self as core_config, env_or, env_required};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct ShippingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub orders: OrderConfig,
    pub fifo: FifoConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// Leading letters of generated order numbers.
    pub number_prefix: String,
    pub number_max_attempts: u32,
    /// Service-wide default for letting orders overdraw stock.
    pub allow_negative_stock: bool,
}

#[derive(Debug, Clone)]
pub struct FifoConfig {
    /// Ledger page size used while replaying a product's history.
    pub page_size: i64,
    pub shortfall_pricing: ShortfallPricing,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            number_prefix: "SO".to_string(),
            number_max_attempts: 10,
            allow_negative_stock: false,
        }
    }
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            shortfall_pricing: ShortfallPricing::Reference,
        }
    }
}

impl ShippingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let order_defaults = OrderConfig::default();
        let fifo_defaults = FifoConfig::default();

        let config = Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "shipping-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env_required("DATABASE_URL")?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2)?,
            },
            orders: OrderConfig {
                number_prefix: env_or("ORDER_NUMBER_PREFIX", order_defaults.number_prefix)?,
                number_max_attempts: env_or(
                    "ORDER_NUMBER_MAX_ATTEMPTS",
                    order_defaults.number_max_attempts,
                )?,
                allow_negative_stock: env_or(
                    "STOCK_ALLOW_NEGATIVE",
                    order_defaults.allow_negative_stock,
                )?,
            },
            fifo: FifoConfig {
                page_size: env_or("FIFO_PAGE_SIZE", fifo_defaults.page_size)?,
                shortfall_pricing: env_or(
                    "FIFO_SHORTFALL_PRICING",
                    fifo_defaults.shortfall_pricing,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.orders.number_prefix.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ORDER_NUMBER_PREFIX cannot be empty"
            )));
        }
        if self.orders.number_max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ORDER_NUMBER_MAX_ATTEMPTS must be at least 1"
            )));
        }
        if self.fifo.page_size < 1 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "FIFO_PAGE_SIZE must be at least 1"
            )));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS exceeds DATABASE_MAX_CONNECTIONS"
            )));
        }
        Ok(())
    }
}
