//! HTTP handlers for shipping-service.

pub mod health;
pub mod ledger;
pub mod orders;
pub mod products;

pub use health::{health_check, metrics_handler, readiness_check};
