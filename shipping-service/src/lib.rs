//! Shipping Service - inventory ledger and FIFO cost engine for shipping and sale orders.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use error::ShippingError;
pub use startup::{build_router, AppState};
