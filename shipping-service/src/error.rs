//! Domain errors for shipping-service.

use crate::models::{MovementKind, OrderStatus};
use crate::services::store::StoreError;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("Order number '{0}' is already in use")]
    DuplicateOrderNumber(String),

    #[error("Insufficient stock for product {product_code}: on hand {on_hand}, requested {requested}")]
    InsufficientStock {
        product_code: String,
        on_hand: i64,
        requested: i64,
    },

    #[error("Order {0} is delivered and can no longer be changed")]
    OrderLocked(Uuid),

    #[error("Ledger already holds a different {kind} entry for order {order_id}, product {product_id}")]
    LedgerWriteConflict {
        order_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order items cannot be edited while the order is {0}")]
    OrderNotEditable(OrderStatus),

    #[error("Order {0} was changed by another request; reload and retry")]
    ConcurrentUpdate(Uuid),

    #[error("Could not allocate a unique order number after {0} attempts")]
    SequenceExhausted(u32),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<StoreError> for ShippingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } => ShippingError::Storage(anyhow::anyhow!(
                "Unhandled uniqueness violation on {}",
                constraint
            )),
            StoreError::Backend(e) => ShippingError::Storage(e),
        }
    }
}

impl ShippingError {
    /// Metric label for the errors counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ShippingError::DuplicateOrderNumber(_) => "duplicate_order_number",
            ShippingError::InsufficientStock { .. } => "insufficient_stock",
            ShippingError::OrderLocked(_) => "order_locked",
            ShippingError::LedgerWriteConflict { .. } => "ledger_write_conflict",
            ShippingError::ProductNotFound(_) => "product_not_found",
            ShippingError::OrderNotFound(_) => "order_not_found",
            ShippingError::InvalidTransition { .. } => "invalid_transition",
            ShippingError::OrderNotEditable(_) => "order_not_editable",
            ShippingError::ConcurrentUpdate(_) => "concurrent_update",
            ShippingError::SequenceExhausted(_) => "sequence_exhausted",
            ShippingError::Validation(_) => "validation_error",
            ShippingError::Storage(_) => "storage_error",
        }
    }
}

impl From<ShippingError> for AppError {
    fn from(err: ShippingError) -> Self {
        let code = err.kind();
        let message = err.to_string();
        match err {
            ShippingError::DuplicateOrderNumber(_)
            | ShippingError::LedgerWriteConflict { .. }
            | ShippingError::InvalidTransition { .. }
            | ShippingError::OrderNotEditable(_)
            | ShippingError::ConcurrentUpdate(_)
            | ShippingError::SequenceExhausted(_) => {
                AppError::Conflict(code, anyhow::anyhow!(message))
            }
            ShippingError::InsufficientStock { .. } | ShippingError::Validation(_) => {
                AppError::Unprocessable(code, anyhow::anyhow!(message))
            }
            ShippingError::OrderLocked(_) => AppError::Locked(anyhow::anyhow!(message)),
            ShippingError::ProductNotFound(_) | ShippingError::OrderNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(message))
            }
            ShippingError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}
