//! Persistence boundary.
//!
//! The order flow only talks to these traits. [`super::Database`] backs them
//! with PostgreSQL; [`super::MemoryStore`] enforces the same uniqueness
//! constraints in process for tests and local runs.

use crate::models::{
    Counterparty, LedgerCursor, LedgerEntry, ListOrdersFilter, MovementKind, Product,
    ShippingOrder,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Constraint protecting human numbers of live orders.
pub const HUMAN_NUMBER_CONSTRAINT: &str = "shipping_orders_live_human_number_key";
/// Constraint protecting the secondary order number key.
pub const ORDER_NUMBER_CONSTRAINT: &str = "shipping_orders_order_number_key";
/// Constraint allowing one outbound entry per (order, product, kind).
pub const OUTBOUND_ONCE_CONSTRAINT: &str = "ledger_entries_outbound_once";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn unique(constraint: &str) -> Self {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn is_violation_of(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. Fails with [`StoreError::UniqueViolation`] naming
    /// [`HUMAN_NUMBER_CONSTRAINT`] or [`ORDER_NUMBER_CONSTRAINT`].
    async fn insert_order(&self, order: &ShippingOrder) -> StoreResult<()>;

    /// Replace the stored document if the live copy is still at
    /// `expected_version`. Returns false when the order is unknown, deleted
    /// or has been written since.
    async fn update_order(&self, order: &ShippingOrder, expected_version: i64) -> StoreResult<bool>;

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<ShippingOrder>>;

    /// Live (non-deleted) order holding this normalised human number.
    async fn find_live_by_number(&self, normalized: &str) -> StoreResult<Option<ShippingOrder>>;

    /// Highest numeric suffix among human numbers starting with `prefix`.
    async fn max_sequence(&self, prefix: &str) -> StoreResult<Option<u32>>;

    async fn list_orders(&self, filter: &ListOrdersFilter) -> StoreResult<Vec<ShippingOrder>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry. Outbound order kinds fail with
    /// [`OUTBOUND_ONCE_CONSTRAINT`] when already recorded.
    async fn insert_entry(&self, entry: &LedgerEntry) -> StoreResult<()>;

    async fn find_order_entry(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
    ) -> StoreResult<Option<LedgerEntry>>;

    /// Delete entries sourced from an order, optionally restricted to a kind.
    async fn delete_by_source(&self, order_id: Uuid, kind: Option<MovementKind>)
        -> StoreResult<u64>;

    /// Entries of a product strictly after `after`, ordered by `(occurred_at, id)`.
    async fn list_by_product(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        after: Option<LedgerCursor>,
        limit: i64,
    ) -> StoreResult<Vec<LedgerEntry>>;

    async fn list_by_source(&self, order_id: Uuid) -> StoreResult<Vec<LedgerEntry>>;

    /// Signed quantity total for a product.
    async fn sum_by_product(&self, product_id: Uuid) -> StoreResult<i64>;
}

/// Master data lookup. Maintained elsewhere; read only here.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product_by_code(&self, code: &str) -> StoreResult<Option<Product>>;

    async fn product_by_id(&self, id: Uuid) -> StoreResult<Option<Product>>;

    async fn counterparty_by_name(&self, name: &str) -> StoreResult<Option<Counterparty>>;

    async fn counterparty_by_id(&self, id: Uuid) -> StoreResult<Option<Counterparty>>;
}
