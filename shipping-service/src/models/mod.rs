//! Domain models for shipping-service.

mod catalog;
mod ledger;
mod order;
mod report;

pub use catalog::{Counterparty, CounterpartyKind, Product};
pub use ledger::{LedgerCursor, LedgerEntry, MovementKind};
pub use order::{
    normalize_number, ListOrdersFilter, OrderItem, OrderStatus, OrderType, Packaging,
    PaymentStatus, ShippingOrder,
};
pub use report::{CostBreakdown, CostSlice, EntryProfit, ProfitReport};

/// Largest base-unit quantity accepted on an order line or ledger movement.
pub const MAX_QUANTITY: i64 = 1_000_000_000;
