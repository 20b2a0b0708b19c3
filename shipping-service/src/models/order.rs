//! Shipping order model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order flavour. Each flavour has its own status vocabulary, see
/// [`crate::services::lifecycle::TransitionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Five-state shipping flow: pending, processing, fulfilled, delivered, cancelled.
    Shipping,
    /// Two-state counter sale: pending, completed, plus cancelled.
    Sale,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Shipping => "shipping",
            OrderType::Sale => "sale",
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipping" => Ok(OrderType::Shipping),
            "sale" => Ok(OrderType::Sale),
            other => Err(format!("unknown order type '{}'", other)),
        }
    }
}

/// Order status across both vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Fulfilled,
    Delivered,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "fulfilled" => Ok(OrderStatus::Fulfilled),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment tag. Tracked alongside the order but never drives stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "partial" => Ok(PaymentStatus::Partial),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// Display-only packaging breakdown. Ledger math always uses `quantity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packaging {
    pub pack_size: i64,
    pub pack_count: i64,
}

/// One line of an order. Product code and name are snapshots taken at
/// intake so the document still reads correctly after a product rename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_ref: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<Packaging>,
}

/// Shipping (or sale) order document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOrder {
    pub id: Uuid,
    pub human_number: String,
    pub order_number: String,
    pub order_type: OrderType,
    pub counterparty_ref: Option<Uuid>,
    pub counterparty_name: Option<String>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Bumped on every stored write; updates compare against it.
    #[serde(default = "first_version")]
    pub version: i64,
}

fn first_version() -> i64 {
    1
}

impl ShippingOrder {
    /// Sum of line totals, `None` on decimal overflow.
    pub fn items_total(items: &[OrderItem]) -> Option<Decimal> {
        items
            .iter()
            .try_fold(Decimal::ZERO, |sum, i| sum.checked_add(i.line_total))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Base-unit quantity per product, in first-seen item order. Items that
    /// repeat a product are summed; `None` when a sum overflows.
    pub fn quantities_by_product(&self) -> Option<Vec<(Uuid, i64, Decimal)>> {
        let mut totals: Vec<(Uuid, i64, Decimal)> = Vec::new();
        for item in &self.items {
            match totals.iter_mut().find(|(p, _, _)| *p == item.product_ref) {
                Some((_, qty, amount)) => {
                    *qty = qty.checked_add(item.quantity)?;
                    *amount = amount.checked_add(item.line_total)?;
                }
                None => totals.push((item.product_ref, item.quantity, item.line_total)),
            }
        }
        Some(totals)
    }
}

/// Filter parameters for listing orders.
#[derive(Debug, Clone, Default)]
pub struct ListOrdersFilter {
    pub status: Option<OrderStatus>,
    pub order_type: Option<OrderType>,
    pub counterparty_ref: Option<Uuid>,
    pub include_deleted: bool,
    pub page_size: i64,
    pub page_token: Option<Uuid>,
}

/// Normalise a human order number for uniqueness comparison.
pub fn normalize_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}
