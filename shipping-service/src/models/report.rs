//! FIFO cost and profit report shapes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MovementKind;

/// Portion of an inbound cost layer consumed by an outbound movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSlice {
    /// Inbound (or positive adjustment) entry the slice was taken from.
    pub layer_entry_id: Uuid,
    pub quantity: i64,
    pub unit_cost: Decimal,
}

/// Cost basis and profit for one outbound quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub product_ref: Uuid,
    pub quantity: i64,
    pub revenue: Decimal,
    pub cost: Decimal,
    pub gross_profit: Decimal,
    /// Percentage of revenue; `None` when revenue is zero.
    pub margin_pct: Option<Decimal>,
    /// Units not covered by any inbound layer, priced at the fallback.
    pub shortfall_quantity: i64,
    pub shortfall_unit_cost: Decimal,
    pub slices: Vec<CostSlice>,
}

/// Profit of one recorded outbound ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryProfit {
    pub entry_id: Uuid,
    pub kind: MovementKind,
    pub source_order_ref: Option<Uuid>,
    pub source_order_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub breakdown: CostBreakdown,
}

/// Aggregated profit over a set of outbound entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitReport {
    pub lines: Vec<EntryProfit>,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
    pub total_cost: Decimal,
    pub total_gross_profit: Decimal,
    pub margin_pct: Option<Decimal>,
}
