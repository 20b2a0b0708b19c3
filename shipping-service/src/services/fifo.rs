//! FIFO cost engine.
//!
//! Cost is never cached: every query replays the product's ledger in
//! `(occurred_at, id)` order. Positive movements open cost layers, negative
//! movements consume them oldest first. Whatever the layers cannot cover is a
//! shortfall priced at the configured fallback.

use crate::error::ShippingError;
use crate::models::{
    CostBreakdown, CostSlice, EntryProfit, LedgerCursor, LedgerEntry, Product, ProfitReport,
    MAX_QUANTITY,
};
use crate::services::inventory::InventoryLedger;
use crate::services::store::Catalog;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// How units not covered by any inbound layer are costed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortfallPricing {
    /// Product reference price, or zero when the product has none.
    #[default]
    Reference,
    Zero,
}

impl std::str::FromStr for ShortfallPricing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reference" => Ok(ShortfallPricing::Reference),
            "zero" => Ok(ShortfallPricing::Zero),
            other => Err(format!("unknown shortfall pricing '{}'", other)),
        }
    }
}

impl ShortfallPricing {
    fn unit_cost(&self, product: &Product) -> Decimal {
        match self {
            ShortfallPricing::Reference => product.reference_price.unwrap_or(Decimal::ZERO),
            ShortfallPricing::Zero => Decimal::ZERO,
        }
    }
}

/// `gross_profit / revenue * 100` to two places; undefined for zero revenue
/// and when the ratio does not fit a decimal.
pub fn margin_pct(gross_profit: Decimal, revenue: Decimal) -> Option<Decimal> {
    if revenue.is_zero() {
        return None;
    }
    gross_profit
        .checked_div(revenue)?
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|m| m.round_dp(2))
}

fn out_of_range() -> ShippingError {
    ShippingError::Validation("cost or revenue is out of range".to_string())
}

#[derive(Debug, Clone)]
struct Layer {
    entry_id: Uuid,
    remaining: i64,
    unit_cost: Decimal,
}

#[derive(Debug, Default)]
struct Consumption {
    slices: Vec<CostSlice>,
    shortfall: i64,
}

/// Open cost layers, oldest at the front.
#[derive(Debug, Default)]
struct LayerQueue {
    layers: VecDeque<Layer>,
}

impl LayerQueue {
    fn receive(&mut self, entry: &LedgerEntry) {
        self.layers.push_back(Layer {
            entry_id: entry.id,
            remaining: entry.signed_quantity,
            unit_cost: entry.unit_amount,
        });
    }

    fn consume(&mut self, quantity: i64) -> Consumption {
        let mut outstanding = quantity;
        let mut slices = Vec::new();

        while outstanding > 0 {
            let Some(layer) = self.layers.front_mut() else {
                break;
            };
            let taken = layer.remaining.min(outstanding);
            slices.push(CostSlice {
                layer_entry_id: layer.entry_id,
                quantity: taken,
                unit_cost: layer.unit_cost,
            });
            layer.remaining -= taken;
            outstanding -= taken;
            if layer.remaining == 0 {
                self.layers.pop_front();
            }
        }

        Consumption {
            slices,
            shortfall: outstanding,
        }
    }
}

#[derive(Clone)]
pub struct FifoEngine {
    inventory: InventoryLedger,
    catalog: Arc<dyn Catalog>,
    shortfall: ShortfallPricing,
}

impl FifoEngine {
    pub fn new(
        inventory: InventoryLedger,
        catalog: Arc<dyn Catalog>,
        shortfall: ShortfallPricing,
    ) -> Self {
        Self {
            inventory,
            catalog,
            shortfall,
        }
    }

    async fn product(&self, product_id: Uuid) -> Result<Product, ShippingError> {
        self.catalog
            .product_by_id(product_id)
            .await?
            .ok_or_else(|| ShippingError::ProductNotFound(product_id.to_string()))
    }

    /// Replay the ledger up to (not including) `stop_before`, handing every
    /// consuming entry and what it consumed to `visit`.
    async fn replay<F>(
        &self,
        product_id: Uuid,
        stop_before: Option<LedgerCursor>,
        mut visit: F,
    ) -> Result<LayerQueue, ShippingError>
    where
        F: FnMut(&LedgerEntry, Consumption) + Send,
    {
        let mut queue = LayerQueue::default();
        let mut entries = self.inventory.stream_by_product(product_id, None, None);
        let mut replayed = 0usize;

        while let Some(entry) = entries.try_next().await? {
            if stop_before.is_some_and(|stop| entry.cursor() >= stop) {
                break;
            }
            replayed += 1;
            if entry.signed_quantity > 0 {
                queue.receive(&entry);
            } else {
                let consumed = queue.consume(entry.quantity());
                visit(&entry, consumed);
            }
        }

        debug!(product_id = %product_id, replayed, open_layers = queue.layers.len(), "Ledger replayed");
        Ok(queue)
    }

    fn price(
        &self,
        product: &Product,
        quantity: i64,
        revenue: Decimal,
        consumption: Consumption,
    ) -> Result<CostBreakdown, ShippingError> {
        let shortfall_unit_cost = if consumption.shortfall > 0 {
            self.shortfall.unit_cost(product)
        } else {
            Decimal::ZERO
        };
        let mut cost = shortfall_unit_cost
            .checked_mul(Decimal::from(consumption.shortfall))
            .ok_or_else(out_of_range)?;
        for slice in &consumption.slices {
            cost = slice
                .unit_cost
                .checked_mul(Decimal::from(slice.quantity))
                .and_then(|layer| cost.checked_add(layer))
                .ok_or_else(out_of_range)?;
        }
        let gross_profit = revenue.checked_sub(cost).ok_or_else(out_of_range)?;

        Ok(CostBreakdown {
            product_ref: product.id,
            quantity,
            revenue,
            cost,
            gross_profit,
            margin_pct: margin_pct(gross_profit, revenue),
            shortfall_quantity: consumption.shortfall,
            shortfall_unit_cost,
            slices: consumption.slices,
        })
    }

    fn entry_profit(
        &self,
        product: &Product,
        entry: &LedgerEntry,
        consumed: Consumption,
    ) -> Result<EntryProfit, ShippingError> {
        Ok(EntryProfit {
            entry_id: entry.id,
            kind: entry.kind,
            source_order_ref: entry.source_order_ref,
            source_order_number: entry.source_order_number.clone(),
            occurred_at: entry.occurred_at,
            breakdown: self.price(product, entry.quantity(), entry.total_amount, consumed)?,
        })
    }

    /// Quote: what shipping `quantity` now, at `unit_revenue`, would cost
    /// and earn given every movement recorded so far.
    #[instrument(skip(self))]
    pub async fn cost_and_profit(
        &self,
        product_id: Uuid,
        quantity: i64,
        unit_revenue: Decimal,
    ) -> Result<CostBreakdown, ShippingError> {
        if quantity <= 0 || quantity > MAX_QUANTITY {
            return Err(ShippingError::Validation(format!(
                "quantity must be between 1 and {}",
                MAX_QUANTITY
            )));
        }
        if unit_revenue < Decimal::ZERO {
            return Err(ShippingError::Validation(
                "unit revenue cannot be negative".to_string(),
            ));
        }

        let product = self.product(product_id).await?;
        let mut queue = self.replay(product_id, None, |_, _| {}).await?;
        let consumed = queue.consume(quantity);
        let revenue = unit_revenue
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(out_of_range)?;

        self.price(&product, quantity, revenue, consumed)
    }

    /// Cost of a recorded outbound entry at its own point in history.
    #[instrument(skip(self, entry), fields(entry_id = %entry.id))]
    pub async fn cost_of_entry(&self, entry: &LedgerEntry) -> Result<EntryProfit, ShippingError> {
        if entry.signed_quantity >= 0 {
            return Err(ShippingError::Validation(format!(
                "entry {} does not remove stock",
                entry.id
            )));
        }

        let product = self.product(entry.product_ref).await?;
        let mut queue = self
            .replay(entry.product_ref, Some(entry.cursor()), |_, _| {})
            .await?;
        let consumed = queue.consume(entry.quantity());

        self.entry_profit(&product, entry, consumed)
    }

    /// Profit of every outbound order entry of a product, oldest first.
    #[instrument(skip(self))]
    pub async fn product_report(&self, product_id: Uuid) -> Result<ProfitReport, ShippingError> {
        let product = self.product(product_id).await?;
        let mut lines = Vec::new();

        self.replay(product_id, None, |entry, consumed| {
            if entry.kind.is_order_outbound() {
                lines.push(self.entry_profit(&product, entry, consumed));
            }
        })
        .await?;

        summarize(lines.into_iter().collect::<Result<_, _>>()?)
    }

    /// Profit of an order's outbound entries. Empty when the order has not
    /// committed stock.
    #[instrument(skip(self))]
    pub async fn order_report(&self, order_id: Uuid) -> Result<ProfitReport, ShippingError> {
        let entries: Vec<LedgerEntry> = self
            .inventory
            .entries_for_order(order_id)
            .await?
            .into_iter()
            .filter(|e| e.kind.is_order_outbound())
            .collect();

        let mut products: Vec<Uuid> = Vec::new();
        for entry in &entries {
            if !products.contains(&entry.product_ref) {
                products.push(entry.product_ref);
            }
        }

        let mut lines = Vec::with_capacity(entries.len());
        for product_id in products {
            let product = self.product(product_id).await?;
            self.replay(product_id, None, |entry, consumed| {
                if entry.source_order_ref == Some(order_id) && entry.kind.is_order_outbound() {
                    lines.push(self.entry_profit(&product, entry, consumed));
                }
            })
            .await?;
        }

        summarize(lines.into_iter().collect::<Result<_, _>>()?)
    }
}

fn summarize(lines: Vec<EntryProfit>) -> Result<ProfitReport, ShippingError> {
    let mut total_quantity: i64 = 0;
    let mut total_revenue = Decimal::ZERO;
    let mut total_cost = Decimal::ZERO;
    for line in &lines {
        total_quantity = total_quantity
            .checked_add(line.breakdown.quantity)
            .ok_or_else(out_of_range)?;
        total_revenue = total_revenue
            .checked_add(line.breakdown.revenue)
            .ok_or_else(out_of_range)?;
        total_cost = total_cost
            .checked_add(line.breakdown.cost)
            .ok_or_else(out_of_range)?;
    }
    let total_gross_profit = total_revenue
        .checked_sub(total_cost)
        .ok_or_else(out_of_range)?;

    Ok(ProfitReport {
        margin_pct: margin_pct(total_gross_profit, total_revenue),
        lines,
        total_quantity,
        total_revenue,
        total_cost,
        total_gross_profit,
    })
}
