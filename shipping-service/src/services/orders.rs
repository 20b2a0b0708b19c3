//! Order intake, editing, deletion and status changes.

use crate::error::ShippingError;
use crate::models::{
    Counterparty, LedgerEntry, ListOrdersFilter, OrderItem, OrderStatus, OrderType, Packaging,
    PaymentStatus, Product, ShippingOrder, MAX_QUANTITY,
};
use crate::services::inventory::{AppendOutcome, InventoryLedger};
use crate::services::lifecycle::{StockEffect, TransitionTable};
use crate::services::metrics::{ERRORS_TOTAL, ORDER_TRANSITIONS_TOTAL};
use crate::services::sequence::SequenceAllocator;
use crate::services::stock::{allow_negative, StockQuery, StockWarning};
use crate::services::store::{Catalog, OrderStore};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Rounds of re-reading the stored order while settling the ledger after a
/// lost write.
const RECONCILE_ATTEMPTS: usize = 8;

/// Order line as supplied by a caller. One of `unit_price` and `line_total`
/// is required; `line_total` wins when both are present.
#[derive(Debug, Clone)]
pub struct ItemInput {
    pub product_code: String,
    pub quantity: i64,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub packaging: Option<Packaging>,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// Caller-chosen number; generated when absent.
    pub order_number: Option<String>,
    pub order_type: OrderType,
    pub counterparty_ref: Option<Uuid>,
    pub counterparty_name: Option<String>,
    pub items: Vec<ItemInput>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
    /// Per-request overdraw override.
    pub allow_negative: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOrder {
    /// Replaces the item list wholesale.
    pub items: Option<Vec<ItemInput>>,
    pub counterparty_ref: Option<Uuid>,
    pub counterparty_name: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub notes: Option<String>,
    pub allow_negative: Option<bool>,
}

/// An order together with the stock warnings raised while saving it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderOutcome {
    pub order: ShippingOrder,
    pub warnings: Vec<StockWarning>,
}

/// Result of a status change.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub order: ShippingOrder,
    pub previous_status: OrderStatus,
    /// Outbound entries newly written by this change.
    pub entries_written: usize,
    /// Outbound entries removed by this change.
    pub entries_removed: u64,
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    allocator: SequenceAllocator,
    inventory: InventoryLedger,
    stock: StockQuery,
    allow_negative_default: bool,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        allocator: SequenceAllocator,
        inventory: InventoryLedger,
        stock: StockQuery,
        allow_negative_default: bool,
    ) -> Self {
        Self {
            orders,
            catalog,
            allocator,
            inventory,
            stock,
            allow_negative_default,
        }
    }

    /// Resolve products and prices. Runs before anything is written.
    async fn resolve_items(
        &self,
        inputs: &[ItemInput],
    ) -> Result<Vec<(OrderItem, Product)>, ShippingError> {
        if inputs.is_empty() {
            return Err(ShippingError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }

        let mut resolved = Vec::with_capacity(inputs.len());
        for input in inputs {
            let code = input.product_code.trim();
            if input.quantity <= 0 || input.quantity > MAX_QUANTITY {
                return Err(ShippingError::Validation(format!(
                    "quantity for {} must be between 1 and {}",
                    code, MAX_QUANTITY
                )));
            }
            if let Some(p) = input.packaging {
                if p.pack_size <= 0 || p.pack_count <= 0 {
                    return Err(ShippingError::Validation(format!(
                        "packaging for {} must have positive size and count",
                        code
                    )));
                }
            }

            let quantity = Decimal::from(input.quantity);
            let line_total = match (input.line_total, input.unit_price) {
                (Some(total), _) => total,
                (None, Some(unit)) => unit.checked_mul(quantity).ok_or_else(|| {
                    ShippingError::Validation(format!("line total for {} is out of range", code))
                })?,
                (None, None) => {
                    return Err(ShippingError::Validation(format!(
                        "item {} needs a unit price or a line total",
                        code
                    )));
                }
            };
            if line_total < Decimal::ZERO {
                return Err(ShippingError::Validation(format!(
                    "line total for {} cannot be negative",
                    code
                )));
            }

            let product = self
                .catalog
                .product_by_code(code)
                .await?
                .ok_or_else(|| ShippingError::ProductNotFound(code.to_string()))?;

            let item = OrderItem {
                product_ref: product.id,
                product_code: product.code.clone(),
                product_name: product.name.clone(),
                quantity: input.quantity,
                unit_price: (line_total / quantity).round_dp(4),
                line_total,
                packaging: input.packaging,
            };
            resolved.push((item, product));
        }
        Ok(resolved)
    }

    /// Known counterparty by id, else by name; an unmatched name is kept as free text.
    async fn resolve_counterparty(
        &self,
        counterparty_ref: Option<Uuid>,
        counterparty_name: Option<&str>,
    ) -> Result<Option<Counterparty>, ShippingError> {
        if let Some(id) = counterparty_ref {
            return self
                .catalog
                .counterparty_by_id(id)
                .await?
                .map(Some)
                .ok_or_else(|| ShippingError::Validation(format!("unknown counterparty {}", id)));
        }
        match counterparty_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Ok(self.catalog.counterparty_by_name(name).await?),
            None => Ok(None),
        }
    }

    /// Counterparty already on an order; a reference that no longer resolves
    /// is treated as absent.
    async fn stored_counterparty(
        &self,
        order: &ShippingOrder,
    ) -> Result<Option<Counterparty>, ShippingError> {
        if let Some(id) = order.counterparty_ref {
            return Ok(self.catalog.counterparty_by_id(id).await?);
        }
        match order.counterparty_name.as_deref() {
            Some(name) => Ok(self.catalog.counterparty_by_name(name).await?),
            None => Ok(None),
        }
    }

    /// Live order or `OrderNotFound`.
    async fn load(&self, id: Uuid) -> Result<ShippingOrder, ShippingError> {
        self.orders
            .get_order(id)
            .await?
            .filter(|o| !o.is_deleted())
            .ok_or(ShippingError::OrderNotFound(id))
    }

    #[instrument(skip(self, input), fields(order_type = input.order_type.as_str(), items = input.items.len()))]
    pub async fn create(&self, input: CreateOrder) -> Result<OrderOutcome, ShippingError> {
        let resolved = self.resolve_items(&input.items).await?;
        let counterparty = self
            .resolve_counterparty(input.counterparty_ref, input.counterparty_name.as_deref())
            .await?;

        let policy = allow_negative(
            input.allow_negative,
            self.allow_negative_default,
            counterparty.as_ref(),
        );
        let lines: Vec<(Product, i64)> = resolved
            .iter()
            .map(|(item, product)| (product.clone(), item.quantity))
            .collect();
        let warnings = self.stock.check(&lines, policy).await?;

        let items: Vec<OrderItem> = resolved.into_iter().map(|(item, _)| item).collect();
        let table = TransitionTable::for_type(input.order_type);
        let now = Utc::now();
        let template = ShippingOrder {
            id: Uuid::new_v4(),
            human_number: String::new(),
            order_number: String::new(),
            order_type: input.order_type,
            counterparty_ref: counterparty.as_ref().map(|c| c.id),
            counterparty_name: counterparty
                .as_ref()
                .map(|c| c.name.clone())
                .or(input.counterparty_name),
            total_amount: order_total(&items)?,
            items,
            status: table.initial,
            payment_status: input.payment_status.unwrap_or_default(),
            notes: input.notes,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 1,
        };

        let orders = self.orders.clone();
        let order = self
            .allocator
            .reserve(input.order_number.as_deref(), |number| {
                let orders = orders.clone();
                let mut order = template.clone();
                order.human_number = number.human_number;
                order.order_number = number.order_number;
                async move {
                    let inserted = orders.insert_order(&order).await;
                    inserted.map(|_| order)
                }
            })
            .await
            .inspect_err(|e| {
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
            })?;

        info!(
            order_id = %order.id,
            human_number = %order.human_number,
            total_amount = %order.total_amount,
            warnings = warnings.len(),
            "Order created"
        );

        Ok(OrderOutcome { order, warnings })
    }

    pub async fn get(&self, id: Uuid) -> Result<ShippingOrder, ShippingError> {
        self.load(id).await
    }

    /// One page of orders ordered by id, plus the token for the next page.
    #[instrument(skip(self, filter))]
    pub async fn list(
        &self,
        mut filter: ListOrdersFilter,
    ) -> Result<(Vec<ShippingOrder>, Option<Uuid>), ShippingError> {
        filter.page_size = filter.page_size.clamp(1, 100);
        let orders = self.orders.list_orders(&filter).await?;
        let next = if orders.len() as i64 == filter.page_size {
            orders.last().map(|o| o.id)
        } else {
            None
        };
        Ok((orders, next))
    }

    #[instrument(skip(self, input), fields(order_id = %id))]
    pub async fn update(&self, id: Uuid, input: UpdateOrder) -> Result<OrderOutcome, ShippingError> {
        let mut order = self.load(id).await?;
        let table = TransitionTable::for_type(order.order_type);
        if table.is_terminal(order.status) {
            return Err(ShippingError::OrderLocked(id));
        }

        let counterparty_changed =
            input.counterparty_ref.is_some() || input.counterparty_name.is_some();
        let counterparty = if counterparty_changed {
            self.resolve_counterparty(input.counterparty_ref, input.counterparty_name.as_deref())
                .await?
        } else if input.items.is_some() {
            self.stored_counterparty(&order).await?
        } else {
            None
        };

        let mut warnings = Vec::new();
        if let Some(items) = &input.items {
            if !table.is_editable(order.status) {
                return Err(ShippingError::OrderNotEditable(order.status));
            }
            let resolved = self.resolve_items(items).await?;
            let policy = allow_negative(
                input.allow_negative,
                self.allow_negative_default,
                counterparty.as_ref(),
            );
            let lines: Vec<(Product, i64)> = resolved
                .iter()
                .map(|(item, product)| (product.clone(), item.quantity))
                .collect();
            warnings = self.stock.check(&lines, policy).await?;
            let items: Vec<OrderItem> = resolved.into_iter().map(|(item, _)| item).collect();
            order.total_amount = order_total(&items)?;
            order.items = items;
        }

        if counterparty_changed {
            order.counterparty_ref = counterparty.as_ref().map(|c| c.id);
            order.counterparty_name = counterparty.map(|c| c.name).or(input.counterparty_name);
        }
        if let Some(payment_status) = input.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(notes) = input.notes {
            order.notes = Some(notes);
        }
        order.updated_at = Utc::now();

        self.save(&mut order).await?;

        info!(order_id = %id, total_amount = %order.total_amount, "Order updated");
        Ok(OrderOutcome { order, warnings })
    }

    /// Soft delete. Any outbound entries the order holds are removed first,
    /// whatever its status.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<ShippingOrder, ShippingError> {
        let mut order = self.load(id).await?;
        let table = TransitionTable::for_type(order.order_type);
        if table.is_terminal(order.status) {
            return Err(ShippingError::OrderLocked(id));
        }

        let removed = self
            .inventory
            .remove_by_source(id, Some(table.commit_kind))
            .await?;

        let now = Utc::now();
        order.deleted_at = Some(now);
        order.updated_at = now;
        if let Err(e) = self.save(&mut order).await {
            return Err(self.settle(id, e).await);
        }

        info!(order_id = %id, human_number = %order.human_number, removed, "Order deleted");
        Ok(order)
    }

    /// Move an order to `to`, applying the ledger effect of the transition
    /// before the new status is stored.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn change_status(
        &self,
        id: Uuid,
        to: OrderStatus,
    ) -> Result<TransitionOutcome, ShippingError> {
        let result = self.apply_transition(id, to).await;
        match &result {
            Ok(outcome) => ORDER_TRANSITIONS_TOTAL
                .with_label_values(&[outcome.order.order_type.as_str(), to.as_str(), "ok"])
                .inc(),
            Err(e) => {
                ORDER_TRANSITIONS_TOTAL
                    .with_label_values(&["unknown", to.as_str(), "rejected"])
                    .inc();
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
            }
        }
        result
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        to: OrderStatus,
    ) -> Result<TransitionOutcome, ShippingError> {
        let mut order = self.load(id).await?;
        let from = order.status;
        let table = TransitionTable::for_type(order.order_type);

        if table.is_terminal(from) {
            return Err(ShippingError::OrderLocked(id));
        }
        if !table.can_transition(from, to) {
            return Err(ShippingError::InvalidTransition { from, to });
        }

        let mut entries_written = 0;
        let mut entries_removed = 0;

        match table.effect(from, to) {
            StockEffect::Deduct => {
                entries_written = match self.deduct(&order, table).await {
                    Ok(written) => written,
                    Err(e) => {
                        // The stored order is still uncommitted unless another
                        // request committed it meanwhile; either way the ledger
                        // follows the stored status.
                        if let Err(cleanup) = self.reconcile(id).await {
                            error!(order_id = %id, error = %cleanup, "Failed to roll back partial stock deduction");
                        }
                        return Err(e);
                    }
                };
            }
            StockEffect::Reaffirm => {
                entries_written = self.deduct(&order, table).await?;
                if entries_written > 0 {
                    warn!(order_id = %id, entries_written, "Healed missing outbound entries");
                }
            }
            StockEffect::Restore => {
                entries_removed = self
                    .inventory
                    .remove_by_source(id, Some(table.commit_kind))
                    .await?;
            }
            StockEffect::Sweep => {
                entries_removed = self
                    .inventory
                    .remove_by_source(id, Some(table.commit_kind))
                    .await?;
                if entries_removed > 0 {
                    warn!(order_id = %id, entries_removed, "Removed outbound entries held by an uncommitted order");
                }
            }
            StockEffect::None => {}
        }

        // Written even when the status stays put, so a concurrent change
        // based on the same version cannot also succeed.
        order.status = to;
        order.updated_at = Utc::now();
        if let Err(e) = self.save(&mut order).await {
            return Err(self.settle(id, e).await);
        }

        info!(
            order_id = %id,
            from = %from,
            to = %to,
            entries_written,
            entries_removed,
            "Order status changed"
        );

        Ok(TransitionOutcome {
            order,
            previous_status: from,
            entries_written,
            entries_removed,
        })
    }

    /// Store `order` over the version it was loaded at.
    async fn save(&self, order: &mut ShippingOrder) -> Result<(), ShippingError> {
        let expected = order.version;
        order.version = expected + 1;
        if self.orders.update_order(order, expected).await? {
            return Ok(());
        }
        match self.orders.get_order(order.id).await? {
            Some(stored) if !stored.is_deleted() => Err(ShippingError::ConcurrentUpdate(order.id)),
            _ => Err(ShippingError::OrderNotFound(order.id)),
        }
    }

    /// After losing a write, undo whatever this request did to the ledger by
    /// reconciling it with the stored order. Returns the original error.
    async fn settle(&self, id: Uuid, err: ShippingError) -> ShippingError {
        if matches!(
            err,
            ShippingError::ConcurrentUpdate(_) | ShippingError::OrderNotFound(_)
        ) {
            match self.reconcile(id).await {
                Ok(()) => warn!(order_id = %id, error = %err, "Lost a concurrent write; ledger reconciled"),
                Err(e) => error!(order_id = %id, error = %e, "Failed to reconcile ledger after a lost write"),
            }
        }
        err
    }

    /// Make the order's outbound entries match its stored status: present
    /// while committed, absent otherwise. Repeats until the order version is
    /// unchanged across the pass.
    async fn reconcile(&self, id: Uuid) -> Result<(), ShippingError> {
        for _ in 0..RECONCILE_ATTEMPTS {
            let Some(stored) = self.orders.get_order(id).await? else {
                return Ok(());
            };
            let table = TransitionTable::for_type(stored.order_type);
            if !stored.is_deleted() && table.is_committed(stored.status) {
                self.deduct(&stored, table).await?;
            } else {
                self.inventory
                    .remove_by_source(id, Some(table.commit_kind))
                    .await?;
            }

            let current = self.orders.get_order(id).await?.map(|o| o.version);
            if current == Some(stored.version) {
                return Ok(());
            }
        }
        Err(ShippingError::ConcurrentUpdate(id))
    }

    /// One outbound entry per product through the idempotent append.
    /// Returns how many entries were new.
    async fn deduct(
        &self,
        order: &ShippingOrder,
        table: &TransitionTable,
    ) -> Result<usize, ShippingError> {
        let now = Utc::now();
        let mut written = 0;
        let totals = order.quantities_by_product().ok_or_else(|| {
            ShippingError::Validation(format!("quantities of order {} are out of range", order.id))
        })?;
        for (product_ref, quantity, amount) in totals {
            let unit_amount = (amount / Decimal::from(quantity)).round_dp(4);
            let entry = LedgerEntry::new(product_ref, -quantity, table.commit_kind, unit_amount, now)
                .with_total_amount(amount)
                .with_source(order.id, order.human_number.clone());
            if let AppendOutcome::Recorded(_) = self.inventory.append(entry).await? {
                written += 1;
            }
        }
        Ok(written)
    }
}

fn order_total(items: &[OrderItem]) -> Result<Decimal, ShippingError> {
    ShippingOrder::items_total(items)
        .ok_or_else(|| ShippingError::Validation("order total is out of range".to_string()))
}
