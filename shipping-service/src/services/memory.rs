//! In-process store implementing every persistence trait.
//!
//! All state sits behind one mutex so uniqueness checks and inserts happen
//! atomically, mirroring the unique indexes of the PostgreSQL schema.

use crate::models::{
    normalize_number, Counterparty, LedgerCursor, LedgerEntry, ListOrdersFilter, MovementKind,
    Product, ShippingOrder,
};
use crate::services::sequence::parse_sequence;
use crate::services::store::{
    Catalog, LedgerStore, OrderStore, StoreError, StoreResult, HUMAN_NUMBER_CONSTRAINT,
    ORDER_NUMBER_CONSTRAINT, OUTBOUND_ONCE_CONSTRAINT,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, ShippingOrder>,
    entries: Vec<LedgerEntry>,
    products: HashMap<Uuid, Product>,
    counterparties: HashMap<Uuid, Counterparty>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("memory store mutex poisoned")))
    }

    /// Seed a product; master data is otherwise read only.
    pub fn add_product(&self, product: Product) -> StoreResult<()> {
        self.lock()?.products.insert(product.id, product);
        Ok(())
    }

    pub fn add_counterparty(&self, counterparty: Counterparty) -> StoreResult<()> {
        self.lock()?
            .counterparties
            .insert(counterparty.id, counterparty);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &ShippingOrder) -> StoreResult<()> {
        let mut state = self.lock()?;
        let normalized = normalize_number(&order.human_number);
        if state
            .orders
            .values()
            .any(|o| !o.is_deleted() && normalize_number(&o.human_number) == normalized)
        {
            return Err(StoreError::unique(HUMAN_NUMBER_CONSTRAINT));
        }
        if state
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::unique(ORDER_NUMBER_CONSTRAINT));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &ShippingOrder, expected_version: i64) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.orders.get_mut(&order.id) {
            Some(stored) if !stored.is_deleted() && stored.version == expected_version => {
                *stored = order.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<ShippingOrder>> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    async fn find_live_by_number(&self, normalized: &str) -> StoreResult<Option<ShippingOrder>> {
        Ok(self
            .lock()?
            .orders
            .values()
            .find(|o| !o.is_deleted() && normalize_number(&o.human_number) == normalized)
            .cloned())
    }

    async fn max_sequence(&self, prefix: &str) -> StoreResult<Option<u32>> {
        Ok(self
            .lock()?
            .orders
            .values()
            .filter_map(|o| parse_sequence(&o.human_number, prefix))
            .max())
    }

    async fn list_orders(&self, filter: &ListOrdersFilter) -> StoreResult<Vec<ShippingOrder>> {
        let state = self.lock()?;
        let mut orders: Vec<ShippingOrder> = state
            .orders
            .values()
            .filter(|o| filter.include_deleted || !o.is_deleted())
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| filter.order_type.map_or(true, |t| o.order_type == t))
            .filter(|o| {
                filter
                    .counterparty_ref
                    .map_or(true, |c| o.counterparty_ref == Some(c))
            })
            .filter(|o| filter.page_token.map_or(true, |after| o.id > after))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        orders.truncate(filter.page_size.max(0) as usize);
        Ok(orders)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_entry(&self, entry: &LedgerEntry) -> StoreResult<()> {
        let mut state = self.lock()?;
        if entry.kind.is_order_outbound() {
            if let Some(order_ref) = entry.source_order_ref {
                let taken = state.entries.iter().any(|e| {
                    e.kind == entry.kind
                        && e.product_ref == entry.product_ref
                        && e.source_order_ref == Some(order_ref)
                });
                if taken {
                    return Err(StoreError::unique(OUTBOUND_ONCE_CONSTRAINT));
                }
            }
        }
        state.entries.push(entry.clone());
        Ok(())
    }

    async fn find_order_entry(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
    ) -> StoreResult<Option<LedgerEntry>> {
        Ok(self
            .lock()?
            .entries
            .iter()
            .find(|e| {
                e.source_order_ref == Some(order_id) && e.product_ref == product_id && e.kind == kind
            })
            .cloned())
    }

    async fn delete_by_source(
        &self,
        order_id: Uuid,
        kind: Option<MovementKind>,
    ) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let before = state.entries.len();
        state.entries.retain(|e| {
            !(e.source_order_ref == Some(order_id) && kind.map_or(true, |k| e.kind == k))
        });
        Ok((before - state.entries.len()) as u64)
    }

    async fn list_by_product(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        after: Option<LedgerCursor>,
        limit: i64,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let state = self.lock()?;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.product_ref == product_id)
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .filter(|e| after.map_or(true, |c| e.cursor() > c))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.cursor());
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn list_by_source(&self, order_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let state = self.lock()?;
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.source_order_ref == Some(order_id))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.cursor());
        Ok(entries)
    }

    async fn sum_by_product(&self, product_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .lock()?
            .entries
            .iter()
            .filter(|e| e.product_ref == product_id)
            .map(|e| e.signed_quantity)
            .sum())
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn product_by_code(&self, code: &str) -> StoreResult<Option<Product>> {
        let code = code.trim();
        Ok(self
            .lock()?
            .products
            .values()
            .find(|p| p.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn product_by_id(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.lock()?.products.get(&id).cloned())
    }

    async fn counterparty_by_name(&self, name: &str) -> StoreResult<Option<Counterparty>> {
        let name = name.trim();
        Ok(self
            .lock()?
            .counterparties
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn counterparty_by_id(&self, id: Uuid) -> StoreResult<Option<Counterparty>> {
        Ok(self.lock()?.counterparties.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, OrderType, PaymentStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn order(number: &str) -> ShippingOrder {
        let now = Utc::now();
        ShippingOrder {
            id: Uuid::new_v4(),
            human_number: number.into(),
            order_number: number.into(),
            order_type: OrderType::Shipping,
            counterparty_ref: None,
            counterparty_name: None,
            items: Vec::new(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            total_amount: Decimal::ZERO,
            notes: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 1,
        }
    }

    fn outbound(order: Uuid, product: Uuid, qty: i64) -> LedgerEntry {
        LedgerEntry::new(
            product,
            -qty,
            MovementKind::OutboundShipment,
            Decimal::ONE,
            Utc::now(),
        )
        .with_source(order, "SO-1")
    }

    #[tokio::test]
    async fn second_outbound_entry_for_same_order_is_rejected() {
        let store = MemoryStore::new();
        let (order, product) = (Uuid::new_v4(), Uuid::new_v4());

        store.insert_entry(&outbound(order, product, 3)).await.unwrap();
        let err = store
            .insert_entry(&outbound(order, product, 3))
            .await
            .unwrap_err();

        assert!(err.is_violation_of(OUTBOUND_ONCE_CONSTRAINT));
        assert_eq!(store.sum_by_product(product).await.unwrap(), -3);
    }

    #[tokio::test]
    async fn delete_by_source_respects_kind_filter() {
        let store = MemoryStore::new();
        let (order, product) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert_entry(&outbound(order, product, 2)).await.unwrap();

        let removed = store
            .delete_by_source(order, Some(MovementKind::OutboundSale))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = store.delete_by_source(order, None).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn update_requires_the_stored_version() {
        let store = MemoryStore::new();
        let original = order("SO-1");
        store.insert_order(&original).await.unwrap();

        let mut fulfilled = original.clone();
        fulfilled.status = OrderStatus::Fulfilled;
        fulfilled.version = 2;
        assert!(store.update_order(&fulfilled, 1).await.unwrap());

        let mut cancelled = original.clone();
        cancelled.status = OrderStatus::Cancelled;
        cancelled.version = 2;
        assert!(!store.update_order(&cancelled, 1).await.unwrap());

        let stored = store.get_order(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Fulfilled);
        assert_eq!(stored.version, 2);
    }
}
