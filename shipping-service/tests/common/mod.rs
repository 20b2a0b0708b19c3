//! Test helper module for shipping-service integration tests.
//!
//! Everything runs against the in-memory store seeded with a small catalog.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use service_core::config::Config as CoreConfig;
use shipping_service::config::{DatabaseConfig, FifoConfig, OrderConfig, ShippingConfig};
use shipping_service::models::{
    Counterparty, CounterpartyKind, LedgerCursor, LedgerEntry, ListOrdersFilter, MovementKind,
    Product, ShippingOrder,
};
use shipping_service::services::store::StoreResult;
use shipping_service::services::{
    Catalog, CreateOrder, ItemInput, LedgerStore, MemoryStore, MovementRequest, OrderStore,
    Services, ShortfallPricing,
};
use shipping_service::AppState;
use std::sync::{Arc, Once};
use uuid::Uuid;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("warn")
            .with_test_writer()
            .try_init();
    });
}

pub fn test_config() -> ShippingConfig {
    ShippingConfig {
        common: CoreConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        service_name: "shipping-service-test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
        },
        orders: OrderConfig {
            number_max_attempts: 20,
            ..OrderConfig::default()
        },
        fifo: FifoConfig {
            page_size: 3,
            shortfall_pricing: ShortfallPricing::Reference,
        },
    }
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub services: Services,
    pub config: ShippingConfig,
    pub amoxicillin: Product,
    pub paracetamol: Product,
    pub gloves: Product,
    pub clinic: Counterparty,
    pub walk_in: Counterparty,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ShippingConfig) -> Self {
        init_tracing();

        let store = Arc::new(MemoryStore::new());
        let amoxicillin = Product {
            id: Uuid::new_v4(),
            code: "AMOX500".to_string(),
            name: "Amoxicillin 500mg".to_string(),
            exclude_from_stock: false,
            reference_price: Some(dec!(1.20)),
        };
        let paracetamol = Product {
            id: Uuid::new_v4(),
            code: "PARA500".to_string(),
            name: "Paracetamol 500mg".to_string(),
            exclude_from_stock: false,
            reference_price: None,
        };
        let gloves = Product {
            id: Uuid::new_v4(),
            code: "GLOVE-M".to_string(),
            name: "Nitrile gloves M".to_string(),
            exclude_from_stock: true,
            reference_price: None,
        };
        let clinic = Counterparty {
            id: Uuid::new_v4(),
            name: "St. Mary Clinic".to_string(),
            kind: CounterpartyKind::Customer,
            allow_backorder: true,
        };
        let walk_in = Counterparty {
            id: Uuid::new_v4(),
            name: "Walk-in".to_string(),
            kind: CounterpartyKind::Customer,
            allow_backorder: false,
        };

        for product in [&amoxicillin, &paracetamol, &gloves] {
            store.add_product(product.clone()).expect("seed product");
        }
        for counterparty in [&clinic, &walk_in] {
            store
                .add_counterparty(counterparty.clone())
                .expect("seed counterparty");
        }

        let services = Services::new(store.clone(), &config.orders, &config.fifo);

        Self {
            store,
            services,
            config,
            amoxicillin,
            paracetamol,
            gloves,
            clinic,
            walk_in,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::from_store(self.store.clone(), &self.config)
    }

    /// Post an inbound movement `days_ago` days in the past.
    pub async fn receive(&self, product: &Product, quantity: i64, unit_cost: Decimal, days_ago: i64) -> LedgerEntry {
        self.services
            .inventory
            .record_movement(MovementRequest {
                product_ref: product.id,
                kind: MovementKind::Inbound,
                signed_quantity: quantity,
                unit_amount: unit_cost,
                occurred_at: Some(days_before_now(days_ago)),
                note: None,
            })
            .await
            .expect("receive stock")
    }

    /// Services over the same data whose order reads return a snapshot taken
    /// `delay` before the caller sees it.
    pub fn slow_services(&self, delay: std::time::Duration) -> Services {
        let store = Arc::new(SlowReads {
            inner: self.store.clone(),
            delay,
        });
        Services::new(store, &self.config.orders, &self.config.fifo)
    }

    pub async fn on_hand(&self, product: &Product) -> i64 {
        self.services
            .stock
            .on_hand(product.id)
            .await
            .expect("on hand")
    }
}

pub fn days_before_now(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

pub fn item(code: &str, quantity: i64, line_total: Decimal) -> ItemInput {
    ItemInput {
        product_code: code.to_string(),
        quantity,
        unit_price: None,
        line_total: Some(line_total),
        packaging: None,
    }
}

pub fn shipping_order(items: Vec<ItemInput>) -> CreateOrder {
    CreateOrder {
        order_number: None,
        order_type: shipping_service::models::OrderType::Shipping,
        counterparty_ref: None,
        counterparty_name: None,
        items,
        payment_status: None,
        notes: None,
        allow_negative: None,
    }
}

/// Store whose `get_order` reads first and then sleeps, so callers act on a
/// snapshot that may already be stale.
pub struct SlowReads {
    inner: Arc<MemoryStore>,
    delay: std::time::Duration,
}

#[async_trait]
impl OrderStore for SlowReads {
    async fn insert_order(&self, order: &ShippingOrder) -> StoreResult<()> {
        self.inner.insert_order(order).await
    }

    async fn update_order(&self, order: &ShippingOrder, expected_version: i64) -> StoreResult<bool> {
        self.inner.update_order(order, expected_version).await
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<ShippingOrder>> {
        let order = self.inner.get_order(id).await;
        tokio::time::sleep(self.delay).await;
        order
    }

    async fn find_live_by_number(&self, normalized: &str) -> StoreResult<Option<ShippingOrder>> {
        self.inner.find_live_by_number(normalized).await
    }

    async fn max_sequence(&self, prefix: &str) -> StoreResult<Option<u32>> {
        self.inner.max_sequence(prefix).await
    }

    async fn list_orders(&self, filter: &ListOrdersFilter) -> StoreResult<Vec<ShippingOrder>> {
        self.inner.list_orders(filter).await
    }
}

#[async_trait]
impl LedgerStore for SlowReads {
    async fn insert_entry(&self, entry: &LedgerEntry) -> StoreResult<()> {
        self.inner.insert_entry(entry).await
    }

    async fn find_order_entry(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        kind: MovementKind,
    ) -> StoreResult<Option<LedgerEntry>> {
        self.inner.find_order_entry(order_id, product_id, kind).await
    }

    async fn delete_by_source(&self, order_id: Uuid, kind: Option<MovementKind>) -> StoreResult<u64> {
        self.inner.delete_by_source(order_id, kind).await
    }

    async fn list_by_product(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        after: Option<LedgerCursor>,
        limit: i64,
    ) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.list_by_product(product_id, kind, after, limit).await
    }

    async fn list_by_source(&self, order_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.list_by_source(order_id).await
    }

    async fn sum_by_product(&self, product_id: Uuid) -> StoreResult<i64> {
        self.inner.sum_by_product(product_id).await
    }
}

#[async_trait]
impl Catalog for SlowReads {
    async fn product_by_code(&self, code: &str) -> StoreResult<Option<Product>> {
        self.inner.product_by_code(code).await
    }

    async fn product_by_id(&self, id: Uuid) -> StoreResult<Option<Product>> {
        self.inner.product_by_id(id).await
    }

    async fn counterparty_by_name(&self, name: &str) -> StoreResult<Option<Counterparty>> {
        self.inner.counterparty_by_name(name).await
    }

    async fn counterparty_by_id(&self, id: Uuid) -> StoreResult<Option<Counterparty>> {
        self.inner.counterparty_by_id(id).await
    }
}
