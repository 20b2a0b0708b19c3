pub mod database;
pub mod fifo;
pub mod inventory;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod orders;
pub mod sequence;
pub mod stock;
pub mod store;

pub use database::Database;
pub use fifo::{FifoEngine, ShortfallPricing};
pub use inventory::{AppendOutcome, InventoryLedger, LedgerPage, MovementRequest};
pub use lifecycle::{StockEffect, TransitionTable};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use orders::{CreateOrder, ItemInput, OrderOutcome, OrderService, TransitionOutcome, UpdateOrder};
pub use sequence::{OrderNumber, SequenceAllocator};
pub use stock::{StockQuery, StockWarning};
pub use store::{Catalog, LedgerStore, OrderStore, StoreError};

use crate::config::{FifoConfig, OrderConfig};
use std::sync::Arc;

/// Every domain service wired against one backing store.
#[derive(Clone)]
pub struct Services {
    pub orders: OrderService,
    pub inventory: InventoryLedger,
    pub stock: StockQuery,
    pub fifo: FifoEngine,
}

impl Services {
    pub fn new<S>(store: Arc<S>, orders: &OrderConfig, fifo: &FifoConfig) -> Self
    where
        S: OrderStore + LedgerStore + Catalog + 'static,
    {
        let order_store: Arc<dyn OrderStore> = store.clone();
        let ledger_store: Arc<dyn LedgerStore> = store.clone();
        let catalog: Arc<dyn Catalog> = store;

        let inventory = InventoryLedger::new(ledger_store.clone(), catalog.clone(), fifo.page_size);
        let stock = StockQuery::new(ledger_store);
        let allocator = SequenceAllocator::new(
            order_store.clone(),
            orders.number_prefix.clone(),
            orders.number_max_attempts,
        );

        Self {
            orders: OrderService::new(
                order_store,
                catalog.clone(),
                allocator,
                inventory.clone(),
                stock.clone(),
                orders.allow_negative_stock,
            ),
            fifo: FifoEngine::new(inventory.clone(), catalog, fifo.shortfall_pricing),
            inventory,
            stock,
        }
    }
}
