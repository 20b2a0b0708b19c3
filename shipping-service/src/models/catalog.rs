//! Read-only master data consumed by the order flow.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Excluded products are never checked for sufficiency.
    pub exclude_from_stock: bool,
    /// Last known selling price; used to price FIFO shortfalls.
    pub reference_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyKind {
    Customer,
    Supplier,
}

impl CounterpartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "customer",
            CounterpartyKind::Supplier => "supplier",
        }
    }
}

impl std::str::FromStr for CounterpartyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(CounterpartyKind::Customer),
            "supplier" => Ok(CounterpartyKind::Supplier),
            other => Err(format!("unknown counterparty kind '{}'", other)),
        }
    }
}

/// Customer or supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: Uuid,
    pub name: String,
    pub kind: CounterpartyKind,
    /// Orders for this counterparty may overdraw stock.
    pub allow_backorder: bool,
}
