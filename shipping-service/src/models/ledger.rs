//! Inventory ledger entry model.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stock movement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Inbound,
    OutboundSale,
    OutboundShipment,
    Adjustment,
}

impl MovementKind {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::OutboundSale => "outbound_sale",
            Self::OutboundShipment => "outbound_shipment",
            Self::Adjustment => "adjustment",
        }
    }

    /// Kinds written by order transitions. At most one entry per
    /// `(source order, product, kind)` may exist for these.
    pub fn is_order_outbound(&self) -> bool {
        matches!(self, Self::OutboundSale | Self::OutboundShipment)
    }
}

impl std::str::FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound_sale" => Ok(Self::OutboundSale),
            "outbound_shipment" => Ok(Self::OutboundShipment),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(format!("unknown movement kind '{}'", other)),
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single immutable stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub product_ref: Uuid,
    /// Negative when stock leaves, positive when it enters.
    pub signed_quantity: i64,
    pub kind: MovementKind,
    pub source_order_ref: Option<Uuid>,
    pub source_order_number: Option<String>,
    pub unit_amount: Decimal,
    pub total_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl LedgerEntry {
    /// Build an entry; `total_amount` is derived from the absolute quantity
    /// and saturates instead of overflowing. `occurred_at` is truncated to
    /// microseconds, the storage precision.
    pub fn new(
        product_ref: Uuid,
        signed_quantity: i64,
        kind: MovementKind,
        unit_amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_ref,
            signed_quantity,
            kind,
            source_order_ref: None,
            source_order_number: None,
            unit_amount,
            total_amount: unit_amount.saturating_mul(Decimal::from(signed_quantity.unsigned_abs())),
            occurred_at: occurred_at.trunc_subsecs(6),
            note: None,
        }
    }

    pub fn with_source(mut self, order_ref: Uuid, order_number: impl Into<String>) -> Self {
        self.source_order_ref = Some(order_ref);
        self.source_order_number = Some(order_number.into());
        self
    }

    /// Keep an exact monetary total when the unit amount is a rounded
    /// quotient of it (order lines priced by total).
    pub fn with_total_amount(mut self, total: Decimal) -> Self {
        self.total_amount = total;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Absolute quantity moved.
    pub fn quantity(&self) -> i64 {
        self.signed_quantity.abs()
    }

    /// Sort key used for FIFO ordering and pagination.
    pub fn cursor(&self) -> LedgerCursor {
        LedgerCursor {
            occurred_at: self.occurred_at,
            id: self.id,
        }
    }
}

/// Position in a product's ledger, ordered by `(occurred_at, id)`.
/// Encodes to an opaque page token so listings can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerCursor {
    pub occurred_at: DateTime<Utc>,
    pub id: Uuid,
}

impl LedgerCursor {
    pub fn encode(&self) -> String {
        format!("{}_{}", self.occurred_at.timestamp_micros(), self.id)
    }

    pub fn decode(token: &str) -> Option<Self> {
        let (micros, id) = token.split_once('_')?;
        let micros: i64 = micros.parse().ok()?;
        let occurred_at = Utc.timestamp_micros(micros).single()?;
        let id = Uuid::parse_str(id).ok()?;
        Some(Self { occurred_at, id })
    }
}
