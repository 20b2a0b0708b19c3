//! Inventory ledger: append-only stock movements per product.

use crate::error::ShippingError;
use crate::models::{LedgerCursor, LedgerEntry, MovementKind, MAX_QUANTITY};
use crate::services::metrics::LEDGER_WRITES_TOTAL;
use crate::services::store::{Catalog, LedgerStore, OUTBOUND_ONCE_CONSTRAINT};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of an append. Re-appending an identical outbound order entry is
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Recorded(LedgerEntry),
    AlreadyRecorded(LedgerEntry),
}

impl AppendOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            AppendOutcome::Recorded(e) | AppendOutcome::AlreadyRecorded(e) => e,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, AppendOutcome::Recorded(_))
    }
}

/// One page of a product's ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerPage {
    pub entries: Vec<LedgerEntry>,
    /// Present when more entries may follow.
    pub next_cursor: Option<LedgerCursor>,
}

/// Receiving or correction posting.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub product_ref: Uuid,
    pub kind: MovementKind,
    pub signed_quantity: i64,
    pub unit_amount: Decimal,
    pub occurred_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct InventoryLedger {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn Catalog>,
    page_size: i64,
}

impl InventoryLedger {
    pub fn new(ledger: Arc<dyn LedgerStore>, catalog: Arc<dyn Catalog>, page_size: i64) -> Self {
        Self {
            ledger,
            catalog,
            page_size: page_size.max(1),
        }
    }

    /// Append an entry. For outbound order kinds the storage constraint
    /// decides: an equal stored entry means the write already happened, a
    /// different one is a conflict.
    #[instrument(skip(self, entry), fields(product_id = %entry.product_ref, kind = %entry.kind))]
    pub async fn append(&self, entry: LedgerEntry) -> Result<AppendOutcome, ShippingError> {
        // Two passes: the stored entry can vanish between the collision and the
        // lookup when a reversal runs concurrently.
        for _ in 0..2 {
            match self.ledger.insert_entry(&entry).await {
                Ok(()) => {
                    LEDGER_WRITES_TOTAL
                        .with_label_values(&[entry.kind.as_str(), "recorded"])
                        .inc();
                    return Ok(AppendOutcome::Recorded(entry));
                }
                Err(e) if e.is_violation_of(OUTBOUND_ONCE_CONSTRAINT) => {
                    let Some(order_id) = entry.source_order_ref else {
                        return Err(e.into());
                    };
                    let existing = self
                        .ledger
                        .find_order_entry(order_id, entry.product_ref, entry.kind)
                        .await?;
                    match existing {
                        Some(stored) if stored.signed_quantity == entry.signed_quantity => {
                            LEDGER_WRITES_TOTAL
                                .with_label_values(&[entry.kind.as_str(), "already_recorded"])
                                .inc();
                            return Ok(AppendOutcome::AlreadyRecorded(stored));
                        }
                        Some(stored) => {
                            warn!(
                                order_id = %order_id,
                                stored_quantity = stored.signed_quantity,
                                requested_quantity = entry.signed_quantity,
                                "Outbound entry already recorded with a different quantity"
                            );
                            LEDGER_WRITES_TOTAL
                                .with_label_values(&[entry.kind.as_str(), "conflict"])
                                .inc();
                            return Err(ShippingError::LedgerWriteConflict {
                                order_id,
                                product_id: entry.product_ref,
                                kind: entry.kind,
                            });
                        }
                        None => continue,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        match entry.source_order_ref {
            Some(order_id) => Err(ShippingError::LedgerWriteConflict {
                order_id,
                product_id: entry.product_ref,
                kind: entry.kind,
            }),
            None => Err(ShippingError::Storage(anyhow::anyhow!(
                "Entry {} kept colliding without a source order",
                entry.id
            ))),
        }
    }

    /// Remove every entry an order produced, optionally of one kind only.
    #[instrument(skip(self))]
    pub async fn remove_by_source(
        &self,
        order_id: Uuid,
        kind: Option<MovementKind>,
    ) -> Result<u64, ShippingError> {
        let removed = self.ledger.delete_by_source(order_id, kind).await?;
        if removed > 0 {
            LEDGER_WRITES_TOTAL
                .with_label_values(&[kind.map_or("any", |k| k.as_str()), "removed"])
                .inc_by(removed as f64);
        }
        info!(
            order_id = %order_id,
            kind = kind.map_or("any", |k| k.as_str()),
            removed,
            "Ledger entries removed for order"
        );
        Ok(removed)
    }

    pub async fn entries_for_order(&self, order_id: Uuid) -> Result<Vec<LedgerEntry>, ShippingError> {
        Ok(self.ledger.list_by_source(order_id).await?)
    }

    /// One page in `(occurred_at, id)` order, resuming after `cursor`.
    #[instrument(skip(self, cursor))]
    pub async fn list_by_product(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        cursor: Option<LedgerCursor>,
        page_size: Option<i64>,
    ) -> Result<LedgerPage, ShippingError> {
        let limit = page_size.unwrap_or(self.page_size).clamp(1, 1000);
        let entries = self
            .ledger
            .list_by_product(product_id, kind, cursor, limit)
            .await?;
        let next_cursor = if entries.len() as i64 == limit {
            entries.last().map(LedgerEntry::cursor)
        } else {
            None
        };
        Ok(LedgerPage {
            entries,
            next_cursor,
        })
    }

    /// Lazily walk a product's ledger page by page, starting after `start`.
    pub fn stream_by_product(
        &self,
        product_id: Uuid,
        kind: Option<MovementKind>,
        start: Option<LedgerCursor>,
    ) -> BoxStream<'static, Result<LedgerEntry, ShippingError>> {
        let ledger = self.ledger.clone();
        let page_size = self.page_size;

        stream::try_unfold(Some(start), move |position| {
            next_page(ledger.clone(), product_id, kind, position, page_size)
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, ShippingError>)))
        .try_flatten()
        .boxed()
    }

    /// Post a receiving or correction movement. Outbound kinds belong to
    /// order transitions and are refused here.
    #[instrument(skip(self, request), fields(product_id = %request.product_ref, kind = %request.kind))]
    pub async fn record_movement(
        &self,
        request: MovementRequest,
    ) -> Result<LedgerEntry, ShippingError> {
        match request.kind {
            MovementKind::Inbound if request.signed_quantity <= 0 => {
                return Err(ShippingError::Validation(
                    "inbound quantity must be positive".to_string(),
                ));
            }
            MovementKind::Inbound => {}
            MovementKind::Adjustment if request.signed_quantity == 0 => {
                return Err(ShippingError::Validation(
                    "adjustment quantity cannot be zero".to_string(),
                ));
            }
            MovementKind::Adjustment => {}
            MovementKind::OutboundSale | MovementKind::OutboundShipment => {
                return Err(ShippingError::Validation(format!(
                    "{} entries are written by order status changes",
                    request.kind
                )));
            }
        }
        if request.signed_quantity.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
            return Err(ShippingError::Validation(format!(
                "quantity cannot exceed {} units",
                MAX_QUANTITY
            )));
        }
        if request.unit_amount < Decimal::ZERO {
            return Err(ShippingError::Validation(
                "unit amount cannot be negative".to_string(),
            ));
        }
        if request
            .unit_amount
            .checked_mul(Decimal::from(request.signed_quantity.unsigned_abs()))
            .is_none()
        {
            return Err(ShippingError::Validation(
                "unit amount times quantity is out of range".to_string(),
            ));
        }

        let product = self
            .catalog
            .product_by_id(request.product_ref)
            .await?
            .ok_or_else(|| ShippingError::ProductNotFound(request.product_ref.to_string()))?;

        let mut entry = LedgerEntry::new(
            product.id,
            request.signed_quantity,
            request.kind,
            request.unit_amount,
            request.occurred_at.unwrap_or_else(Utc::now),
        );
        if let Some(note) = request.note {
            entry = entry.with_note(note);
        }

        let outcome = self.append(entry).await?;

        info!(
            product_code = %product.code,
            quantity = outcome.entry().signed_quantity,
            "Stock movement recorded"
        );

        Ok(outcome.entry().clone())
    }
}

type PagePosition = Option<Option<LedgerCursor>>;

/// `None` position means the walk is finished; `Some(None)` starts from the beginning.
async fn next_page(
    ledger: Arc<dyn LedgerStore>,
    product_id: Uuid,
    kind: Option<MovementKind>,
    position: PagePosition,
    page_size: i64,
) -> Result<Option<(Vec<LedgerEntry>, PagePosition)>, ShippingError> {
    let Some(after) = position else {
        return Ok(None);
    };
    let page = ledger
        .list_by_product(product_id, kind, after, page_size)
        .await?;
    if page.is_empty() {
        return Ok(None);
    }
    let next = if (page.len() as i64) < page_size {
        None
    } else {
        page.last().map(|e| Some(e.cursor()))
    };
    Ok(Some((page, next)))
}
