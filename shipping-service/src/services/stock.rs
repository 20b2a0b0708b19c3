//! Stock availability: on-hand aggregate and the sufficiency policy.

use crate::error::ShippingError;
use crate::models::{Counterparty, Product};
use crate::services::store::LedgerStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Non-fatal findings of a stock check, returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockWarning {
    /// Product is excluded from stock tracking and was not checked.
    Untracked { product_ref: Uuid, product_code: String },
    /// Order proceeds under a permissive policy but will take on-hand below zero.
    WouldOverdraw {
        product_ref: Uuid,
        product_code: String,
        on_hand: i64,
        requested: i64,
    },
}

/// Effective overdraw policy. An explicit request flag decides either way;
/// otherwise the service default or the counterparty can allow it.
pub fn allow_negative(
    request: Option<bool>,
    service_default: bool,
    counterparty: Option<&Counterparty>,
) -> bool {
    request.unwrap_or_else(|| service_default || counterparty.is_some_and(|c| c.allow_backorder))
}

#[derive(Clone)]
pub struct StockQuery {
    ledger: Arc<dyn LedgerStore>,
}

impl StockQuery {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn on_hand(&self, product_id: Uuid) -> Result<i64, ShippingError> {
        Ok(self.ledger.sum_by_product(product_id).await?)
    }

    /// Check proposed outbound quantities. Quantities for the same product are
    /// summed before comparing against on-hand. Advisory only: nothing is
    /// reserved, and the result can be stale by the time stock is deducted.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn check(
        &self,
        lines: &[(Product, i64)],
        allow_negative: bool,
    ) -> Result<Vec<StockWarning>, ShippingError> {
        let mut requested: Vec<(&Product, i64)> = Vec::new();
        for (product, quantity) in lines {
            match requested.iter_mut().find(|(p, _)| p.id == product.id) {
                Some((_, total)) => {
                    *total = total.checked_add(*quantity).ok_or_else(|| {
                        ShippingError::Validation(format!(
                            "total quantity for {} is out of range",
                            product.code
                        ))
                    })?;
                }
                None => requested.push((product, *quantity)),
            }
        }

        let mut warnings = Vec::new();
        for (product, quantity) in requested {
            if product.exclude_from_stock {
                warnings.push(StockWarning::Untracked {
                    product_ref: product.id,
                    product_code: product.code.clone(),
                });
                continue;
            }

            let on_hand = self.on_hand(product.id).await?;
            if on_hand >= quantity {
                continue;
            }

            if !allow_negative {
                return Err(ShippingError::InsufficientStock {
                    product_code: product.code.clone(),
                    on_hand,
                    requested: quantity,
                });
            }

            warn!(
                product_code = %product.code,
                on_hand,
                requested = quantity,
                "Order will overdraw stock"
            );
            warnings.push(StockWarning::WouldOverdraw {
                product_ref: product.id,
                product_code: product.code.clone(),
                on_hand,
                requested: quantity,
            });
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CounterpartyKind;

    #[test]
    fn counterparty_backorder_enables_overdraw() {
        let customer = Counterparty {
            id: Uuid::new_v4(),
            name: "Ward 3".into(),
            kind: CounterpartyKind::Customer,
            allow_backorder: true,
        };
        assert!(allow_negative(None, false, Some(&customer)));
        assert!(!allow_negative(None, false, None));
        assert!(allow_negative(Some(true), false, None));
    }

    #[test]
    fn explicit_request_flag_wins() {
        let customer = Counterparty {
            id: Uuid::new_v4(),
            name: "Ward 3".into(),
            kind: CounterpartyKind::Customer,
            allow_backorder: true,
        };
        assert!(!allow_negative(Some(false), true, None));
        assert!(!allow_negative(Some(false), false, Some(&customer)));
        assert!(allow_negative(None, true, None));
    }
}
