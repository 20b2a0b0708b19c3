//! Human-readable order number allocation.
//!
//! Numbers are only known to be unique once the order row is stored, so the
//! allocator wraps the insert itself: propose a number, let the caller
//! persist, and on a uniqueness violation propose the next one. The loop is
//! bounded by `max_attempts`.

use crate::error::ShippingError;
use crate::models::normalize_number;
use crate::services::metrics::SEQUENCE_RETRIES_TOTAL;
use crate::services::store::{
    OrderStore, StoreError, StoreResult, HUMAN_NUMBER_CONSTRAINT, ORDER_NUMBER_CONSTRAINT,
};
use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Identifier pair reserved for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNumber {
    /// Unique among live orders, shown to people.
    pub human_number: String,
    /// Unique across all orders, including deleted ones.
    pub order_number: String,
}

/// Numeric suffix of `human_number` when it is `prefix` followed by digits only.
pub fn parse_sequence(human_number: &str, prefix: &str) -> Option<u32> {
    let normalized = normalize_number(human_number);
    let rest = normalized.strip_prefix(&normalize_number(prefix))?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

#[derive(Clone)]
pub struct SequenceAllocator {
    orders: Arc<dyn OrderStore>,
    prefix: String,
    max_attempts: u32,
}

impl SequenceAllocator {
    pub fn new(orders: Arc<dyn OrderStore>, prefix: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            orders,
            prefix: prefix.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Prefix shared by every generated number issued on `day`.
    pub fn day_prefix(&self, day: NaiveDate) -> String {
        format!("{}{}-", normalize_number(&self.prefix), day.format("%Y%m%d"))
    }

    /// Allocate a number and persist the order with it, dated today (UTC).
    pub async fn reserve<T, F, Fut>(
        &self,
        candidate: Option<&str>,
        persist: F,
    ) -> Result<T, ShippingError>
    where
        F: FnMut(OrderNumber) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.reserve_on(Utc::now().date_naive(), candidate, persist)
            .await
    }

    /// Same as [`Self::reserve`] with an explicit issue date.
    #[instrument(skip(self, persist), fields(prefix = %self.prefix))]
    pub async fn reserve_on<T, F, Fut>(
        &self,
        day: NaiveDate,
        candidate: Option<&str>,
        persist: F,
    ) -> Result<T, ShippingError>
    where
        F: FnMut(OrderNumber) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        match candidate.map(normalize_number) {
            Some(number) if number.is_empty() => Err(ShippingError::Validation(
                "order number cannot be blank".to_string(),
            )),
            Some(number) => self.reserve_candidate(number, persist).await,
            None => self.reserve_generated(day, persist).await,
        }
    }

    /// Caller-chosen number. A live duplicate is a caller error; a clash with
    /// a deleted order's `order_number` is resolved by suffixing.
    async fn reserve_candidate<T, F, Fut>(
        &self,
        human_number: String,
        mut persist: F,
    ) -> Result<T, ShippingError>
    where
        F: FnMut(OrderNumber) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        if self.orders.find_live_by_number(&human_number).await?.is_some() {
            return Err(ShippingError::DuplicateOrderNumber(human_number));
        }

        for suffix in 0..self.max_attempts {
            let order_number = if suffix == 0 {
                human_number.clone()
            } else {
                format!("{}-{}", human_number, suffix)
            };

            let attempt = OrderNumber {
                human_number: human_number.clone(),
                order_number,
            };
            match persist(attempt.clone()).await {
                Ok(value) => {
                    info!(human_number = %attempt.human_number, order_number = %attempt.order_number, "Order number reserved");
                    return Ok(value);
                }
                Err(e) if e.is_violation_of(HUMAN_NUMBER_CONSTRAINT) => {
                    return Err(ShippingError::DuplicateOrderNumber(human_number));
                }
                Err(e) if e.is_violation_of(ORDER_NUMBER_CONSTRAINT) => {
                    SEQUENCE_RETRIES_TOTAL
                        .with_label_values(&["order_number_reused"])
                        .inc();
                    debug!(order_number = %attempt.order_number, "Order number held by a deleted order, suffixing");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(human_number = %human_number, attempts = self.max_attempts, "Order number suffixes exhausted");
        Err(ShippingError::SequenceExhausted(self.max_attempts))
    }

    /// Generated `<prefix><YYYYMMDD>-<NNN>` number. Each attempt re-reads the
    /// highest sequence and never proposes a number it already tried.
    async fn reserve_generated<T, F, Fut>(
        &self,
        day: NaiveDate,
        mut persist: F,
    ) -> Result<T, ShippingError>
    where
        F: FnMut(OrderNumber) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let prefix = self.day_prefix(day);
        let mut last_tried = 0u32;

        for attempt in 1..=self.max_attempts {
            let highest = self.orders.max_sequence(&prefix).await?.unwrap_or(0);
            let next = highest.max(last_tried).checked_add(1).ok_or_else(|| {
                ShippingError::Validation(format!("sequence for {} overflowed", prefix))
            })?;
            last_tried = next;

            let human_number = format!("{}{:03}", prefix, next);
            let number = OrderNumber {
                human_number: human_number.clone(),
                order_number: human_number,
            };

            match persist(number.clone()).await {
                Ok(value) => {
                    info!(human_number = %number.human_number, attempt, "Order number allocated");
                    return Ok(value);
                }
                Err(StoreError::UniqueViolation { constraint }) => {
                    SEQUENCE_RETRIES_TOTAL
                        .with_label_values(&["collision"])
                        .inc();
                    debug!(
                        human_number = %number.human_number,
                        constraint = %constraint,
                        attempt,
                        "Order number taken concurrently, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(prefix = %prefix, attempts = self.max_attempts, "Order number allocation exhausted");
        Err(ShippingError::SequenceExhausted(self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sequence_reads_digits_after_prefix() {
        assert_eq!(parse_sequence("SO20260101-007", "SO20260101-"), Some(7));
        assert_eq!(parse_sequence("so20260101-1234", "SO20260101-"), Some(1234));
    }

    #[test]
    fn parse_sequence_ignores_foreign_numbers() {
        assert_eq!(parse_sequence("SO20260102-001", "SO20260101-"), None);
        assert_eq!(parse_sequence("SO20260101-001-1", "SO20260101-"), None);
        assert_eq!(parse_sequence("SO20260101-", "SO20260101-"), None);
    }
}
