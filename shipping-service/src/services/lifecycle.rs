//! Order status vocabularies and their stock effects, expressed as data.

use crate::models::{MovementKind, OrderStatus, OrderType};

/// What a status change does to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Write one outbound entry per product.
    Deduct,
    /// Remove the order's outbound entries.
    Restore,
    /// Re-run the idempotent write for an already committed order.
    Reaffirm,
    /// Between uncommitted states: clear any outbound entries an interrupted
    /// deduction left behind.
    Sweep,
    None,
}

/// Transition table for one order type.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    pub order_type: OrderType,
    pub initial: OrderStatus,
    allowed: &'static [(OrderStatus, &'static [OrderStatus])],
    /// States in which the order's stock has left the shelf.
    committed: &'static [OrderStatus],
    /// States that lock the order against every further change.
    terminal: &'static [OrderStatus],
    pub commit_kind: MovementKind,
}

use OrderStatus::*;

const SHIPPING_TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (Pending, &[Processing, Fulfilled, Cancelled]),
    (Processing, &[Pending, Fulfilled, Cancelled]),
    (Fulfilled, &[Pending, Processing, Delivered, Cancelled]),
    (Cancelled, &[Pending]),
    (Delivered, &[]),
];

const SALE_TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (Pending, &[Completed, Cancelled]),
    (Completed, &[Pending, Cancelled]),
    (Cancelled, &[Pending]),
];

static SHIPPING: TransitionTable = TransitionTable {
    order_type: OrderType::Shipping,
    initial: Pending,
    allowed: SHIPPING_TRANSITIONS,
    committed: &[Fulfilled, Delivered],
    terminal: &[Delivered],
    commit_kind: MovementKind::OutboundShipment,
};

static SALE: TransitionTable = TransitionTable {
    order_type: OrderType::Sale,
    initial: Pending,
    allowed: SALE_TRANSITIONS,
    committed: &[Completed],
    terminal: &[],
    commit_kind: MovementKind::OutboundSale,
};

impl TransitionTable {
    pub fn for_type(order_type: OrderType) -> &'static TransitionTable {
        match order_type {
            OrderType::Shipping => &SHIPPING,
            OrderType::Sale => &SALE,
        }
    }

    /// Whether `status` belongs to this vocabulary.
    pub fn knows(&self, status: OrderStatus) -> bool {
        self.allowed.iter().any(|(from, _)| *from == status)
    }

    pub fn is_committed(&self, status: OrderStatus) -> bool {
        self.committed.contains(&status)
    }

    pub fn is_terminal(&self, status: OrderStatus) -> bool {
        self.terminal.contains(&status)
    }

    /// Items can only change while no stock is committed.
    pub fn is_editable(&self, status: OrderStatus) -> bool {
        !self.is_committed(status) && !self.is_terminal(status)
    }

    /// Whether `from -> to` is allowed. Staying put is allowed in any
    /// non-terminal state.
    pub fn can_transition(&self, from: OrderStatus, to: OrderStatus) -> bool {
        if self.is_terminal(from) || !self.knows(to) {
            return false;
        }
        if from == to {
            return true;
        }
        self.allowed
            .iter()
            .find(|(state, _)| *state == from)
            .is_some_and(|(_, next)| next.contains(&to))
    }

    pub fn effect(&self, from: OrderStatus, to: OrderStatus) -> StockEffect {
        match (self.is_committed(from), self.is_committed(to)) {
            (false, true) => StockEffect::Deduct,
            (true, false) => StockEffect::Restore,
            (true, true) if from == to => StockEffect::Reaffirm,
            (true, true) => StockEffect::None,
            (false, false) => StockEffect::Sweep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipping_commit_and_reversal_effects() {
        let table = TransitionTable::for_type(OrderType::Shipping);
        assert_eq!(table.effect(Pending, Fulfilled), StockEffect::Deduct);
        assert_eq!(table.effect(Processing, Fulfilled), StockEffect::Deduct);
        assert_eq!(table.effect(Fulfilled, Cancelled), StockEffect::Restore);
        assert_eq!(table.effect(Fulfilled, Delivered), StockEffect::None);
        assert_eq!(table.effect(Fulfilled, Fulfilled), StockEffect::Reaffirm);
        assert_eq!(table.effect(Pending, Processing), StockEffect::Sweep);
        assert_eq!(table.effect(Pending, Cancelled), StockEffect::Sweep);
    }

    #[test]
    fn delivered_is_locked() {
        let table = TransitionTable::for_type(OrderType::Shipping);
        assert!(table.is_terminal(Delivered));
        for to in [Pending, Processing, Fulfilled, Cancelled, Delivered] {
            assert!(!table.can_transition(Delivered, to));
        }
    }

    #[test]
    fn shipping_cannot_skip_back_from_cancelled_to_fulfilled() {
        let table = TransitionTable::for_type(OrderType::Shipping);
        assert!(!table.can_transition(Cancelled, Fulfilled));
        assert!(table.can_transition(Cancelled, Pending));
        assert!(!table.can_transition(Pending, Delivered));
    }

    #[test]
    fn sale_vocabulary_rejects_shipping_states() {
        let table = TransitionTable::for_type(OrderType::Sale);
        assert!(table.can_transition(Pending, Completed));
        assert!(table.can_transition(Completed, Pending));
        assert!(!table.can_transition(Pending, Fulfilled));
        assert!(!table.knows(Processing));
        assert_eq!(table.commit_kind, MovementKind::OutboundSale);
        assert!(!table.is_editable(Completed));
    }
}
