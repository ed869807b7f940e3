//! # Order Rules
//!
//! The order state machine, totals arithmetic and the pure checks that run
//! before any order mutation touches storage.
//!
//! ## State Machine
//! ```text
//! created ──► confirmed ──► in_preparation ──► ready ──► delivered ──► closed
//!    │            │                                                    (paid only)
//!    └────────────┴──► cancelled   (payment still pending)
//! ```
//! `cancelled` and `closed` are terminal.
//!
//! ## Totals
//! ```text
//! subtotal    = Σ unit_price × qty_total
//! discount    = round(subtotal × discount_pct)
//! total_final = max(0, subtotal − discount) + tip
//! ```
//! `discount` is recomputed from `discount_pct` whenever the subtotal moves,
//! so applying a discount and then applying 0% restores the original total.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Percent};
use crate::types::{KanbanLane, Order, OrderItem, OrderState, PaymentState};

// =============================================================================
// State Machine
// =============================================================================

impl OrderState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Cancelled | OrderState::Closed)
    }

    /// The single forward step from this state, if any.
    pub const fn next(&self) -> Option<OrderState> {
        match self {
            OrderState::Created => Some(OrderState::Confirmed),
            OrderState::Confirmed => Some(OrderState::InPreparation),
            OrderState::InPreparation => Some(OrderState::Ready),
            OrderState::Ready => Some(OrderState::Delivered),
            OrderState::Delivered => Some(OrderState::Closed),
            OrderState::Cancelled | OrderState::Closed => None,
        }
    }

    /// Whether `self → next` is one of the drawn arrows.
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        match next {
            OrderState::Cancelled => {
                matches!(self, OrderState::Created | OrderState::Confirmed)
            }
            _ => self.next() == Some(next),
        }
    }

    /// Board lane for orders still awaiting payment.
    pub const fn kanban_lane(&self) -> Option<KanbanLane> {
        match self {
            OrderState::Created | OrderState::Confirmed => Some(KanbanLane::ToPrepare),
            OrderState::InPreparation => Some(KanbanLane::Preparing),
            OrderState::Ready => Some(KanbanLane::Ready),
            OrderState::Delivered => Some(KanbanLane::Delivered),
            OrderState::Cancelled | OrderState::Closed => None,
        }
    }

    /// Maps the legacy literal set onto the canonical states.
    ///
    /// ## Example
    /// ```rust
    /// use sgir_core::types::OrderState;
    ///
    /// assert_eq!(OrderState::from_legacy("en preparacion"), Some(OrderState::InPreparation));
    /// assert_eq!(OrderState::from_legacy("ready"), Some(OrderState::Ready));
    /// assert_eq!(OrderState::from_legacy("???"), None);
    /// ```
    pub fn from_legacy(literal: &str) -> Option<OrderState> {
        let normalised = literal.trim().to_lowercase();
        match normalised.as_str() {
            "pendiente" => Some(OrderState::Created),
            "en preparacion" | "en_preparacion" | "en preparación" => {
                Some(OrderState::InPreparation)
            }
            "listo" => Some(OrderState::Ready),
            "entregado" => Some(OrderState::Delivered),
            "cancelado" => Some(OrderState::Cancelled),
            other => other.parse().ok(),
        }
    }
}

/// Validates a state move requested through the kanban endpoint.
///
/// Cancellation has its own operation and is rejected here. Moving to
/// `closed` additionally requires the order to be fully paid.
pub fn check_state_step(order: &Order, next: OrderState) -> CoreResult<()> {
    let invalid = || CoreError::InvalidTransition {
        entity: "order",
        from: order.state.to_string(),
        to: next.to_string(),
    };

    if next == OrderState::Cancelled || !order.state.can_transition_to(next) {
        return Err(invalid());
    }
    if next == OrderState::Closed && order.payment_state != PaymentState::Paid {
        return Err(invalid());
    }
    Ok(())
}

/// Cancel is only allowed early and only while nothing has been paid.
pub fn check_cancel(order: &Order) -> CoreResult<()> {
    if !order.state.can_transition_to(OrderState::Cancelled)
        || order.payment_state != PaymentState::Pending
    {
        return Err(CoreError::InvalidTransition {
            entity: "order",
            from: order.state.to_string(),
            to: OrderState::Cancelled.to_string(),
        });
    }
    Ok(())
}

/// Modifications (items, discount, tip, reassign) need an unpaid, live order.
pub fn check_modifiable(order: &Order) -> CoreResult<()> {
    if order.payment_state == PaymentState::Paid {
        return Err(CoreError::PaymentAlreadyDone { order_id: order.id });
    }
    if order.state.is_terminal() {
        return Err(CoreError::InvalidTransition {
            entity: "order",
            from: order.state.to_string(),
            to: "modified".to_string(),
        });
    }
    Ok(())
}

/// Payments need an order that still owes money and is not cancelled.
pub fn check_payable(order: &Order) -> CoreResult<()> {
    if order.payment_state == PaymentState::Paid {
        return Err(CoreError::PaymentAlreadyDone { order_id: order.id });
    }
    if order.state == OrderState::Cancelled {
        return Err(CoreError::InvalidTransition {
            entity: "order",
            from: order.state.to_string(),
            to: "paid".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Totals
// =============================================================================

/// The derived money fields of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Money,
    pub discount: Money,
    pub tip: Money,
    pub total_final: Money,
}

impl Totals {
    pub fn compute(subtotal: Money, discount_pct: Percent, tip: Money) -> Self {
        let discount = subtotal.percent_of(discount_pct);
        Totals {
            subtotal,
            discount,
            tip,
            total_final: (subtotal - discount).non_negative() + tip,
        }
    }

    pub fn from_items(items: &[OrderItem], discount_pct: Percent, tip: Money) -> Self {
        let subtotal = items.iter().map(|i| i.subtotal).sum();
        Self::compute(subtotal, discount_pct, tip)
    }

    /// Rejects totals that would fall below what was already collected.
    pub fn ensure_covers(&self, paid: Money) -> CoreResult<()> {
        if self.total_final < paid {
            return Err(CoreError::TotalBelowPaid {
                total: self.total_final,
                paid,
            });
        }
        Ok(())
    }

    /// Writes the totals into an order record.
    pub fn apply_to(&self, order: &mut Order) {
        order.subtotal = self.subtotal;
        order.discount = self.discount;
        order.tip = self.tip;
        order.total_final = self.total_final;
    }
}

/// Payment state implied by a paid amount.
pub fn payment_state_for(paid: Money, total_final: Money) -> PaymentState {
    if paid >= total_final {
        PaymentState::Paid
    } else if paid.is_positive() {
        PaymentState::Partial
    } else {
        PaymentState::Pending
    }
}

// =============================================================================
// Line Rules
// =============================================================================

/// Collapses requested lines by product and sorts them by ascending product
/// id, which is also the lock order for the products.
///
/// ## Example
/// ```rust
/// use sgir_core::order::merge_lines;
///
/// assert_eq!(merge_lines(&[(7, 1), (3, 2), (7, 2)]), vec![(3, 2), (7, 3)]);
/// ```
pub fn merge_lines(lines: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut merged: BTreeMap<i64, i64> = BTreeMap::new();
    for (product_id, qty) in lines {
        *merged.entry(*product_id).or_insert(0) += qty;
    }
    merged.into_iter().collect()
}

/// Stock delta for moving a line to `new_qty` (positive ⇒ take from stock).
///
/// The paid portion of a line is frozen: `new_qty` may not go below it.
pub fn qty_change_delta(item: &OrderItem, new_qty: i64) -> CoreResult<i64> {
    if new_qty < item.qty_paid || new_qty < 1 {
        return Err(CoreError::ItemPartiallyPaid {
            item_id: item.id,
            qty_paid: item.qty_paid,
        });
    }
    Ok(new_qty - item.qty_total)
}

/// A line may be deleted only if nothing on it is paid and it is not the last.
pub fn check_removal(item: &OrderItem, lines_in_order: usize) -> CoreResult<()> {
    if item.qty_paid > 0 {
        return Err(CoreError::ItemPartiallyPaid {
            item_id: item.id,
            qty_paid: item.qty_paid,
        });
    }
    if lines_in_order <= 1 {
        return Err(CoreError::LastItem {
            order_id: item.order_id,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn order(state: OrderState, payment_state: PaymentState) -> Order {
        Order {
            id: 1,
            table_number: 1,
            account_id: 1,
            state,
            waiter_id: None,
            cashier_id: None,
            guest_count: 2,
            subtotal: Money::from_cents(2000),
            discount: Money::zero(),
            discount_pct: Percent::zero(),
            tip: Money::zero(),
            total_final: Money::from_cents(2000),
            paid_amount: Money::zero(),
            payment_method: None,
            payment_state,
            opened_at: Utc::now(),
            paid_at: None,
            notes: String::new(),
            notes_cashier: String::new(),
            modified: false,
            modified_by: None,
            reassigned: false,
        }
    }

    fn item(qty_total: i64, qty_paid: i64) -> OrderItem {
        OrderItem {
            id: 10,
            order_id: 1,
            product_id: 1,
            qty_total,
            qty_paid,
            unit_price: Money::from_cents(1000),
            subtotal: Money::from_cents(1000 * qty_total),
        }
    }

    #[test]
    fn test_forward_chain() {
        let mut state = OrderState::Created;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(next));
            state = next;
            visited.push(state);
        }
        assert_eq!(visited.len(), 6);
        assert_eq!(state, OrderState::Closed);
    }

    #[test]
    fn test_no_skipping_or_backwards() {
        assert!(!OrderState::Created.can_transition_to(OrderState::Ready));
        assert!(!OrderState::Ready.can_transition_to(OrderState::Confirmed));
        assert!(!OrderState::Closed.can_transition_to(OrderState::Cancelled));
        assert!(!OrderState::InPreparation.can_transition_to(OrderState::Cancelled));
    }

    #[test]
    fn test_close_requires_paid() {
        let unpaid = order(OrderState::Delivered, PaymentState::Pending);
        assert!(check_state_step(&unpaid, OrderState::Closed).is_err());

        let paid = order(OrderState::Delivered, PaymentState::Paid);
        assert!(check_state_step(&paid, OrderState::Closed).is_ok());
    }

    #[test]
    fn test_state_step_never_cancels() {
        let o = order(OrderState::Created, PaymentState::Pending);
        assert!(check_state_step(&o, OrderState::Cancelled).is_err());
        assert!(check_cancel(&o).is_ok());

        let partial = order(OrderState::Confirmed, PaymentState::Partial);
        assert!(check_cancel(&partial).is_err());

        let late = order(OrderState::Ready, PaymentState::Pending);
        assert!(check_cancel(&late).is_err());
    }

    #[test]
    fn test_kanban_lanes() {
        assert_eq!(OrderState::Created.kanban_lane(), Some(KanbanLane::ToPrepare));
        assert_eq!(OrderState::Confirmed.kanban_lane(), Some(KanbanLane::ToPrepare));
        assert_eq!(OrderState::InPreparation.kanban_lane(), Some(KanbanLane::Preparing));
        assert_eq!(OrderState::Cancelled.kanban_lane(), None);
    }

    #[test]
    fn test_legacy_literals() {
        assert_eq!(OrderState::from_legacy("pendiente"), Some(OrderState::Created));
        assert_eq!(OrderState::from_legacy("Listo"), Some(OrderState::Ready));
        assert_eq!(OrderState::from_legacy("entregado"), Some(OrderState::Delivered));
        assert_eq!(OrderState::from_legacy("cancelado"), Some(OrderState::Cancelled));
    }

    #[test]
    fn test_totals() {
        let totals = Totals::compute(
            Money::from_cents(2000),
            Percent::from_bps(1000),
            Money::from_cents(150),
        );
        assert_eq!(totals.discount.cents(), 200);
        assert_eq!(totals.total_final.cents(), 1950);

        let full = Totals::compute(Money::from_cents(2000), Percent::HUNDRED, Money::from_cents(100));
        assert_eq!(full.total_final.cents(), 100);
    }

    #[test]
    fn test_discount_round_trip() {
        let base = Totals::compute(Money::from_cents(2599), Percent::zero(), Money::zero());
        let discounted = Totals::compute(base.subtotal, Percent::from_bps(1500), base.tip);
        assert_ne!(discounted.total_final, base.total_final);
        let restored = Totals::compute(discounted.subtotal, Percent::zero(), discounted.tip);
        assert_eq!(restored, base);
    }

    #[test]
    fn test_ensure_covers() {
        let totals = Totals::compute(Money::from_cents(1000), Percent::zero(), Money::zero());
        assert!(totals.ensure_covers(Money::from_cents(1000)).is_ok());
        assert!(matches!(
            totals.ensure_covers(Money::from_cents(1001)),
            Err(CoreError::TotalBelowPaid { .. })
        ));
    }

    #[test]
    fn test_payment_state_for() {
        let total = Money::from_cents(3000);
        assert_eq!(payment_state_for(Money::zero(), total), PaymentState::Pending);
        assert_eq!(payment_state_for(Money::from_cents(1000), total), PaymentState::Partial);
        assert_eq!(payment_state_for(total, total), PaymentState::Paid);
    }

    #[test]
    fn test_qty_change_delta() {
        let line = item(3, 1);
        assert_eq!(qty_change_delta(&line, 5).unwrap(), 2);
        assert_eq!(qty_change_delta(&line, 1).unwrap(), -2);
        assert!(qty_change_delta(&line, 0).is_err());

        let unpaid = item(2, 0);
        assert!(qty_change_delta(&unpaid, 0).is_err());
    }

    #[test]
    fn test_check_removal() {
        assert!(check_removal(&item(2, 0), 2).is_ok());
        assert!(matches!(
            check_removal(&item(2, 1), 2),
            Err(CoreError::ItemPartiallyPaid { .. })
        ));
        assert!(matches!(
            check_removal(&item(2, 0), 1),
            Err(CoreError::LastItem { .. })
        ));
    }

    #[test]
    fn test_modifiable() {
        assert!(check_modifiable(&order(OrderState::Ready, PaymentState::Partial)).is_ok());
        assert!(matches!(
            check_modifiable(&order(OrderState::Ready, PaymentState::Paid)),
            Err(CoreError::PaymentAlreadyDone { .. })
        ));
        assert!(check_modifiable(&order(OrderState::Cancelled, PaymentState::Cancelled)).is_err());
    }
}
