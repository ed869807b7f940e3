//! # Read Model Views
//!
//! Shapes returned by the dashboard queries and the webhook façade. The
//! queries themselves live in sgir-db; this module holds the view types and
//! the small derivations (colours, averages, tip suggestions) they share.
//!
//! ```text
//!  tables + open accounts ──► TableMapEntry[]
//!  unpaid live orders     ──► KanbanBoard { to_prepare, preparing, ready, delivered }
//!                         ──► PendingPayment[]
//!  shifts + transactions  ──► DayStats
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, Percent};
use crate::types::{KanbanLane, OrderState, StockAlert, TableStatus};

// =============================================================================
// Table Map
// =============================================================================

/// Colour code shown for a table status.
pub const fn status_colour(status: TableStatus) -> &'static str {
    match status {
        TableStatus::Available => "green",
        TableStatus::Reserved => "blue",
        TableStatus::Occupied => "red",
        TableStatus::Settling => "orange",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TableMapEntry {
    pub number: i64,
    pub capacity: i64,
    pub status: TableStatus,
    pub colour: String,
    pub combined_with: Vec<i64>,
    pub map_x: i64,
    pub map_y: i64,
    pub account_id: Option<i64>,
    pub total_accumulated: Money,
    pub total_paid: Money,
}

// =============================================================================
// Kanban
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KanbanLine {
    pub product_id: i64,
    pub name: String,
    pub qty: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KanbanCard {
    pub order_id: i64,
    pub table_number: i64,
    pub state: OrderState,
    pub guest_count: i64,
    pub waiter: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub notes: String,
    pub items: Vec<KanbanLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KanbanBoard {
    pub to_prepare: Vec<KanbanCard>,
    pub preparing: Vec<KanbanCard>,
    pub ready: Vec<KanbanCard>,
    pub delivered: Vec<KanbanCard>,
}

impl KanbanBoard {
    /// Places cards in their lane; orders without a lane are dropped.
    pub fn from_cards(cards: Vec<KanbanCard>) -> Self {
        let mut board = KanbanBoard::default();
        for card in cards {
            match card.state.kanban_lane() {
                Some(KanbanLane::ToPrepare) => board.to_prepare.push(card),
                Some(KanbanLane::Preparing) => board.preparing.push(card),
                Some(KanbanLane::Ready) => board.ready.push(card),
                Some(KanbanLane::Delivered) => board.delivered.push(card),
                None => {}
            }
        }
        board
    }
}

// =============================================================================
// Pending Payments
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingPayment {
    pub order_id: i64,
    pub table_number: i64,
    pub account_id: i64,
    pub state: OrderState,
    pub total_final: Money,
    pub paid_amount: Money,
    pub balance: Money,
    pub suggested_tip: Money,
    pub waiter: Option<String>,
    pub modified_by: Option<String>,
    pub opened_at: DateTime<Utc>,
}

/// Tip suggestion on the post-discount amount.
pub fn suggested_tip(subtotal: Money, discount: Money, pct: Percent) -> Money {
    (subtotal - discount).non_negative().percent_of(pct)
}

// =============================================================================
// Day Stats
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodBreakdown {
    pub cash: Money,
    pub card: Money,
    pub qr: Money,
    pub mobile: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DayStats {
    pub date: NaiveDate,
    pub by_method: MethodBreakdown,
    pub total_sales: Money,
    pub paid_orders: i64,
    pub open_orders: i64,
    pub cancelled_orders: i64,
    pub total_discounts: Money,
    pub total_tips: Money,
    pub total_refunds: Money,
    pub average_ticket: Money,
    /// Informational only; prices are tax-inclusive.
    pub tax_estimate: Money,
    pub open_shifts: i64,
}

/// Integer average, rounded half up; zero when there is nothing to average.
pub fn average_ticket(total: Money, count: i64) -> Money {
    if count <= 0 {
        return Money::zero();
    }
    Money::from_cents((total.cents() * 2 + count) / (count * 2))
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: StockAlert,
    pub target_name: String,
    pub stock_min: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(order_id: i64, state: OrderState) -> KanbanCard {
        KanbanCard {
            order_id,
            table_number: 1,
            state,
            guest_count: 2,
            waiter: None,
            opened_at: Utc::now(),
            notes: String::new(),
            items: vec![],
        }
    }

    #[test]
    fn test_board_lanes() {
        let board = KanbanBoard::from_cards(vec![
            card(1, OrderState::Created),
            card(2, OrderState::Confirmed),
            card(3, OrderState::InPreparation),
            card(4, OrderState::Delivered),
            card(5, OrderState::Cancelled),
        ]);
        assert_eq!(board.to_prepare.len(), 2);
        assert_eq!(board.preparing.len(), 1);
        assert!(board.ready.is_empty());
        assert_eq!(board.delivered.len(), 1);
    }

    #[test]
    fn test_average_ticket() {
        assert_eq!(average_ticket(Money::from_cents(5000), 2).cents(), 2500);
        assert_eq!(average_ticket(Money::from_cents(1000), 3).cents(), 333);
        assert_eq!(average_ticket(Money::from_cents(1000), 0), Money::zero());
    }

    #[test]
    fn test_suggested_tip() {
        let tip = suggested_tip(Money::from_cents(2000), Money::from_cents(200), Percent::from_bps(1000));
        assert_eq!(tip.cents(), 180);
    }

    #[test]
    fn test_colours() {
        assert_eq!(status_colour(TableStatus::Available), "green");
        assert_eq!(status_colour(TableStatus::Settling), "orange");
    }
}
