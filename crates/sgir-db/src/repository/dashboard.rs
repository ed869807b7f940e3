//! # Dashboard Repository
//!
//! Read-model queries. Pure and idempotent: nothing here writes.
//!
//! ## Queries
//! ```text
//! ┌──────────────────┬────────────────────────────────────────────────────┐
//! │ table_map        │ dining_tables ⟕ open table_accounts                │
//! │ kanban           │ unpaid live orders + lines + product names         │
//! │ pending_payments │ unpaid live orders + waiter / modifier names       │
//! │ day_stats        │ transactions, splits, refunds, orders of one date  │
//! └──────────────────┴────────────────────────────────────────────────────┘
//! ```
//!
//! "Unpaid live" means `payment_state ∈ {pending, partial}` and
//! `state ∉ {cancelled, closed}`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

use crate::error::DbResult;
use crate::repository::table::TableRepository;
use sgir_core::cash::MethodTotals;
use sgir_core::dashboard::{
    average_ticket, status_colour, suggested_tip, DayStats, KanbanBoard, KanbanCard, KanbanLine,
    MethodBreakdown, PendingPayment, TableMapEntry,
};
use sgir_core::{Money, OrderState, PaymentMethod, Percent};

/// Orders still owing money; partly paid ones stay on the board.
const UNPAID_LIVE: &str = "o.payment_state IN ('pending', 'partial') \
     AND o.state NOT IN ('cancelled', 'closed')";

#[derive(Debug, FromRow)]
struct OpenAccountRow {
    table_number: i64,
    id: i64,
    total_accumulated: Money,
    total_paid: Money,
}

#[derive(Debug, FromRow)]
struct UnpaidOrderRow {
    id: i64,
    table_number: i64,
    account_id: i64,
    state: OrderState,
    guest_count: i64,
    subtotal: Money,
    discount: Money,
    total_final: Money,
    paid_amount: Money,
    opened_at: DateTime<Utc>,
    notes: String,
    waiter_name: Option<String>,
    modifier_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct LineRow {
    order_id: i64,
    product_id: i64,
    name: String,
    qty: i64,
}

#[derive(Debug, FromRow)]
struct DayOrderRow {
    paid_orders: i64,
    paid_total: Money,
    total_discounts: Money,
    total_tips: Money,
}

/// Repository for dashboard read models.
pub struct DashboardRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> DashboardRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        DashboardRepository { conn }
    }

    /// Every table with its colour and, when seated, its open account totals.
    pub async fn table_map(&mut self) -> DbResult<Vec<TableMapEntry>> {
        let tables = TableRepository::new(&mut *self.conn).list().await?;

        let accounts = sqlx::query_as::<_, OpenAccountRow>(
            "SELECT table_number, id, total_accumulated, total_paid
             FROM table_accounts WHERE status = 'open'",
        )
        .fetch_all(&mut *self.conn)
        .await?;
        let by_table: HashMap<i64, OpenAccountRow> = accounts
            .into_iter()
            .map(|a| (a.table_number, a))
            .collect();

        Ok(tables
            .into_iter()
            .map(|t| {
                // A combined group shares the account held by one member
                let account = by_table.get(&t.number).or_else(|| {
                    t.combined_with.iter().find_map(|member| by_table.get(member))
                });
                TableMapEntry {
                    number: t.number,
                    capacity: t.capacity,
                    status: t.status,
                    colour: status_colour(t.status).to_string(),
                    combined_with: t.combined_with,
                    map_x: t.map_x,
                    map_y: t.map_y,
                    account_id: account.map(|a| a.id),
                    total_accumulated: account.map(|a| a.total_accumulated).unwrap_or_default(),
                    total_paid: account.map(|a| a.total_paid).unwrap_or_default(),
                }
            })
            .collect())
    }

    /// The four-lane kitchen board.
    pub async fn kanban(&mut self) -> DbResult<KanbanBoard> {
        let orders = self.unpaid_orders().await?;

        let lines = sqlx::query_as::<_, LineRow>(&format!(
            r#"
            SELECT i.order_id, i.product_id, p.name, i.qty_total AS qty
            FROM order_items i
            JOIN orders o ON o.id = i.order_id
            JOIN products p ON p.id = i.product_id
            WHERE {UNPAID_LIVE}
            ORDER BY i.order_id, i.id
            "#
        ))
        .fetch_all(&mut *self.conn)
        .await?;

        let mut by_order: HashMap<i64, Vec<KanbanLine>> = HashMap::new();
        for line in lines {
            by_order.entry(line.order_id).or_default().push(KanbanLine {
                product_id: line.product_id,
                name: line.name,
                qty: line.qty,
            });
        }

        let cards = orders
            .into_iter()
            .map(|o| KanbanCard {
                order_id: o.id,
                table_number: o.table_number,
                state: o.state,
                guest_count: o.guest_count,
                waiter: o.waiter_name,
                opened_at: o.opened_at,
                notes: o.notes,
                items: by_order.remove(&o.id).unwrap_or_default(),
            })
            .collect();

        Ok(KanbanBoard::from_cards(cards))
    }

    /// The cashier's queue, oldest first, with a tip suggestion at `tip_pct`.
    pub async fn pending_payments(&mut self, tip_pct: Percent) -> DbResult<Vec<PendingPayment>> {
        let orders = self.unpaid_orders().await?;

        Ok(orders
            .into_iter()
            .map(|o| PendingPayment {
                order_id: o.id,
                table_number: o.table_number,
                account_id: o.account_id,
                state: o.state,
                total_final: o.total_final,
                paid_amount: o.paid_amount,
                balance: o.total_final - o.paid_amount,
                suggested_tip: suggested_tip(o.subtotal, o.discount, tip_pct),
                waiter: o.waiter_name,
                modified_by: o.modifier_name,
                opened_at: o.opened_at,
            })
            .collect())
    }

    /// Figures of one business date. `tax_pct` feeds the informational
    /// tax estimate.
    pub async fn day_stats(&mut self, date: NaiveDate, tax_pct: Percent) -> DbResult<DayStats> {
        let payments = sqlx::query_as::<_, (PaymentMethod, Money)>(
            r#"
            SELECT t.method, t.amount FROM transactions t
            WHERE t.state = 'processed' AND t.method <> 'mixed' AND date(t.created_at) = ?1
            UNION ALL
            SELECT s.method, s.amount FROM payment_splits s
            JOIN transactions t ON t.id = s.transaction_id
            WHERE t.state = 'processed' AND t.method = 'mixed' AND date(t.created_at) = ?1
            "#,
        )
        .bind(date)
        .fetch_all(&mut *self.conn)
        .await?;

        let refunds = sqlx::query_as::<_, (PaymentMethod, Money)>(
            "SELECT method, amount FROM refunds WHERE date(created_at) = ?1",
        )
        .bind(date)
        .fetch_all(&mut *self.conn)
        .await?;

        let mut gross = MethodTotals::default();
        for (method, amount) in payments {
            gross.add(method, amount);
        }
        let mut refunded = MethodTotals::default();
        for (method, amount) in refunds {
            refunded.add(method, amount);
        }
        let net = gross.minus(&refunded);

        let figures = sqlx::query_as::<_, DayOrderRow>(
            r#"
            SELECT COUNT(*) AS paid_orders,
                   COALESCE(SUM(total_final), 0) AS paid_total,
                   COALESCE(SUM(discount), 0) AS total_discounts,
                   COALESCE(SUM(tip), 0) AS total_tips
            FROM orders
            WHERE payment_state = 'paid' AND date(paid_at) = ?1
            "#,
        )
        .bind(date)
        .fetch_one(&mut *self.conn)
        .await?;

        let (open_orders, cancelled_orders) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN payment_state IN ('pending', 'partial')
                                   AND state NOT IN ('cancelled', 'closed') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'cancelled' THEN 1 ELSE 0 END), 0)
            FROM orders
            WHERE date(opened_at) = ?1
            "#,
        )
        .bind(date)
        .fetch_one(&mut *self.conn)
        .await?;

        let open_shifts = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM shifts WHERE date = ?1 AND state = 'open'",
        )
        .bind(date)
        .fetch_one(&mut *self.conn)
        .await?;

        let total_sales = net.total();
        Ok(DayStats {
            date,
            by_method: MethodBreakdown {
                cash: net.cash,
                card: net.card,
                qr: net.qr,
                mobile: net.mobile,
            },
            total_sales,
            paid_orders: figures.paid_orders,
            open_orders,
            cancelled_orders,
            total_discounts: figures.total_discounts,
            total_tips: figures.total_tips,
            total_refunds: refunded.total(),
            average_ticket: average_ticket(figures.paid_total, figures.paid_orders),
            tax_estimate: total_sales.calculate_tax(tax_pct),
            open_shifts,
        })
    }

    async fn unpaid_orders(&mut self) -> DbResult<Vec<UnpaidOrderRow>> {
        let rows = sqlx::query_as::<_, UnpaidOrderRow>(&format!(
            r#"
            SELECT o.id, o.table_number, o.account_id, o.state, o.guest_count, o.subtotal,
                   o.discount, o.total_final, o.paid_amount, o.opened_at, o.notes,
                   w.display_name AS waiter_name,
                   m.display_name AS modifier_name
            FROM orders o
            LEFT JOIN principals w ON w.id = o.waiter_id
            LEFT JOIN principals m ON m.id = o.modified_by
            WHERE {UNPAID_LIVE}
            ORDER BY o.opened_at, o.id
            "#
        ))
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }
}
