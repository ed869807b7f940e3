//! # Table Rules
//!
//! Seating search, table grouping math and the table-account status rules.
//!
//! ## Assignment Search
//! ```text
//! guests = g, candidates = available, uncombined tables sorted by number
//!
//!   1. smallest single table with capacity ≥ g        (ties: lowest number)
//!   2. pairs   with Σ capacity ≥ g, least excess      (ties: lexicographic)
//!   3. triples with Σ capacity ≥ g, least excess      (ties: lexicographic)
//!   4. none → no_table_available
//! ```

use serde::Serialize;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{AccountStatus, Order, OrderState, PaymentState, Table, TableStatus};
use crate::MAX_COMBINED_TABLES;

// =============================================================================
// Assignment
// =============================================================================

/// Result of a seating search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Assignment {
    Single { table: i64 },
    Combined { tables: Vec<i64> },
}

impl Assignment {
    pub fn numbers(&self) -> Vec<i64> {
        match self {
            Assignment::Single { table } => vec![*table],
            Assignment::Combined { tables } => tables.clone(),
        }
    }
}

/// Finds a seating for `guests` among `tables`.
///
/// Only `available`, uncombined tables are candidates. The result is fully
/// determined by the input set, whatever its order.
///
/// ## Example
/// ```rust
/// use sgir_core::table::{find_assignment, Assignment};
/// use sgir_core::types::{Table, TableStatus};
///
/// let t = |number, capacity| Table {
///     number, capacity, status: TableStatus::Available, combined: false,
///     combined_with: vec![], combined_capacity: 0, map_x: 0, map_y: 0,
/// };
/// let floor = vec![t(1, 2), t(2, 4), t(3, 6)];
/// assert_eq!(find_assignment(&floor, 3), Some(Assignment::Single { table: 2 }));
/// assert_eq!(find_assignment(&floor, 8), Some(Assignment::Combined { tables: vec![1, 3] }));
/// ```
pub fn find_assignment(tables: &[Table], guests: i64) -> Option<Assignment> {
    let mut candidates: Vec<(i64, i64)> = tables
        .iter()
        .filter(|t| t.status == TableStatus::Available && !t.combined)
        .map(|t| (t.number, t.capacity))
        .collect();
    candidates.sort_unstable();

    let single = candidates
        .iter()
        .filter(|(_, cap)| *cap >= guests)
        .min_by_key(|(number, cap)| (*cap, *number));
    if let Some((number, _)) = single {
        return Some(Assignment::Single { table: *number });
    }

    for size in 2..=MAX_COMBINED_TABLES {
        if let Some(tables) = best_combination(&candidates, size, guests) {
            return Some(Assignment::Combined { tables });
        }
    }
    None
}

/// Least-excess combination of exactly `size` candidates. Iteration is in
/// lexicographic order and only a strictly smaller excess replaces the best,
/// so ties resolve to the lexicographically first group.
fn best_combination(candidates: &[(i64, i64)], size: usize, guests: i64) -> Option<Vec<i64>> {
    let mut best: Option<(i64, Vec<i64>)> = None;
    let mut indices: Vec<usize> = (0..size).collect();
    let n = candidates.len();
    if n < size {
        return None;
    }

    loop {
        let capacity: i64 = indices.iter().map(|&i| candidates[i].1).sum();
        if capacity >= guests {
            let excess = capacity - guests;
            if best.as_ref().map_or(true, |(b, _)| excess < *b) {
                best = Some((excess, indices.iter().map(|&i| candidates[i].0).collect()));
            }
        }

        // Advance to the next combination in lexicographic order.
        let mut pos = size;
        loop {
            if pos == 0 {
                return best.map(|(_, numbers)| numbers);
            }
            pos -= 1;
            if indices[pos] < n - size + pos {
                break;
            }
        }
        indices[pos] += 1;
        for k in pos + 1..size {
            indices[k] = indices[k - 1] + 1;
        }
    }
}

// =============================================================================
// Grouping
// =============================================================================

/// Target shape of a combined group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinePlan {
    pub members: Vec<i64>,
    pub capacity: i64,
}

/// Computes the merged group for `tables`.
///
/// `tables` must already include every member of any group being merged.
pub fn plan_combine(tables: &[Table]) -> CoreResult<CombinePlan> {
    let mut members: Vec<i64> = tables.iter().map(|t| t.number).collect();
    members.sort_unstable();
    members.dedup();

    if members.len() < 2 || members.len() > MAX_COMBINED_TABLES {
        return Err(ValidationError::OutOfRange {
            field: "tables".to_string(),
            min: 2,
            max: MAX_COMBINED_TABLES as i64,
        }
        .into());
    }

    let capacity = members
        .iter()
        .filter_map(|n| tables.iter().find(|t| t.number == *n))
        .map(|t| t.capacity)
        .sum();
    Ok(CombinePlan { members, capacity })
}

/// Guests must fit the table (or its group).
pub fn check_capacity(table: &Table, guests: i64) -> CoreResult<()> {
    let capacity = table.effective_capacity();
    if guests > capacity {
        return Err(CoreError::CapacityExceeded {
            number: table.number,
            guests,
            capacity,
        });
    }
    Ok(())
}

// =============================================================================
// Table Accounts
// =============================================================================

/// Outcome of recalculating a table account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRecalc {
    pub total_accumulated: Money,
    pub total_paid: Money,
    pub status: AccountStatus,
    /// At least one live order is partly paid.
    pub settling: bool,
}

/// Recomputes totals and status from the account's orders.
///
/// ```text
/// live   = orders where state ≠ cancelled
/// unpaid = live orders where payment_state ≠ paid
///
/// closed  ⇐ unpaid = ∅ ∧ (live ≠ ∅ ∨ release_when_empty)
/// in_debt ⇐ unpaid ≠ ∅ ∧ debt_authorized
/// open    otherwise
/// ```
///
/// `release_when_empty` is set by callers that just moved or cancelled the
/// account's orders away. A closed account stays closed.
pub fn recalculate_account(
    current: AccountStatus,
    debt_authorized: bool,
    orders: &[Order],
    release_when_empty: bool,
) -> AccountRecalc {
    let live: Vec<&Order> = orders
        .iter()
        .filter(|o| o.state != OrderState::Cancelled)
        .collect();

    let total_accumulated = live.iter().map(|o| o.total_final).sum();
    let total_paid = live.iter().map(|o| o.paid_amount).sum();
    let any_unpaid = live.iter().any(|o| o.payment_state != PaymentState::Paid);
    let settling = live.iter().any(|o| o.payment_state == PaymentState::Partial);

    let status = if current == AccountStatus::Closed {
        AccountStatus::Closed
    } else if !any_unpaid && (!live.is_empty() || release_when_empty) {
        AccountStatus::Closed
    } else if any_unpaid && debt_authorized {
        AccountStatus::InDebt
    } else {
        AccountStatus::Open
    };

    AccountRecalc {
        total_accumulated,
        total_paid,
        status,
        settling,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tests::order;

    fn table(number: i64, capacity: i64) -> Table {
        Table {
            number,
            capacity,
            status: TableStatus::Available,
            combined: false,
            combined_with: vec![],
            combined_capacity: 0,
            map_x: 0,
            map_y: 0,
        }
    }

    #[test]
    fn test_smallest_single_table() {
        let floor = vec![table(3, 6), table(1, 4), table(2, 4)];
        assert_eq!(find_assignment(&floor, 4), Some(Assignment::Single { table: 1 }));
        assert_eq!(find_assignment(&floor, 5), Some(Assignment::Single { table: 3 }));
    }

    #[test]
    fn test_skips_busy_and_combined() {
        let mut busy = table(1, 4);
        busy.status = TableStatus::Occupied;
        let mut grouped = table(2, 4);
        grouped.combined = true;
        let floor = vec![busy, grouped, table(3, 8)];
        assert_eq!(find_assignment(&floor, 2), Some(Assignment::Single { table: 3 }));
    }

    #[test]
    fn test_pair_minimises_excess() {
        // 7 guests: (1,2)=8 excess 1, (1,3)=6 short, (2,3)=10 excess 3
        let floor = vec![table(1, 4), table(2, 4), table(3, 2)];
        assert_eq!(
            find_assignment(&floor, 7),
            Some(Assignment::Combined { tables: vec![1, 2] })
        );
    }

    #[test]
    fn test_pair_tie_is_lexicographic() {
        // (1,4) and (2,3) both seat 6 exactly
        let floor = vec![table(1, 2), table(2, 3), table(3, 3), table(4, 4)];
        assert_eq!(
            find_assignment(&floor, 6),
            Some(Assignment::Combined { tables: vec![1, 4] })
        );
    }

    #[test]
    fn test_triples_when_pairs_fail() {
        let floor = vec![table(1, 2), table(2, 2), table(3, 2), table(4, 2)];
        assert_eq!(
            find_assignment(&floor, 5),
            Some(Assignment::Combined { tables: vec![1, 2, 3] })
        );
        assert_eq!(find_assignment(&floor, 7), None);
    }

    #[test]
    fn test_plan_combine() {
        let plan = plan_combine(&[table(4, 2), table(2, 4)]).unwrap();
        assert_eq!(plan.members, vec![2, 4]);
        assert_eq!(plan.capacity, 6);
        assert!(plan_combine(&[table(1, 2)]).is_err());
    }

    #[test]
    fn test_check_capacity() {
        assert!(check_capacity(&table(1, 4), 4).is_ok());
        assert!(matches!(
            check_capacity(&table(1, 4), 5),
            Err(CoreError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_recalculate_closes_when_all_paid() {
        let mut paid = order(OrderState::Delivered, PaymentState::Paid);
        paid.paid_amount = paid.total_final;
        let cancelled = order(OrderState::Cancelled, PaymentState::Cancelled);

        let r = recalculate_account(AccountStatus::Open, false, &[paid, cancelled], false);
        assert_eq!(r.status, AccountStatus::Closed);
        assert_eq!(r.total_accumulated.cents(), 2000);
        assert_eq!(r.total_paid.cents(), 2000);
    }

    #[test]
    fn test_recalculate_empty_account() {
        let r = recalculate_account(AccountStatus::Open, false, &[], false);
        assert_eq!(r.status, AccountStatus::Open);
        let r = recalculate_account(AccountStatus::Open, false, &[], true);
        assert_eq!(r.status, AccountStatus::Closed);
    }

    #[test]
    fn test_recalculate_debt_and_settling() {
        let mut partial = order(OrderState::Delivered, PaymentState::Partial);
        partial.paid_amount = Money::from_cents(500);

        let r = recalculate_account(AccountStatus::Open, false, &[partial.clone()], false);
        assert_eq!(r.status, AccountStatus::Open);
        assert!(r.settling);

        let r = recalculate_account(AccountStatus::Open, true, &[partial], false);
        assert_eq!(r.status, AccountStatus::InDebt);
    }
}
