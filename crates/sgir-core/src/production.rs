//! # Production Rules
//!
//! Requirement math and the guards of the two-phase production workflow.
//!
//! ```text
//!   register ──► registered ──apply──► applied ──void──► voided
//!                 (no stock)        (supplies −, product +)   (exact reversal)
//! ```

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, SupplyShortfall};
use crate::money::Qty;
use crate::types::{Production, ProductionState, RecipeItem, Supply};

/// How much of one supply a production run consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyRequirement {
    pub supply_id: i64,
    pub required: Qty,
}

/// Per-supply requirements for `qty_produced` units, ascending by supply id.
///
/// `required = qty_per_unit × (1 + loss_pct/100) × qty_produced`
pub fn requirements(items: &[RecipeItem], qty_produced: i64) -> Vec<SupplyRequirement> {
    let mut reqs: Vec<SupplyRequirement> = items
        .iter()
        .map(|item| SupplyRequirement {
            supply_id: item.supply_id,
            required: item.qty_per_unit.scaled_with_loss(item.loss_pct, qty_produced),
        })
        .collect();
    reqs.sort_by_key(|r| r.supply_id);
    reqs
}

/// Fail-fast check of every requirement against current supply stock.
///
/// All shortfalls are collected before failing so the caller sees the whole
/// picture in one response.
pub fn check_supplies(reqs: &[SupplyRequirement], supplies: &[Supply]) -> CoreResult<()> {
    let by_id: HashMap<i64, &Supply> = supplies.iter().map(|s| (s.id, s)).collect();
    let mut shortfalls = Vec::new();

    for req in reqs {
        let supply = by_id
            .get(&req.supply_id)
            .ok_or_else(|| CoreError::not_found("supply", req.supply_id))?;
        if supply.stock_on_hand < req.required {
            shortfalls.push(SupplyShortfall {
                supply: supply.id,
                name: supply.name.clone(),
                requested: req.required,
                available: supply.stock_on_hand,
            });
        }
    }

    if shortfalls.is_empty() {
        Ok(())
    } else {
        Err(CoreError::InsufficientSupply { shortfalls })
    }
}

/// Requires the production to be in `expected` before moving it to `target`.
pub fn check_state(
    production: &Production,
    expected: ProductionState,
    target: ProductionState,
) -> CoreResult<()> {
    if production.state != expected {
        return Err(CoreError::InvalidTransition {
            entity: "production",
            from: production.state.to_string(),
            to: target.to_string(),
        });
    }
    Ok(())
}

/// A void must be able to take back everything the production created.
pub fn check_void_stock(production: &Production, product_stock: i64) -> CoreResult<()> {
    if product_stock < production.qty_produced {
        return Err(CoreError::CannotVoidInsufficientProductStock {
            product_id: production.product_id,
            required: production.qty_produced,
            available: product_stock,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Percent;
    use crate::types::SupplyUnit;
    use chrono::Utc;

    fn recipe_item(supply_id: i64, milli: i64, loss_bps: i64) -> RecipeItem {
        RecipeItem {
            id: supply_id,
            recipe_id: 1,
            supply_id,
            qty_per_unit: Qty::from_milli(milli),
            loss_pct: Percent::from_bps(loss_bps),
        }
    }

    fn supply(id: i64, units: i64) -> Supply {
        Supply {
            id,
            name: format!("S{}", id),
            category: None,
            unit: SupplyUnit::Kg,
            stock_on_hand: Qty::from_units(units),
            stock_min: Qty::zero(),
            active: true,
        }
    }

    fn production(state: ProductionState, qty: i64) -> Production {
        Production {
            id: 1,
            product_id: 2,
            recipe_id: 1,
            qty_produced: qty,
            lot: None,
            state,
            notes: String::new(),
            created_by: None,
            created_at: Utc::now(),
            applied_by: None,
            applied_at: None,
            voided_by: None,
            voided_at: None,
            void_reason: None,
            secondary_pin_validated: false,
        }
    }

    #[test]
    fn test_requirements_with_loss() {
        let items = vec![recipe_item(2, 200, 0), recipe_item(1, 500, 1000)];
        let reqs = requirements(&items, 10);
        assert_eq!(reqs[0].supply_id, 1);
        assert_eq!(reqs[0].required.milli(), 5500);
        assert_eq!(reqs[1].required.milli(), 2000);
    }

    #[test]
    fn test_check_supplies_collects_all_shortfalls() {
        let reqs = vec![
            SupplyRequirement { supply_id: 1, required: Qty::from_units(5) },
            SupplyRequirement { supply_id: 2, required: Qty::from_units(3) },
        ];
        assert!(check_supplies(&reqs, &[supply(1, 100), supply(2, 50)]).is_ok());

        match check_supplies(&reqs, &[supply(1, 1), supply(2, 2)]) {
            Err(CoreError::InsufficientSupply { shortfalls }) => assert_eq!(shortfalls.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_check_state() {
        let p = production(ProductionState::Registered, 10);
        assert!(check_state(&p, ProductionState::Registered, ProductionState::Applied).is_ok());
        assert!(check_state(&p, ProductionState::Applied, ProductionState::Voided).is_err());
    }

    #[test]
    fn test_check_void_stock() {
        let p = production(ProductionState::Applied, 10);
        assert!(check_void_stock(&p, 10).is_ok());
        assert!(matches!(
            check_void_stock(&p, 6),
            Err(CoreError::CannotVoidInsufficientProductStock { available: 6, .. })
        ));
    }
}
