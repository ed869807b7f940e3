//! # Permission Model
//!
//! Every operation declares a [`Requirement`]: the roles allowed to call it,
//! the area tag a staff principal must hold, and whether it mutates state
//! (which is what the shift-liveness gate looks at).
//!
//! ```text
//! principal ──► role ∈ req.roles ? ──► area held (staff only) ? ──► allowed
//!                    │ no                    │ no
//!                    ▼                       ▼
//!                forbidden               forbidden
//! ```
//! `manager` and `admin` hold every area implicitly.

use crate::error::{CoreError, CoreResult};
use crate::types::{Area, Principal, Role};
use crate::types::Role::{Admin, Cashier, Cook, Customer, Manager, Waiter};

/// Declared access requirement of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub roles: &'static [Role],
    pub area: Option<Area>,
    pub mutating: bool,
}

const ALL_ROLES: &[Role] = &[Customer, Waiter, Cook, Cashier, Manager, Admin];
const STAFF: &[Role] = &[Waiter, Cook, Cashier, Manager, Admin];
const FLOOR: &[Role] = &[Waiter, Cashier, Manager, Admin];
const ORDERING: &[Role] = &[Customer, Waiter, Cashier, Manager, Admin];
const REGISTER: &[Role] = &[Cashier, Manager, Admin];
const KITCHEN: &[Role] = &[Cook, Manager, Admin];
const AUTHORISERS: &[Role] = &[Manager, Admin];
const ADMINS: &[Role] = &[Admin];

impl Requirement {
    /// Anyone holding a session may read.
    pub const READ_ANY: Requirement = Requirement {
        roles: ALL_ROLES,
        area: None,
        mutating: false,
    };

    /// Placing and modifying orders (QR customers included).
    pub const ORDER_WRITE: Requirement = Requirement {
        roles: ORDERING,
        area: Some(Area::Waiter),
        mutating: true,
    };

    /// Moving an order along the kanban.
    pub const ORDER_STEP: Requirement = Requirement {
        roles: STAFF,
        area: None,
        mutating: true,
    };

    /// Floor operations: tables, accounts, reservations.
    pub const FLOOR_WRITE: Requirement = Requirement {
        roles: FLOOR,
        area: Some(Area::Waiter),
        mutating: true,
    };

    pub const FLOOR_READ: Requirement = Requirement {
        roles: STAFF,
        area: None,
        mutating: false,
    };

    /// Shifts, payments and refunds.
    pub const CASH_WRITE: Requirement = Requirement {
        roles: REGISTER,
        area: Some(Area::Cash),
        mutating: true,
    };

    pub const CASH_READ: Requirement = Requirement {
        roles: REGISTER,
        area: Some(Area::Cash),
        mutating: false,
    };

    /// Recipes and productions.
    pub const KITCHEN_WRITE: Requirement = Requirement {
        roles: KITCHEN,
        area: Some(Area::Kitchen),
        mutating: true,
    };

    pub const KITCHEN_READ: Requirement = Requirement {
        roles: STAFF,
        area: None,
        mutating: false,
    };

    /// Catalogue maintenance and stock adjustments.
    pub const CATALOGUE_WRITE: Requirement = Requirement {
        roles: AUTHORISERS,
        area: None,
        mutating: true,
    };

    /// Daily KPIs.
    pub const REPORTS: Requirement = Requirement {
        roles: REGISTER,
        area: Some(Area::Reports),
        mutating: false,
    };

    /// Issuing QR credentials.
    pub const ISSUE_CREDENTIALS: Requirement = Requirement {
        roles: AUTHORISERS,
        area: None,
        mutating: true,
    };

    /// Provisioning principals.
    pub const ADMIN: Requirement = Requirement {
        roles: ADMINS,
        area: None,
        mutating: true,
    };
}

/// Checks a principal against a requirement.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use sgir_core::permissions::{authorize, Requirement};
/// use sgir_core::types::{Area, Principal, Role};
///
/// let cook = Principal {
///     id: 1, username: "cook".into(), display_name: "Cook".into(), role: Role::Cook,
///     active: true, password_hash: None, pin_hash: None, secondary_pin_hash: None,
///     areas: vec![Area::Kitchen], last_qr_issued: None, created_at: Utc::now(),
/// };
/// assert!(authorize(&cook, &Requirement::KITCHEN_WRITE).is_ok());
/// assert!(authorize(&cook, &Requirement::CASH_WRITE).is_err());
/// ```
pub fn authorize(principal: &Principal, req: &Requirement) -> CoreResult<()> {
    if !principal.active {
        return Err(CoreError::AccountDisabled);
    }
    if !req.roles.contains(&principal.role) {
        return Err(CoreError::forbidden(format!(
            "role {} is not allowed",
            principal.role
        )));
    }
    if let Some(area) = req.area {
        if principal.role != Role::Customer && !principal.has_area(area) {
            return Err(CoreError::forbidden(format!("area {} is required", area)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn principal(role: Role, areas: Vec<Area>) -> Principal {
        Principal {
            id: 1,
            username: "u".to_string(),
            display_name: "U".to_string(),
            role,
            active: true,
            password_hash: None,
            pin_hash: None,
            secondary_pin_hash: None,
            areas,
            last_qr_issued: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_set() {
        let waiter = principal(Role::Waiter, vec![Area::Waiter]);
        assert!(authorize(&waiter, &Requirement::ORDER_WRITE).is_ok());
        assert!(matches!(
            authorize(&waiter, &Requirement::CASH_WRITE),
            Err(CoreError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_area_required_for_staff() {
        let cashier_without_cash = principal(Role::Cashier, vec![Area::Waiter]);
        assert!(authorize(&cashier_without_cash, &Requirement::CASH_WRITE).is_err());
        let cashier = principal(Role::Cashier, vec![Area::Cash]);
        assert!(authorize(&cashier, &Requirement::CASH_WRITE).is_ok());
    }

    #[test]
    fn test_managers_hold_every_area() {
        let manager = principal(Role::Manager, vec![]);
        assert!(authorize(&manager, &Requirement::CASH_WRITE).is_ok());
        assert!(authorize(&manager, &Requirement::KITCHEN_WRITE).is_ok());
        assert!(authorize(&manager, &Requirement::REPORTS).is_ok());
        assert!(authorize(&manager, &Requirement::ADMIN).is_err());
    }

    #[test]
    fn test_customer_checked_by_role_only() {
        let customer = principal(Role::Customer, vec![]);
        assert!(authorize(&customer, &Requirement::ORDER_WRITE).is_ok());
        assert!(authorize(&customer, &Requirement::ORDER_STEP).is_err());
    }

    #[test]
    fn test_inactive_principal() {
        let mut admin = principal(Role::Admin, vec![]);
        admin.active = false;
        assert!(matches!(
            authorize(&admin, &Requirement::READ_ANY),
            Err(CoreError::AccountDisabled)
        ));
    }
}
