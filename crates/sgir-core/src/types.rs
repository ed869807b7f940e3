//! # Domain Types
//!
//! Core domain types used throughout SGIR.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │     Table       │◄──│  TableAccount   │◄──│     Order       │        │
//! │  │  number (key)   │   │  status         │   │  state          │        │
//! │  │  status         │   │  totals         │   │  payment_state  │        │
//! │  │  combined_with  │   └─────────────────┘   │  items[]        │        │
//! │  └─────────────────┘                         └────────┬────────┘        │
//! │                                                       │                 │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌────────▼────────┐        │
//! │  │    Supply       │◄──│  Recipe         │──►│    Product      │        │
//! │  │  stock (Qty)    │   │  items[]        │   │  stock (int)    │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │     Shift       │◄──│  Transaction    │──►│  PaymentSplit   │        │
//! │  │  per-method Σ   │   │  invoice_no     │   └─────────────────┘        │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Tables are keyed by their business `number`. Every other entity carries a
//! database-assigned integer `id`.
//!
//! ## Wire Enumerations
//! Every enum serialises (JSON and SQL) as its lower snake_case name, e.g.
//! `OrderState::InPreparation` ↔ `"in_preparation"`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, Percent, Qty};

// =============================================================================
// Wire Enum Helper
// =============================================================================

/// Declares a wire-level enum with serde, ts-rs and (optionally) sqlx derives,
/// plus `as_str`, `Display` and `FromStr` over the same snake_case names.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
        #[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
        #[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
        #[ts(export)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok($name::$variant), )+
                    _ => Err(ValidationError::NotAllowed {
                        field: stringify!($name).to_string(),
                        allowed: $name::ALL.iter().map(|v| v.as_str().to_string()).collect(),
                    }),
                }
            }
        }
    };
}

// =============================================================================
// Identity
// =============================================================================

wire_enum! {
    /// Principal role. Manager and admin are supersets of every area.
    Role {
        Customer => "customer",
        Waiter => "waiter",
        Cook => "cook",
        Cashier => "cashier",
        Manager => "manager",
        Admin => "admin",
    }
}

impl Role {
    /// Roles that may authorise sensitive reversals with a secondary PIN.
    pub const fn is_authoriser(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }

    /// Roles conditioned by the shift-liveness gate.
    pub const fn requires_open_work_day(&self) -> bool {
        matches!(self, Role::Waiter | Role::Cook)
    }

    /// Opaque post-login hint for the caller's UI.
    pub const fn landing(&self) -> &'static str {
        match self {
            Role::Customer => "/menu",
            Role::Waiter => "/tables",
            Role::Cook => "/kanban",
            Role::Cashier => "/cash",
            Role::Manager | Role::Admin => "/dashboard",
        }
    }

    /// Areas granted when none are provided at provisioning time.
    pub fn default_areas(&self) -> Vec<Area> {
        match self {
            Role::Customer => vec![],
            Role::Waiter => vec![Area::Waiter],
            Role::Cook => vec![Area::Kitchen],
            Role::Cashier => vec![Area::Cash, Area::Waiter],
            Role::Manager | Role::Admin => Area::ALL.to_vec(),
        }
    }
}

wire_enum! {
    /// Area permission tag.
    Area {
        Waiter => "waiter",
        Kitchen => "kitchen",
        Cash => "cash",
        Reports => "reports",
    }
}

/// An authenticated identity.
///
/// Credential hashes never leave the server: they are skipped on serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub active: bool,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing, default)]
    pub pin_hash: Option<String>,
    #[serde(skip_serializing, default)]
    pub secondary_pin_hash: Option<String>,
    pub areas: Vec<Area>,
    pub last_qr_issued: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn has_area(&self, area: Area) -> bool {
        self.role.is_authoriser() || self.areas.contains(&area)
    }
}

wire_enum! {
    QrTokenState {
        Issued => "issued",
        Consumed => "consumed",
        Invalidated => "invalidated",
    }
}

/// One-shot QR login credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QrToken {
    pub token: String,
    pub principal_id: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub issuer_address: Option<String>,
    pub state: QrTokenState,
    pub consumed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Tables
// =============================================================================

wire_enum! {
    TableStatus {
        Available => "available",
        Reserved => "reserved",
        Occupied => "occupied",
        /// Part of the seating has paid; the rest is being settled.
        Settling => "settling",
    }
}

/// A physical table on the floor map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Table {
    pub number: i64,
    pub capacity: i64,
    pub status: TableStatus,
    pub combined: bool,
    /// Sorted table numbers of the whole group, this table included.
    pub combined_with: Vec<i64>,
    pub combined_capacity: i64,
    pub map_x: i64,
    pub map_y: i64,
}

impl Table {
    /// Seats available to one order placed on this table.
    pub fn effective_capacity(&self) -> i64 {
        if self.combined {
            self.combined_capacity
        } else {
            self.capacity
        }
    }
}

wire_enum! {
    AccountStatus {
        Open => "open",
        Closed => "closed",
        InDebt => "in_debt",
    }
}

/// The financial aggregate of one continuous seating.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TableAccount {
    pub id: i64,
    pub table_number: i64,
    pub status: AccountStatus,
    pub total_accumulated: Money,
    pub total_paid: Money,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub opened_by: Option<i64>,
    pub closed_by: Option<i64>,
    pub debt_authorized: bool,
    pub notes: String,
}

wire_enum! {
    ReservationState {
        Confirmed => "confirmed",
        Seated => "seated",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Reservation {
    pub id: i64,
    pub table_number: i64,
    pub customer_name: String,
    pub guest_count: i64,
    pub reserved_for: DateTime<Utc>,
    pub duration_minutes: i64,
    pub state: ReservationState,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Orders
// =============================================================================

wire_enum! {
    OrderState {
        Created => "created",
        Confirmed => "confirmed",
        InPreparation => "in_preparation",
        Ready => "ready",
        Delivered => "delivered",
        Cancelled => "cancelled",
        Closed => "closed",
    }
}

wire_enum! {
    /// Visible board column for a not-yet-paid order.
    KanbanLane {
        ToPrepare => "to_prepare",
        Preparing => "preparing",
        Ready => "ready",
        Delivered => "delivered",
    }
}

wire_enum! {
    PaymentState {
        Pending => "pending",
        Partial => "partial",
        Paid => "paid",
        Cancelled => "cancelled",
    }
}

wire_enum! {
    PaymentMethod {
        Cash => "cash",
        Card => "card",
        Qr => "qr",
        Mobile => "mobile",
        /// Only valid on a transaction that carries split rows.
        Mixed => "mixed",
    }
}

/// An order placed for one table account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: i64,
    pub table_number: i64,
    pub account_id: i64,
    pub state: OrderState,
    pub waiter_id: Option<i64>,
    pub cashier_id: Option<i64>,
    pub guest_count: i64,
    pub subtotal: Money,
    pub discount: Money,
    pub discount_pct: Percent,
    pub tip: Money,
    pub total_final: Money,
    pub paid_amount: Money,
    pub payment_method: Option<PaymentMethod>,
    pub payment_state: PaymentState,
    pub opened_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub notes_cashier: String,
    pub modified: bool,
    pub modified_by: Option<i64>,
    pub reassigned: bool,
}

impl Order {
    /// Amount still owed on this order.
    pub fn balance(&self) -> Money {
        self.total_final - self.paid_amount
    }

    pub fn is_paid(&self) -> bool {
        self.payment_state == PaymentState::Paid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub qty_total: i64,
    pub qty_paid: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl OrderItem {
    pub fn qty_unpaid(&self) -> i64 {
        self.qty_total - self.qty_paid
    }
}

/// An order together with its lines, as returned by `GET /orders/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Inventory
// =============================================================================

/// A sellable product. Stock is an integer count.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub price: Money,
    pub available: bool,
    pub active: bool,
    pub tracks_inventory: bool,
    pub stock_on_hand: i64,
    pub stock_min: i64,
    pub is_manufactured: bool,
    pub image: Option<String>,
}

wire_enum! {
    SupplyUnit {
        Kg => "kg",
        G => "g",
        L => "l",
        Ml => "ml",
        Unit => "unit",
        Dozen => "dozen",
        Pack => "pack",
    }
}

/// An ingredient. Stock is measured in thousandths of `unit`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supply {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub unit: SupplyUnit,
    pub stock_on_hand: Qty,
    pub stock_min: Qty,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Recipe {
    pub id: i64,
    pub product_id: i64,
    pub version: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecipeItem {
    pub id: i64,
    pub recipe_id: i64,
    pub supply_id: i64,
    pub qty_per_unit: Qty,
    pub loss_pct: Percent,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub items: Vec<RecipeItem>,
}

wire_enum! {
    ProductionState {
        Registered => "registered",
        Applied => "applied",
        Voided => "voided",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Production {
    pub id: i64,
    pub product_id: i64,
    pub recipe_id: i64,
    pub qty_produced: i64,
    pub lot: Option<String>,
    pub state: ProductionState,
    pub notes: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub applied_by: Option<i64>,
    pub applied_at: Option<DateTime<Utc>>,
    pub voided_by: Option<i64>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub secondary_pin_validated: bool,
}

/// What one supply looked like around a production apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductionSnapshot {
    pub id: i64,
    pub production_id: i64,
    pub supply_id: i64,
    pub qty_consumed: Qty,
    pub unit: SupplyUnit,
    pub stock_before: Qty,
    pub stock_after: Qty,
}

wire_enum! {
    StockTarget {
        Product => "product",
        Supply => "supply",
    }
}

wire_enum! {
    MovementKind {
        Sale => "sale",
        SaleReturn => "sale_return",
        ProductionConsume => "production_consume",
        ProductionOutput => "production_output",
        /// Reversal of a production (supplies back, product out).
        ProductionVoid => "production_void",
        Adjustment => "adjustment",
    }
}

/// One signed change to a product or supply stock level.
///
/// `delta` and `stock_after` are units for products and thousandths for
/// supplies.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: i64,
    pub target: StockTarget,
    pub target_id: i64,
    pub kind: MovementKind,
    pub delta: i64,
    pub stock_after: i64,
    pub order_id: Option<i64>,
    pub production_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

wire_enum! {
    AlertKind {
        Low => "low",
        Out => "out",
    }
}

wire_enum! {
    AlertState {
        Active => "active",
        Resolved => "resolved",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAlert {
    pub id: i64,
    pub target: StockTarget,
    pub target_id: i64,
    pub kind: AlertKind,
    pub observed_stock: i64,
    pub state: AlertState,
    pub resolved_by: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cash Register
// =============================================================================

wire_enum! {
    ShiftTurn {
        Morning => "morning",
        Afternoon => "afternoon",
        Full => "full",
    }
}

wire_enum! {
    ShiftState {
        Open => "open",
        Closed => "closed",
    }
}

/// A cashier's register period.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: i64,
    pub cashier_id: i64,
    pub date: NaiveDate,
    pub turn: ShiftTurn,
    pub state: ShiftState,
    pub cash_start: Money,
    pub cash_expected: Money,
    pub cash_real: Option<Money>,
    pub diff: Option<Money>,
    pub total_cash: Money,
    pub total_card: Money,
    pub total_qr: Money,
    pub total_mobile: Money,
    pub total_sales: Money,
    pub total_discounts: Money,
    pub total_tips: Money,
    pub order_count: i64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub notes: String,
}

wire_enum! {
    TransactionState {
        Processed => "processed",
        Voided => "voided",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: i64,
    pub order_id: i64,
    pub cashier_id: i64,
    pub amount: Money,
    pub method: PaymentMethod,
    pub state: TransactionState,
    pub invoice_no: String,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentSplit {
    pub id: i64,
    pub transaction_id: i64,
    pub method: PaymentMethod,
    pub amount: Money,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Refund {
    pub id: i64,
    pub order_id: i64,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reason: String,
    pub created_by: i64,
    pub authorized_by: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// History
// =============================================================================

wire_enum! {
    HistoryKind {
        AddItem => "add_item",
        RemoveItem => "remove_item",
        ModifyQty => "modify_qty",
        ApplyDiscount => "apply_discount",
        AddTip => "add_tip",
        ReassignTable => "reassign_table",
        StateChange => "state_change",
        Payment => "payment",
        /// Production register / apply / void.
        ProductionState => "production_state",
    }
}

/// Append-only audit record. `before`/`after` carry changed fields only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HistoryEntry {
    pub id: i64,
    pub order_id: Option<i64>,
    pub production_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub kind: HistoryKind,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(OrderState::InPreparation.as_str(), "in_preparation");
        assert_eq!(
            serde_json::to_string(&OrderState::InPreparation).unwrap(),
            "\"in_preparation\""
        );
        assert_eq!("in_debt".parse::<AccountStatus>().unwrap(), AccountStatus::InDebt);
        assert_eq!(MovementKind::ProductionVoid.to_string(), "production_void");
        assert!("bogus".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_default_areas() {
        assert_eq!(Role::Waiter.default_areas(), vec![Area::Waiter]);
        assert_eq!(Role::Cook.default_areas(), vec![Area::Kitchen]);
        assert_eq!(Role::Cashier.default_areas(), vec![Area::Cash, Area::Waiter]);
        assert_eq!(Role::Admin.default_areas().len(), Area::ALL.len());
    }

    #[test]
    fn test_effective_capacity() {
        let mut table = Table {
            number: 1,
            capacity: 4,
            status: TableStatus::Available,
            combined: false,
            combined_with: vec![],
            combined_capacity: 0,
            map_x: 0,
            map_y: 0,
        };
        assert_eq!(table.effective_capacity(), 4);
        table.combined = true;
        table.combined_with = vec![1, 2];
        table.combined_capacity = 6;
        assert_eq!(table.effective_capacity(), 6);
    }

    #[test]
    fn test_hashes_not_serialized() {
        let principal = Principal {
            id: 1,
            username: "ana".to_string(),
            display_name: "Ana".to_string(),
            role: Role::Cashier,
            active: true,
            password_hash: Some("secret-hash".to_string()),
            pin_hash: Some("pin-hash".to_string()),
            secondary_pin_hash: None,
            areas: vec![Area::Cash],
            last_qr_issued: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&principal).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("pin-hash"));
    }
}
