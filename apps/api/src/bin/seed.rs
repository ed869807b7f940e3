//! # Seed Data Generator
//!
//! Populates an empty database with a working restaurant for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p sgir-api --bin seed
//! cargo run -p sgir-api --bin seed -- --db ./data/sgir.db
//! ```
//!
//! ## Generated Data
//! - Principals: admin, manager (both with secondary PIN 9999), cashier
//!   (PIN 1234), waiter, cook. Every password is `password123`.
//! - Tables 1..=8, capacities 2 to 6.
//! - Products: resale drinks plus a manufactured empanada.
//! - Supplies and the empanada recipe.

use std::env;
use std::sync::Arc;

use anyhow::Result;

use sgir_api::gate::SystemClock;
use sgir_api::services::identity::{self, ProvisionRequest};
use sgir_api::services::inventory::{
    self, NewProductRequest, NewSupplyRequest, RecipeLineRequest, RecipeRequest,
};
use sgir_api::services::tables::{self, NewTableRequest};
use sgir_api::{ApiConfig, AppState};
use sgir_core::{Money, Percent, Qty, Role, SupplyUnit};
use sgir_db::{Database, DbConfig, Repositories};

const PASSWORD: &str = "password123";

/// (username, display name, role, PIN, secondary PIN)
const PRINCIPALS: &[(&str, &str, Role, Option<&str>, Option<&str>)] = &[
    ("admin", "Administrator", Role::Admin, None, Some("9999")),
    ("manager", "Floor Manager", Role::Manager, None, Some("9999")),
    ("cashier", "Front Cashier", Role::Cashier, Some("1234"), None),
    ("waiter", "Ana Waiter", Role::Waiter, None, None),
    ("cook", "Luis Cook", Role::Cook, None, None),
];

/// (number, capacity, map x, map y)
const TABLES: &[(i64, i64, i64, i64)] = &[
    (1, 2, 0, 0),
    (2, 2, 1, 0),
    (3, 4, 2, 0),
    (4, 4, 0, 1),
    (5, 4, 1, 1),
    (6, 6, 2, 1),
    (7, 6, 0, 2),
    (8, 4, 1, 2),
];

/// (name, category, price in cents, stock, minimum)
const DRINKS: &[(&str, &str, i64, i64, i64)] = &[
    ("Cola 350ml", "drinks", 250, 48, 12),
    ("Sparkling Water", "drinks", 200, 36, 12),
    ("Lemonade", "drinks", 300, 24, 6),
    ("Coffee", "drinks", 180, 100, 10),
];

/// (name, unit, stock in thousandths, minimum in thousandths)
const SUPPLIES: &[(&str, SupplyUnit, i64, i64)] = &[
    ("Flour", SupplyUnit::Kg, 10_000, 2_000),
    ("Ground Beef", SupplyUnit::Kg, 5_000, 1_000),
    ("Onion", SupplyUnit::Kg, 3_000, 500),
    ("Egg", SupplyUnit::Unit, 60_000, 12_000),
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./sgir.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("SGIR Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./sgir.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("SGIR Seed Data Generator");
    println!("========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = {
        let mut unit = db.read().await?;
        unit.principals().count().await?
    };
    if existing > 0 {
        println!("⚠ Database already has {} principals", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let config = ApiConfig::load()?;
    let state = AppState::new(config, db, Arc::new(SystemClock))?;

    for (username, display_name, role, pin, secondary_pin) in PRINCIPALS {
        let req = ProvisionRequest {
            username: username.to_string(),
            display_name: display_name.to_string(),
            role: *role,
            password: Some(PASSWORD.to_string()),
            pin: pin.map(str::to_string),
            secondary_pin: secondary_pin.map(str::to_string),
            areas: Vec::new(),
        };
        identity::provision(&state, &req).await?;
    }
    println!("✓ {} principals", PRINCIPALS.len());

    for (number, capacity, map_x, map_y) in TABLES {
        let req = NewTableRequest {
            number: *number,
            capacity: *capacity,
            map_x: *map_x,
            map_y: *map_y,
        };
        tables::create_table(&state, &req).await?;
    }
    println!("✓ {} tables", TABLES.len());

    for (name, category, price, stock, min) in DRINKS {
        inventory::create_product(&state, &product(name, category, *price, *stock, *min, false)).await?;
    }
    let empanada = inventory::create_product(&state, &product("Beef Empanada", "kitchen", 450, 0, 5, true)).await?;
    println!("✓ {} products", DRINKS.len() + 1);

    let mut supply_ids = Vec::with_capacity(SUPPLIES.len());
    for (name, unit, stock, min) in SUPPLIES {
        let req = NewSupplyRequest {
            name: name.to_string(),
            category: Some("pantry".to_string()),
            unit: *unit,
            stock_on_hand: Qty::from_milli(*stock),
            stock_min: Qty::from_milli(*min),
        };
        supply_ids.push(inventory::create_supply(&state, &req).await?.id);
    }
    println!("✓ {} supplies", SUPPLIES.len());

    // Per empanada: 80 g flour, 60 g beef, 20 g onion, half an egg
    let per_unit = [80, 60, 20, 500];
    let recipe = RecipeRequest {
        product_id: empanada.id,
        items: supply_ids
            .iter()
            .zip(per_unit)
            .map(|(&supply_id, milli)| RecipeLineRequest {
                supply_id,
                qty_per_unit: Qty::from_milli(milli),
                loss_pct: if milli == 500 { Percent::default() } else { Percent::from_bps(500) },
            })
            .collect(),
    };
    inventory::create_recipe(&state, &recipe).await?;
    println!("✓ Recipe for {}", empanada.name);

    println!();
    println!("Done. Log in as admin / {PASSWORD}; cashier PIN 1234; secondary PIN 9999.");
    Ok(())
}

fn product(name: &str, category: &str, price: i64, stock: i64, min: i64, manufactured: bool) -> NewProductRequest {
    NewProductRequest {
        name: name.to_string(),
        category: Some(category.to_string()),
        price: Money::from_cents(price),
        tracks_inventory: true,
        stock_on_hand: stock,
        stock_min: min,
        is_manufactured: manufactured,
        image: None,
    }
}
