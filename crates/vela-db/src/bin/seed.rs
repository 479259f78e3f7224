//! # Seed Data Generator
//!
//! Populates the database with development products, per-store variants and
//! customer accounts.
//!
//! ## Usage
//! ```bash
//! # Default: ./vela_dev.db, 2 stores
//! cargo run -p vela-db --bin seed
//!
//! # Custom database path and store count
//! cargo run -p vela-db --bin seed -- --db ./data/vela.db --stores 3
//! ```
//!
//! ## Generated Data
//! - One BASE product per catalog entry (store_id NULL, aggregates variants)
//! - One variant per store, SKU `<BASE>-S<n>`, pointing at the base via
//!   `variant_of`
//! - Base quantity set to the sum of its variants
//! - Customer accounts: bank accounts for card tenders, e-wallets with a
//!   hashed PIN (PIN is `1234` for every seeded wallet)

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::env;
use uuid::Uuid;

use vela_core::{AccountType, CustomerAccount, Product};
use vela_db::{Database, DbConfig};

/// Catalog of (base SKU, name, unit price cents, per-variant stock, reorder level).
const CATALOG: &[(&str, &str, i64, i64, i64)] = &[
    ("COLA", "Cola 330ml", 250, 40, 10),
    ("WATER", "Still Water 500ml", 120, 60, 15),
    ("CHIPS", "Salted Chips", 180, 30, 8),
    ("CHOC", "Chocolate Bar", 220, 25, 8),
    ("BREAD", "White Bread Loaf", 310, 12, 4),
    ("MILK", "Whole Milk 1L", 290, 20, 6),
    ("COFFEE", "Ground Coffee 250g", 850, 10, 3),
    ("RICE", "Rice 1kg", 450, 15, 5),
    ("SOAP", "Hand Soap", 340, 18, 5),
    ("PASTA", "Penne 500g", 260, 22, 6),
];

/// Seeded customer accounts: (number, holder, type, balance cents).
const ACCOUNTS: &[(&str, &str, AccountType, i64)] = &[
    ("BANK-1001", "Ada Lovelace", AccountType::Bank, 50_000),
    ("BANK-1002", "Alan Turing", AccountType::Bank, 12_500),
    ("WALLET-2001", "Grace Hopper", AccountType::Ewallet, 20_000),
    ("WALLET-2002", "Edsger Dijkstra", AccountType::Ewallet, 500),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./vela_dev.db");
    let mut store_count: usize = 2;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--stores" | "-s" => {
                if i + 1 < args.len() {
                    store_count = args[i + 1].parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Vela POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./vela_dev.db)");
                println!("  -s, --stores <N>     Number of store variants per product (default: 2)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Vela POS Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!("Stores:   {}", store_count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    let mut generated = 0;

    for (base_sku, name, price_cents, per_store_qty, reorder_level) in CATALOG {
        let base = Product {
            id: Uuid::new_v4().to_string(),
            sku: base_sku.to_string(),
            name: name.to_string(),
            store_id: None,
            variant_of: None,
            price_cents: *price_cents,
            quantity: per_store_qty * store_count as i64,
            reorder_level: reorder_level * store_count as i64,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&base).await?;
        generated += 1;

        for store in 1..=store_count {
            let variant = Product {
                id: Uuid::new_v4().to_string(),
                sku: format!("{base_sku}-S{store}"),
                name: format!("{name} (store {store})"),
                store_id: Some(format!("s{store}")),
                variant_of: Some(base.id.clone()),
                price_cents: *price_cents,
                quantity: *per_store_qty,
                reorder_level: *reorder_level,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            db.products().insert(&variant).await?;
            generated += 1;
        }
    }

    println!("✓ Generated {} products", generated);

    for (number, holder, account_type, balance) in ACCOUNTS {
        let pin_hash = match account_type {
            AccountType::Ewallet => Some(hex::encode(Sha256::digest(b"1234"))),
            AccountType::Bank => None,
        };
        let account = CustomerAccount {
            id: Uuid::new_v4().to_string(),
            account_number: number.to_string(),
            holder_name: holder.to_string(),
            account_type: *account_type,
            balance_cents: *balance,
            pin_hash,
            created_at: now,
            updated_at: now,
        };
        db.accounts().insert(&account).await?;
    }

    println!("✓ Generated {} customer accounts (wallet PIN: 1234)", ACCOUNTS.len());
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
