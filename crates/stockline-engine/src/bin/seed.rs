//! # Seed Data Generator
//!
//! Populates a store with a deterministic demo catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default store with the configured database
//! cargo run -p stockline-engine --bin seed
//!
//! # Custom store and config file
//! cargo run -p stockline-engine --bin seed -- --store store-downtown --config ./stockline.toml
//!
//! # Specify database path
//! cargo run -p stockline-engine --bin seed -- --db ./data/stockline.db
//! ```
//!
//! ## Generated Products
//! One product per (category, item) pair. SKU `{CATEGORY}-{NNN}`, price
//! and stock derived from the index so reruns on a fresh database give
//! the same catalog. Every fifth product starts below its minimum level.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stockline_core::{Identity, NewProduct};
use stockline_engine::{ErrorKind, Stockline, StocklineConfig};

/// Product categories for realistic demo data.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEV",
        &[
            "Sparkling Water",
            "Cola",
            "Lemon Soda",
            "Orange Juice",
            "Iced Tea",
            "Cold Brew Coffee",
            "Energy Drink",
            "Coconut Water",
        ],
    ),
    (
        "SNK",
        &[
            "Salted Crisps",
            "Tortilla Chips",
            "Pretzels",
            "Trail Mix",
            "Chocolate Bar",
            "Gummy Bears",
            "Oat Cookies",
            "Rice Crackers",
        ],
    ),
    (
        "DRY",
        &[
            "Whole Milk",
            "Oat Milk",
            "Greek Yogurt",
            "Cheddar Cheese",
            "Butter",
            "Eggs Dozen",
        ],
    ),
    (
        "GRO",
        &[
            "White Bread",
            "Spaghetti",
            "Basmati Rice",
            "Canned Tomatoes",
            "Peanut Butter",
            "Honey",
            "Rolled Oats",
            "Sea Salt",
        ],
    ),
];

struct Args {
    store_id: String,
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = match parse_args()? {
        Some(args) => args,
        None => return Ok(()),
    };

    let mut config = StocklineConfig::load(args.config_path.as_deref())
        .context("failed to load configuration")?;
    if let Some(path) = args.db_path {
        config.database.path = path;
    }

    println!("Stockline Seed Data Generator");
    println!("=============================");
    println!("Database: {}", config.database.path.display());
    println!("Store:    {}", args.store_id);
    println!();

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let engine = Stockline::open(config).await.context("failed to open database")?;
    let admin = Identity::admin("seed", &args.store_id).with_display_name("Seed");

    let existing = engine
        .catalog()
        .list_products(&admin, &args.store_id, true)
        .await?;
    if !existing.is_empty() {
        println!("Store already has {} products, skipping.", existing.len());
        println!("Delete the database file to regenerate.");
        engine.shutdown().await;
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut created = 0usize;
    let mut seed = 0usize;

    for (category, names) in CATEGORIES {
        for name in names.iter() {
            seed += 1;
            let product = demo_product(&args.store_id, category, name, seed);
            let sku = product.sku.clone();

            match engine.catalog().create_product(&admin, product).await {
                Ok(_) => created += 1,
                Err(e) if e.kind() == ErrorKind::InvalidInput => {
                    warn!(sku = %sku, error = %e, "Skipping product");
                }
                Err(e) => {
                    engine.shutdown().await;
                    return Err(e).with_context(|| format!("failed to insert {}", sku));
                }
            }
        }
    }

    let low = engine.catalog().low_stock(&admin, &args.store_id).await?;
    info!(created, low_stock = low.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Seed complete");

    println!("Created {} products in {:?}", created, start.elapsed());
    println!("{} start at or below their minimum level", low.len());

    engine.shutdown().await;
    Ok(())
}

/// Builds one demo product. Everything derives from `seed`.
fn demo_product(store_id: &str, category: &str, name: &str, seed: usize) -> NewProduct {
    let price_cents = 99 + ((seed * 137) % 1_900) as i64;
    let min_stock_level = 5;
    let initial_stock = if seed % 5 == 0 {
        (seed % 4) as i64
    } else {
        10 + ((seed * 31) % 90) as i64
    };

    NewProduct {
        store_id: store_id.to_string(),
        sku: format!("{}-{:03}", category, seed),
        name: name.to_string(),
        price_cents,
        initial_stock,
        min_stock_level,
    }
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        store_id: String::from("store-1"),
        config_path: None,
        db_path: None,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--store" | "-s" => {
                args.store_id = iter.next().context("--store needs a value")?;
            }
            "--config" | "-c" => {
                args.config_path = Some(PathBuf::from(iter.next().context("--config needs a value")?));
            }
            "--db" | "-d" => {
                args.db_path = Some(PathBuf::from(iter.next().context("--db needs a value")?));
            }
            "--help" | "-h" => {
                println!("Stockline Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --store <ID>     Store to seed (default: store-1)");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file, overrides the config");
                println!("  -h, --help           Show this help message");
                return Ok(None);
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    Ok(Some(args))
}

/// Log level from `RUST_LOG`, default `info` with sqlx quietened.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockline=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_products_are_valid_and_deterministic() {
        let a = demo_product("s", "BEV", "Cola", 7);
        let b = demo_product("s", "BEV", "Cola", 7);
        assert_eq!(a.sku, "BEV-007");
        assert_eq!(a.price_cents, b.price_cents);
        assert!(a.price_cents >= 99);
        assert!(a.initial_stock >= 10);

        let low = demo_product("s", "SNK", "Pretzels", 10);
        assert!(low.initial_stock < low.min_stock_level);
    }
}
