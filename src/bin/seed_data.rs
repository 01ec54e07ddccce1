//! Seed data script - populates the database with an admin and demo products
//!
//! Run with: cargo run --bin seed-data -- --admin-email admin@example.com --admin-password ...
//!
//! Re-running is safe: an existing admin account is promoted instead of
//! re-registered, and products are only created when the catalog is empty.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use storefront_api::{
    config, db, events,
    services::{
        catalog::{CreateProductInput, ProductQuery},
        users::RegisterInput,
        CatalogService, PageLimits, UserService,
    },
};

#[derive(Parser)]
#[command(name = "seed-data", about = "Seed the storefront database with demo data", version)]
struct Cli {
    #[arg(long, help = "Email of the admin account")]
    admin_email: String,
    #[arg(long, help = "Password used if the admin is created")]
    admin_password: String,
    #[arg(long, default_value = "Store Admin", help = "Display name of the admin")]
    admin_name: String,
    #[arg(long, help = "Skip creating demo products")]
    skip_products: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!("=== Storefront Seed Data ===");
    let pool = Arc::new(db::establish_connection_from_app_config(&cfg).await?);
    db::run_migrations(&pool).await?;

    let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(event_sender);
    let processor = tokio::spawn(events::process_events(event_rx));

    let users = UserService::new(pool.clone(), event_sender.clone());
    let admin = match users.find_by_email(&cli.admin_email).await? {
        Some(existing) => existing,
        None => {
            users
                .register(RegisterInput {
                    name: cli.admin_name.clone(),
                    email: cli.admin_email.clone(),
                    password: cli.admin_password.clone(),
                })
                .await?
        }
    };
    let admin = users.promote_to_admin(admin.id).await?;
    info!("Admin ready: {} ({})", admin.email, admin.id);

    if !cli.skip_products {
        let catalog = CatalogService::new(pool.clone(), event_sender.clone(), PageLimits::default());
        let existing = catalog.list_products(ProductQuery::default()).await?;
        if existing.total > 0 {
            info!("Catalog already has {} products; skipping", existing.total);
        } else {
            let mut created = 0;
            for input in demo_products() {
                let product = catalog.create_product(input).await?;
                info!("  {} ({} left)", product.title, product.stocks_left);
                created += 1;
            }
            info!("Created {} products", created);
        }
    }

    drop(users);
    drop(event_sender);
    processor.await.context("event processor panicked")?;

    info!("=== Seed Data Complete ===");
    info!("Try: curl http://{}:{}/api/products", cfg.host, cfg.port);
    Ok(())
}

fn product(
    title: &str,
    category: &str,
    original: Decimal,
    discounted: Decimal,
    stocks_left: i32,
) -> CreateProductInput {
    CreateProductInput {
        title: title.to_string(),
        description: format!("{} from the demo catalog", title),
        category: category.to_string(),
        original_price: original,
        discounted_price: Some(discounted),
        image_url: None,
        stocks_left,
    }
}

fn demo_products() -> Vec<CreateProductInput> {
    vec![
        product("Desk Lamp", "home", dec!(35.00), dec!(25.00), 12),
        product("Ceramic Mug", "home", dec!(12.00), dec!(12.00), 40),
        product("Wireless Mouse", "electronics", dec!(29.99), dec!(24.99), 25),
        product("Mechanical Keyboard", "electronics", dec!(119.00), dec!(99.00), 8),
        product("USB-C Hub", "electronics", dec!(49.00), dec!(39.00), 15),
        product("Canvas Tote", "accessories", dec!(18.00), dec!(15.00), 30),
        product("Running Cap", "apparel", dec!(22.00), dec!(22.00), 20),
        product("Merino Socks", "apparel", dec!(16.00), dec!(12.50), 5),
    ]
}
