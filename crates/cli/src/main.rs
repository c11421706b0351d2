//! ShopEZ CLI - terminal storefront.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! shopez products
//! shopez products --category electronics
//! shopez categories
//! shopez product 1
//!
//! # Shop interactively (sign in, add to cart, watch it sync live)
//! shopez shop
//!
//! # Shop as a guest without creating an account
//! shopez shop --guest
//!
//! # Shop without any network, cart held in memory
//! shopez shop --offline
//! ```
//!
//! # Commands
//!
//! - `products` - List catalog products, optionally by category
//! - `categories` - List catalog categories
//! - `product` - Show one product in detail
//! - `shop` - Interactive shopping session with a live-syncing cart

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod render;

#[derive(Parser)]
#[command(name = "shopez")]
#[command(author, version, about = "ShopEZ terminal storefront")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog products
    Products {
        /// Only list products in this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// List catalog categories
    Categories,
    /// Show one product in detail
    Product {
        /// Numeric product id
        id: u32,
    },
    /// Start an interactive shopping session
    Shop {
        /// Sign in as an anonymous guest instead of an account
        #[arg(long)]
        guest: bool,

        /// Keep the cart in memory and skip the network entirely
        #[arg(long)]
        offline: bool,
    },
}

/// Initialize Sentry error tracking and return a guard that must be kept
/// alive for the duration of the process.
fn init_sentry(dsn: Option<&str>) -> Option<sentry::ClientInitGuard> {
    let dsn = dsn?;
    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load .env before reading SENTRY_DSN (must precede tracing init)
    let _ = dotenvy::dotenv();
    let sentry_dsn = std::env::var("SENTRY_DSN").ok();
    let _sentry_guard = init_sentry(sentry_dsn.as_deref());

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "shopez=info,shopez_cart=info,shopez_catalog=info,shopez_firebase=info".into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Products { category } => {
            commands::catalog::products(category.as_deref()).await?;
        }
        Commands::Categories => commands::catalog::categories().await?,
        Commands::Product { id } => commands::catalog::product(id).await?,
        Commands::Shop { guest, offline } => commands::shop::run(guest, offline).await?,
    }
    Ok(())
}
