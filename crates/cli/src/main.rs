//! Bazaar CLI - Browse the catalog, keep a wishlist and cart, place orders.
//!
//! # Usage
//!
//! ```bash
//! # List the catalog with wishlist/cart membership
//! bazaar catalog
//!
//! # Show one product and its seller
//! bazaar product 64f0c2a1
//!
//! # Toggle a product on the wishlist
//! bazaar wishlist toggle 64f0c2a1
//!
//! # Add three units to the cart, then place the order
//! bazaar cart add 64f0c2a1 --qty 3
//! bazaar cart show
//! bazaar order
//! ```
//!
//! Configuration comes from the environment (see `bazaar_client::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use bazaar_client::{ClientConfig, ClientError};
use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the catalog
    Catalog,
    /// Show a product and its seller
    Product {
        /// Product ID
        id: String,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place an order for the current cart
    Order,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Add a product to the wishlist
    Add { id: String },
    /// Remove a product from the wishlist
    Remove { id: String },
    /// Add the product if absent, remove it if present
    Toggle { id: String },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart and its total
    Show,
    /// Add a product to the cart
    Add {
        id: String,

        /// Units to add (at least 1)
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        qty: u32,
    },
    /// Remove a product from the cart
    Remove { id: String },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
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
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = match ClientConfig::from_env().map_err(ClientError::from) {
        Ok(config) => config,
        Err(e) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("{} ({e})", e.user_message());
            }
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bazaar_client=info,bazaar_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        e.report();
        #[allow(clippy::print_stderr)]
        {
            eprintln!("{}", e.user_message());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CommandError> {
    let ctx = commands::Context::from_config(&config)?;

    match cli.command {
        Commands::Catalog => commands::catalog::list(&ctx).await?,
        Commands::Product { id } => commands::catalog::show(&ctx, &id.into()).await?,
        Commands::Wishlist { action } => match action {
            WishlistAction::Add { id } => commands::membership::wishlist_add(&ctx, &id.into()).await?,
            WishlistAction::Remove { id } => {
                commands::membership::wishlist_remove(&ctx, &id.into()).await?;
            }
            WishlistAction::Toggle { id } => {
                commands::membership::wishlist_toggle(&ctx, &id.into()).await?;
            }
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx).await?,
            CartAction::Add { id, qty } => {
                commands::membership::cart_add(&ctx, &id.into(), qty).await?;
            }
            CartAction::Remove { id } => commands::membership::cart_remove(&ctx, &id.into()).await?,
        },
        Commands::Order => commands::cart::place_order(&ctx).await?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_add_quantity_defaults_to_one() {
        let cli = Cli::try_parse_from(["bazaar", "cart", "add", "p1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cart {
                action: CartAction::Add { qty: 1, .. }
            }
        ));
    }

    #[test]
    fn test_cart_add_rejects_zero_quantity() {
        assert!(Cli::try_parse_from(["bazaar", "cart", "add", "p1", "--qty", "0"]).is_err());

        let cli = Cli::try_parse_from(["bazaar", "cart", "add", "p1", "--qty", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cart {
                action: CartAction::Add { qty: 3, .. }
            }
        ));
    }
}
