//! Catalog listing and product detail.

use bazaar_client::ClientError;
use bazaar_client::remote::SellerName;
use bazaar_core::ProductId;

use super::{CommandError, Context};

/// Print the catalog with membership markers.
#[allow(clippy::print_stdout)]
pub async fn list(ctx: &Context) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.catalog.mount().await;

    if let Some(message) = ctx.catalog.error() {
        return Err(CommandError::Unavailable(message));
    }

    let cards = ctx.catalog.listing();
    tracing::debug!(count = cards.len(), "Listing catalog");

    for card in cards {
        let wishlist = if card.in_wishlist { '♥' } else { ' ' };
        let cart = if card.in_cart { '🛒' } else { ' ' };
        let stock = if card.product.available {
            format!("{} in stock", card.product.stock)
        } else {
            "unavailable".to_string()
        };
        println!(
            "{wishlist} {cart} {:<24} {:>10}  {:<30} {stock}",
            card.product.id,
            card.product.price.display(),
            card.product.name,
        );
    }
    Ok(())
}

/// Print one product with its seller.
#[allow(clippy::print_stdout)]
pub async fn show(ctx: &Context, id: &ProductId) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.catalog.load_memberships();

    let detail = ctx
        .catalog
        .load_detail(id)
        .await
        .map_err(ClientError::from)?;
    let product = &detail.product;

    println!("{}", product.name);
    println!("  id:          {}", product.id);
    println!("  price:       {}", product.price.display());
    println!("  stock:       {}", product.stock);
    println!("  available:   {}", product.available);
    if let Some(category) = &product.category {
        println!("  category:    {category}");
    }
    if let Some(image) = &product.image {
        println!("  image:       {image}");
    }
    match &detail.seller {
        Some(SellerName::Known(name)) => println!("  seller:      {name}"),
        Some(SellerName::Unnamed) => println!("  seller:      (no name on file)"),
        Some(SellerName::Unavailable) => println!("  seller:      (lookup failed)"),
        None => {}
    }
    println!("  wishlist:    {}", ctx.catalog.in_wishlist(id));
    println!("  cart:        {}", ctx.catalog.in_cart(id));
    if !product.description.is_empty() {
        println!();
        println!("{}", product.description);
    }
    Ok(())
}
