//! Cart display and order placement.

use bazaar_client::ClientError;
use bazaar_client::cart::CartView;

use super::{CommandError, Context};

#[allow(clippy::print_stdout)]
fn print_cart(view: &CartView) {
    if view.is_empty() {
        println!("Your cart is empty");
        return;
    }

    println!("{} items", view.item_count);
    for line in &view.lines {
        println!(
            "  {:<30} {:>10} x {:<4} {:>10}",
            line.name,
            line.unit_price,
            line.quantity.get(),
            line.line_total
        );
    }
    println!("  {:<30} {:>28}", "Total", view.total);
}

pub async fn show(ctx: &Context) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.cart.mount().await;

    if let Some(message) = ctx.cart.error() {
        return Err(CommandError::Unavailable(message));
    }

    print_cart(&ctx.cart.cart_view());
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn place_order(ctx: &Context) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.cart.mount().await;

    if let Some(message) = ctx.cart.error() {
        return Err(CommandError::Unavailable(message));
    }

    let order = ctx.cart.submit_order().await.map_err(ClientError::from)?;

    if let Some(notice) = ctx.cart.notice() {
        println!("{notice}");
    }
    match &order.id {
        Some(id) => println!("Order {id} ({})", order.amount),
        None => println!("Order total {}", order.amount),
    }
    tracing::debug!(idempotency_key = %order.idempotency_key, "Order confirmed");

    print_cart(&ctx.cart.cart_view());
    Ok(())
}
