//! Wishlist and cart membership changes.

use bazaar_core::ProductId;

use super::{CommandError, Context, check_outcome};

#[allow(clippy::print_stdout)]
pub async fn wishlist_add(ctx: &Context, id: &ProductId) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.catalog.load_memberships();
    check_outcome(ctx.catalog.add_to_wishlist(id).await)?;
    println!("Added {id} to your wishlist");
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn wishlist_remove(ctx: &Context, id: &ProductId) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.catalog.load_memberships();
    check_outcome(ctx.catalog.remove_from_wishlist(id).await)?;
    println!("Removed {id} from your wishlist");
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn wishlist_toggle(ctx: &Context, id: &ProductId) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.catalog.load_memberships();
    check_outcome(ctx.catalog.toggle_wishlist(id).await)?;
    if ctx.catalog.in_wishlist(id) {
        println!("Added {id} to your wishlist");
    } else {
        println!("Removed {id} from your wishlist");
    }
    Ok(())
}

/// Add `qty` units, going through the same stepper the listing uses.
///
/// `qty` is at least 1; the argument parser rejects 0.
#[allow(clippy::print_stdout)]
pub async fn cart_add(ctx: &Context, id: &ProductId, qty: u32) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.catalog.load_memberships();

    let delta = i32::try_from(qty.saturating_sub(1)).unwrap_or(i32::MAX);
    let quantity = ctx.catalog.step_quantity(id, delta);

    check_outcome(ctx.catalog.add_to_cart(id).await)?;
    println!("Added {quantity} x {id} to your cart");
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn cart_remove(ctx: &Context, id: &ProductId) -> Result<(), CommandError> {
    ctx.require_session()?;
    ctx.catalog.load_memberships();
    check_outcome(ctx.catalog.remove_from_cart(id).await)?;
    println!("Removed {id} from your cart");
    Ok(())
}
