//! Raw response documents and their conversions into domain types.
//!
//! The services are document stores keyed by `_id`; some deployments emit
//! `id`/`image` instead of `_id`/`img`, so both spellings are accepted.

use bazaar_core::{CartLineId, Money, OrderId, ProductId, Quantity, SellerId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{CartAggregate, CartLine, ProductRef};

#[derive(Debug, Deserialize)]
pub struct WireProduct {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "description")]
    pub desc: String,
    pub price: Money,
    #[serde(default, alias = "image")]
    pub img: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub available: bool,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub seller: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireCartDocument {
    #[serde(default)]
    pub items: Vec<WireCartItem>,
}

#[derive(Debug, Deserialize)]
pub struct WireCartItem {
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<String>,
    pub product: WireProduct,
    pub amount: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireOrder {
    #[serde(default, rename = "_id", alias = "id", alias = "orderId")]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireSeller {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireErrorBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct WishlistMutation<'a> {
    #[serde(rename = "_id")]
    pub id: &'a ProductId,
}

#[derive(Debug, Serialize)]
pub struct CartMutation<'a> {
    #[serde(rename = "_id")]
    pub id: &'a ProductId,
    pub qty: Quantity,
}

// =============================================================================
// Conversions
// =============================================================================

pub fn convert_product(p: WireProduct) -> ProductRef {
    ProductRef {
        id: ProductId::new(p.id),
        name: p.name,
        description: p.desc,
        price: p.price,
        image: p.img.filter(|url| !url.is_empty()),
        stock: p.stock,
        available: p.available,
        category: p.category.filter(|c| !c.is_empty()),
        seller: p.seller.filter(|s| !s.is_empty()).map(SellerId::new),
    }
}

/// Only the first cart document is meaningful; the rest are ignored.
pub fn convert_cart(documents: Vec<WireCartDocument>) -> CartAggregate {
    let Some(document) = documents.into_iter().next() else {
        return CartAggregate::empty();
    };

    CartAggregate {
        lines: document.items.into_iter().map(convert_cart_line).collect(),
    }
}

fn convert_cart_line(item: WireCartItem) -> CartLine {
    let quantity = Quantity::new(item.amount).unwrap_or_else(|_| {
        warn!(product_id = %item.product.id, "Cart line with zero amount, treating as 1");
        Quantity::ONE
    });

    CartLine {
        id: item.id.map(CartLineId::new),
        product: convert_product(item.product),
        quantity,
    }
}

pub fn convert_order_id(order: WireOrder) -> Option<OrderId> {
    order.id.filter(|id| !id.is_empty()).map(OrderId::new)
}

/// Pull a human-readable message out of an error body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<WireErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| super::excerpt(body.trim()))
}
