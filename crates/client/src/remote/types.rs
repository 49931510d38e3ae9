//! Domain types for the remote services.
//!
//! These types provide a clean API separate from the raw wire documents in
//! `wire.rs`, which tolerate the services' field naming quirks.

use bazaar_core::{CartLineId, Money, OrderId, OrderStatus, ProductId, Quantity, SellerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Catalog Types
// =============================================================================

/// Immutable snapshot of a catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    /// Product document id.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Unit price.
    pub price: Money,
    /// Image URL, if the product has one.
    pub image: Option<String>,
    /// Units in stock.
    pub stock: u32,
    /// Whether the product can currently be bought.
    pub available: bool,
    /// Product category (the service calls it `type`).
    pub category: Option<String>,
    /// Seller who listed the product.
    pub seller: Option<SellerId>,
}

/// Result of a seller lookup.
///
/// The fallbacks are distinct variants so a missing name is never mistaken
/// for a seller actually called "Name not available".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellerName {
    /// The seller's display name.
    Known(String),
    /// The seller exists but has no display name.
    Unnamed,
    /// The lookup failed.
    Unavailable,
}

impl SellerName {
    /// The name if one was found.
    #[must_use]
    pub fn as_known(&self) -> Option<&str> {
        match self {
            Self::Known(name) => Some(name),
            Self::Unnamed | Self::Unavailable => None,
        }
    }
}

/// A product together with its seller lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDetail {
    /// The product.
    pub product: ProductRef,
    /// Seller lookup result, `None` when the product has no seller.
    pub seller: Option<SellerName>,
}

// =============================================================================
// Cart Types
// =============================================================================

/// One priced line of the cart aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Line id assigned by the shopping service.
    pub id: Option<CartLineId>,
    /// Product snapshot at the time it was carted.
    pub product: ProductRef,
    /// Units of the product.
    pub quantity: Quantity,
}

impl CartLine {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.product.price.times(self.quantity)
    }
}

/// The shopper's single cart document.
///
/// An absent document is represented as an aggregate with no lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartAggregate {
    /// Lines in service order.
    pub lines: Vec<CartLine>,
}

impl CartAggregate {
    /// An empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self { lines: Vec::new() }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of line totals, recomputed on every call.
    #[must_use]
    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        self.lines
            .iter()
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }
}

// =============================================================================
// Order Types
// =============================================================================

/// Reference to the ordered product, as the order service expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderProductRef {
    #[serde(rename = "_id")]
    pub id: ProductId,
}

/// One ordered line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub product: OrderProductRef,
    pub amount: Quantity,
}

/// Body of an order submission.
///
/// Serializes to `{items:[{product:{_id}, amount}], amount:"30.00", status:"Pending"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPayload {
    pub items: Vec<OrderItem>,
    /// Cart total, formatted with two decimals.
    pub amount: String,
    pub status: OrderStatus,
}

impl OrderPayload {
    /// Build the payload for the current cart.
    ///
    /// Returns `None` for an empty cart; an empty order is never submitted.
    #[must_use]
    pub fn from_cart(cart: &CartAggregate) -> Option<Self> {
        if cart.is_empty() {
            return None;
        }

        Some(Self {
            items: cart
                .lines
                .iter()
                .map(|line| OrderItem {
                    product: OrderProductRef {
                        id: line.product.id.clone(),
                    },
                    amount: line.quantity,
                })
                .collect(),
            amount: cart.total().display(),
            status: OrderStatus::Pending,
        })
    }
}

/// Client-generated key identifying one order submission attempt.
///
/// Sent as the `Idempotency-Key` header so the order service can collapse a
/// resubmitted attempt instead of creating a duplicate order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Header value.
    #[must_use]
    pub fn as_header_value(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// An order the service accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    /// Order id, if the service returned one.
    pub id: Option<OrderId>,
    /// Client-side lifecycle status.
    pub status: OrderStatus,
    /// Submitted total.
    pub amount: String,
    /// Key the submission was sent with.
    pub idempotency_key: IdempotencyKey,
    /// When the client received the confirmation.
    pub confirmed_at: DateTime<Utc>,
}
