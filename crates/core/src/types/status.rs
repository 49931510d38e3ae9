//! Status enums for orders and membership operations.

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// Orders are submitted as `Pending`; the client moves them to `Placed` or
/// `Failed` once the order service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Placed,
    Failed,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Placed => write!(f, "Placed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Which personal collection a product identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipKind {
    Wishlist,
    Cart,
}

impl MembershipKind {
    /// Key under which the membership replica is persisted.
    #[must_use]
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::Wishlist => "wishlist",
            Self::Cart => "cart",
        }
    }
}

impl std::fmt::Display for MembershipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// A mutation against one of the membership collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    WishlistAdd,
    WishlistRemove,
    CartAdd,
    CartRemove,
}

impl OperationKind {
    /// The collection this operation mutates.
    #[must_use]
    pub const fn membership(self) -> MembershipKind {
        match self {
            Self::WishlistAdd | Self::WishlistRemove => MembershipKind::Wishlist,
            Self::CartAdd | Self::CartRemove => MembershipKind::Cart,
        }
    }

    /// Whether the operation inserts into its collection.
    #[must_use]
    pub const fn is_add(self) -> bool {
        matches!(self, Self::WishlistAdd | Self::CartAdd)
    }

    /// The operation that undoes this one.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::WishlistAdd => Self::WishlistRemove,
            Self::WishlistRemove => Self::WishlistAdd,
            Self::CartAdd => Self::CartRemove,
            Self::CartRemove => Self::CartAdd,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WishlistAdd => write!(f, "wishlist-add"),
            Self::WishlistRemove => write!(f, "wishlist-remove"),
            Self::CartAdd => write!(f, "cart-add"),
            Self::CartRemove => write!(f, "cart-remove"),
        }
    }
}
