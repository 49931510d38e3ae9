//! Bazaar storefront client engine.
//!
//! Keeps the shopper's wishlist and cart membership mirrored locally,
//! guards membership mutations against duplicate in-flight requests, and
//! turns the remote cart aggregate into a priced, submittable order.
//!
//! # Modules
//!
//! - [`remote`] - HTTP client for the catalog, shopping and user services
//! - [`replica`] - Locally persisted membership sets
//! - [`guard`] - Single-flight guard for membership mutations
//! - [`fence`] - Request fencing for view controllers
//! - [`catalog`] - Catalog listing controller
//! - [`cart`] - Cart view and order submission
//! - [`session`] - Bearer token and forced logout

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fence;
pub mod guard;
pub mod remote;
pub mod replica;
pub mod session;

pub use cart::{CartController, CheckoutError, SubmissionState};
pub use catalog::{CatalogController, MutationOutcome, ProductCard};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use guard::OperationGuard;
pub use remote::{RemoteClient, RemoteError};
pub use replica::Memberships;
pub use session::{BearerToken, Session};
