//! Catalog listing controller.
//!
//! Fetches the product listing, annotates each product with the shopper's
//! wishlist and cart membership, and drives the guarded membership mutations.
//! A mutation touches the local replica only after the remote service has
//! confirmed it.

use std::collections::HashMap;
use std::sync::Arc;

use bazaar_core::{MembershipKind, OperationKind, ProductId, Quantity};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::fence::ViewScope;
use crate::guard::{OperationGuard, PendingKey};
use crate::remote::{ProductDetail, ProductRef, RemoteClient, RemoteError, SellerName};
use crate::replica::{Memberships, Persisted};
use crate::session::{BearerToken, Session};

/// Shown when an action needs a signed-in shopper.
pub const SIGNED_OUT_MESSAGE: &str = "Please sign in to continue.";

/// One product as the listing shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCard {
    pub product: ProductRef,
    pub in_wishlist: bool,
    pub in_cart: bool,
    /// A wishlist mutation for this product is in flight.
    pub wishlist_pending: bool,
    /// A cart mutation for this product is in flight.
    pub cart_pending: bool,
    /// Quantity the add-to-cart stepper currently shows.
    pub quantity: Quantity,
}

/// Result of a membership mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The service confirmed the change and the replica was updated.
    Applied,
    /// The service refused the change; membership is unchanged.
    Rejected(String),
    /// A mutation for the same product and collection is still in flight.
    AlreadyPending,
    /// No shopper is signed in; nothing was sent.
    SignedOut,
}

impl MutationOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    products: Vec<ProductRef>,
    error: Option<String>,
    loaded: bool,
    quantities: HashMap<ProductId, Quantity>,
}

/// Controller behind the catalog listing view.
///
/// Cheaply cloneable; clones drive the same view.
#[derive(Clone)]
pub struct CatalogController {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    remote: RemoteClient,
    session: Session,
    memberships: Memberships,
    guard: OperationGuard,
    scope: ViewScope,
    state: Mutex<CatalogState>,
}

impl CatalogController {
    /// Create a controller. `guard` may be shared with other views so that a
    /// mutation started in one view blocks the same mutation in another.
    #[must_use]
    pub fn new(
        remote: RemoteClient,
        session: Session,
        memberships: Memberships,
        guard: OperationGuard,
    ) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                remote,
                session,
                memberships,
                guard,
                scope: ViewScope::new(),
                state: Mutex::new(CatalogState::default()),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the membership replicas and fetch the catalog.
    pub async fn mount(&self) {
        self.load_memberships();
        self.refresh().await;
    }

    /// Load the signed-in account's membership replicas without fetching.
    pub fn load_memberships(&self) {
        if let Some(token) = self.inner.session.token() {
            self.inner.memberships.bind_account(&token);
        }
    }

    /// Whether `product_id` is on the local wishlist replica.
    #[must_use]
    pub fn in_wishlist(&self, product_id: &ProductId) -> bool {
        self.inner.memberships.wishlist().contains(product_id)
    }

    /// Whether `product_id` is on the local cart replica.
    #[must_use]
    pub fn in_cart(&self, product_id: &ProductId) -> bool {
        self.inner.memberships.cart().contains(product_id)
    }

    /// Fetch the catalog. Returns whether the response was applied.
    ///
    /// A response that arrives after a newer refresh was issued, or after the
    /// view was unmounted, is discarded.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> bool {
        let Some(token) = self.inner.session.token() else {
            self.inner.state.lock().error = Some(SIGNED_OUT_MESSAGE.to_string());
            return false;
        };

        let scope = &self.inner.scope;
        let ticket = scope.issue();
        let Some(result) = scope
            .until_torn_down(self.inner.remote.fetch_catalog(&token))
            .await
        else {
            debug!("Catalog view unmounted during fetch");
            return false;
        };

        {
            let mut state = self.inner.state.lock();
            if !scope.accepts(ticket) {
                debug!(generation = ticket.generation(), "Discarding superseded catalog response");
                return false;
            }

            match &result {
                Ok(products) => {
                    state.products.clone_from(products);
                    state.error = None;
                    state.loaded = true;
                }
                Err(e) => {
                    state.error = Some(e.user_message());
                }
            }
        }

        match result {
            Ok(products) => {
                info!(count = products.len(), "Catalog loaded");
            }
            Err(e) => {
                log_failure(&e, "Failed to fetch catalog");
                self.inner.session.observe_failure(&e);
            }
        }
        true
    }

    /// Re-fetch the catalog on every token change until `cancel` fires or the
    /// view is unmounted.
    pub async fn follow_session(&self, cancel: CancellationToken) {
        let mut tokens = self.inner.session.subscribe();
        let torn_down = self.inner.scope.cancellation();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = torn_down.cancelled() => break,
                changed = tokens.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let token = tokens.borrow_and_update().clone();
            if let Some(token) = token {
                self.inner.memberships.bind_account(&token);
            }
            self.refresh().await;
        }
    }

    /// Tear the view down. In-flight fetches are abandoned; in-flight
    /// mutations still complete and update the shared stores.
    pub fn unmount(&self) {
        self.inner.scope.tear_down();
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// The listing, annotated with membership and pending state.
    #[must_use]
    pub fn listing(&self) -> Vec<ProductCard> {
        let state = self.inner.state.lock();
        let wishlist = self.inner.memberships.wishlist();
        let cart = self.inner.memberships.cart();
        let guard = &self.inner.guard;

        state
            .products
            .iter()
            .map(|product| ProductCard {
                in_wishlist: wishlist.contains(&product.id),
                in_cart: cart.contains(&product.id),
                wishlist_pending: guard.is_membership_pending(&product.id, MembershipKind::Wishlist),
                cart_pending: guard.is_membership_pending(&product.id, MembershipKind::Cart),
                quantity: state
                    .quantities
                    .get(&product.id)
                    .copied()
                    .unwrap_or_default(),
                product: product.clone(),
            })
            .collect()
    }

    /// Message from the last failed fetch, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    /// Whether a catalog fetch has succeeded at least once.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().loaded
    }

    #[must_use]
    pub fn guard(&self) -> &OperationGuard {
        &self.inner.guard
    }

    // =========================================================================
    // Quantity Stepper
    // =========================================================================

    /// Current stepper quantity for `product_id`.
    #[must_use]
    pub fn quantity(&self, product_id: &ProductId) -> Quantity {
        self.inner
            .state
            .lock()
            .quantities
            .get(product_id)
            .copied()
            .unwrap_or_default()
    }

    /// Move the stepper by `delta`. Never goes below 1.
    pub fn step_quantity(&self, product_id: &ProductId, delta: i32) -> Quantity {
        let mut state = self.inner.state.lock();
        let quantity = state.quantities.entry(product_id.clone()).or_default();
        *quantity = quantity.step(delta);
        *quantity
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn add_to_wishlist(&self, product_id: &ProductId) -> MutationOutcome {
        self.mutate(product_id, OperationKind::WishlistAdd).await
    }

    pub async fn remove_from_wishlist(&self, product_id: &ProductId) -> MutationOutcome {
        self.mutate(product_id, OperationKind::WishlistRemove).await
    }

    /// Add or remove depending on current wishlist membership.
    pub async fn toggle_wishlist(&self, product_id: &ProductId) -> MutationOutcome {
        if self.in_wishlist(product_id) {
            self.remove_from_wishlist(product_id).await
        } else {
            self.add_to_wishlist(product_id).await
        }
    }

    /// Add the stepper quantity of `product_id` to the cart.
    pub async fn add_to_cart(&self, product_id: &ProductId) -> MutationOutcome {
        self.mutate(product_id, OperationKind::CartAdd).await
    }

    /// Remove `product_id` from the cart. Removing a product that is not in
    /// the cart is left to the service to decide.
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> MutationOutcome {
        self.mutate(product_id, OperationKind::CartRemove).await
    }

    #[instrument(skip(self), fields(product_id = %product_id, operation = %operation))]
    async fn mutate(&self, product_id: &ProductId, operation: OperationKind) -> MutationOutcome {
        let Some(token) = self.inner.session.token() else {
            debug!("Mutation attempted while signed out");
            return MutationOutcome::SignedOut;
        };

        let permit = match self
            .inner
            .guard
            .begin(PendingKey::new(product_id.clone(), operation))
        {
            Ok(permit) => permit,
            Err(e) => {
                debug!(error = %e, "Mutation already in flight");
                return MutationOutcome::AlreadyPending;
            }
        };

        let outcome = match self.send_mutation(product_id, operation, &token).await {
            Ok(()) => {
                self.apply_confirmed(product_id, operation, &token).await;
                MutationOutcome::Applied
            }
            Err(e) => {
                log_failure(&e, "Membership change rejected");
                self.inner.session.observe_failure(&e);
                MutationOutcome::Rejected(e.user_message())
            }
        };

        drop(permit);
        outcome
    }

    async fn send_mutation(
        &self,
        product_id: &ProductId,
        operation: OperationKind,
        token: &BearerToken,
    ) -> Result<(), RemoteError> {
        let remote = &self.inner.remote;
        match operation {
            OperationKind::WishlistAdd => remote.add_to_wishlist(product_id, token).await,
            OperationKind::WishlistRemove => remote.remove_from_wishlist(product_id, token).await,
            OperationKind::CartAdd => {
                let quantity = self.quantity(product_id);
                remote.add_to_cart(product_id, quantity, token).await
            }
            OperationKind::CartRemove => remote.remove_from_cart(product_id, token).await,
        }
    }

    /// Mirror a confirmed mutation into the replicas of the account that
    /// made it.
    async fn apply_confirmed(
        &self,
        product_id: &ProductId,
        operation: OperationKind,
        token: &BearerToken,
    ) {
        let memberships = self.inner.memberships.clone();
        let token = token.clone();
        let product_id = product_id.clone();
        let recorded = tokio::task::spawn_blocking(move || {
            memberships.record(&token, operation, &product_id)
        })
        .await;

        match recorded {
            Ok(Ok(Persisted::Stored)) => info!("Membership updated"),
            Ok(Ok(Persisted::OtherAccount)) => {
                debug!("Membership updated for an account that is no longer bound");
            }
            // The service already has the change, so the in-memory set keeps it.
            Ok(Err(e)) => warn!(error = %e, "Membership updated but replica write failed"),
            Err(e) => warn!(error = %e, "Replica write task failed"),
        }
    }

    // =========================================================================
    // Product Detail
    // =========================================================================

    /// Fetch one product together with its seller's name.
    ///
    /// A failed seller lookup does not fail the detail; it yields
    /// [`SellerName::Unavailable`].
    ///
    /// # Errors
    ///
    /// Returns an error if signed out or if the product itself cannot be fetched.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn load_detail(&self, product_id: &ProductId) -> Result<ProductDetail, DetailError> {
        let token = self.inner.session.token().ok_or(DetailError::SignedOut)?;
        let remote = &self.inner.remote;

        let product = remote
            .fetch_product(product_id, &token)
            .await
            .inspect_err(|e| self.inner.session.observe_failure(e))?;

        let seller = match &product.seller {
            None => None,
            Some(seller_id) => Some(
                remote
                    .fetch_seller_name(seller_id, &token)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(seller_id = %seller_id, error = %e, "Seller lookup failed");
                        self.inner.session.observe_failure(&e);
                        SellerName::Unavailable
                    }),
            ),
        };

        Ok(ProductDetail { product, seller })
    }
}

impl std::fmt::Debug for CatalogController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogController")
            .field("state", &*self.inner.state.lock())
            .field("torn_down", &self.inner.scope.is_torn_down())
            .finish_non_exhaustive()
    }
}

/// Errors from loading a product detail.
#[derive(Debug, thiserror::Error)]
pub enum DetailError {
    #[error("not signed in")]
    SignedOut,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl DetailError {
    /// Message suitable for showing to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::SignedOut => SIGNED_OUT_MESSAGE.to_string(),
            Self::Remote(e) => e.user_message(),
        }
    }
}

/// Log a failed remote call at a level matching its cause.
pub(crate) fn log_failure(error: &RemoteError, message: &str) {
    if error.is_unexpected() {
        tracing::error!(error = %error, "{message}");
    } else {
        warn!(error = %error, "{message}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::config::ServiceEndpoints;

    /// Controller pointed at a port nothing listens on; only local paths are exercised.
    fn offline_controller(session: Session) -> CatalogController {
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let remote = RemoteClient::new(ServiceEndpoints::new(base.clone(), base.clone(), base)).unwrap();
        CatalogController::new(remote, session, Memberships::in_memory(), OperationGuard::new())
    }

    #[test]
    fn test_stepper_clamps_at_one() {
        let controller = offline_controller(Session::anonymous());
        let id = ProductId::new("p1");

        assert_eq!(controller.quantity(&id), Quantity::ONE);
        assert_eq!(controller.step_quantity(&id, -1), Quantity::ONE);
        assert_eq!(controller.step_quantity(&id, 1).get(), 2);
        assert_eq!(controller.step_quantity(&id, 1).get(), 3);
        assert_eq!(controller.step_quantity(&id, -5), Quantity::ONE);
    }

    #[tokio::test]
    async fn test_signed_out_mutation_sends_nothing() {
        let controller = offline_controller(Session::anonymous());
        let outcome = controller.add_to_wishlist(&ProductId::new("p1")).await;
        assert_eq!(outcome, MutationOutcome::SignedOut);
        assert!(controller.guard().pending_keys().is_empty());
    }

    #[tokio::test]
    async fn test_signed_out_refresh_records_error() {
        let controller = offline_controller(Session::anonymous());
        assert!(!controller.refresh().await);
        assert_eq!(controller.error().as_deref(), Some(SIGNED_OUT_MESSAGE));
        assert!(controller.listing().is_empty());
    }

    #[tokio::test]
    async fn test_pending_mutation_short_circuits() {
        let controller = offline_controller(Session::new(Some(BearerToken::new("t"))));
        let id = ProductId::new("p1");
        let _permit = controller
            .guard()
            .begin(PendingKey::new(id.clone(), OperationKind::CartAdd))
            .unwrap();

        assert_eq!(
            controller.remove_from_cart(&id).await,
            MutationOutcome::AlreadyPending
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_rejects_and_leaves_membership() {
        let controller = offline_controller(Session::new(Some(BearerToken::new("t"))));
        let id = ProductId::new("p1");

        let outcome = controller.add_to_wishlist(&id).await;

        assert!(matches!(outcome, MutationOutcome::Rejected(_)));
        assert!(!controller.inner.memberships.wishlist().contains(&id));
        assert!(controller.guard().pending_keys().is_empty());
    }
}
