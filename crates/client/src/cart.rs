//! Cart aggregate view and order submission.
//!
//! The cart view reads only the remote cart aggregate; it never consults the
//! local membership replicas. Totals are recomputed from the lines on every
//! read.
//!
//! # Submission
//!
//! ```text
//! Idle ──submit──▶ Submitting ──ok──▶ Placed ──refresh──▶ Idle
//!                       │
//!                       └──err──▶ Failed (cart untouched, error shown)
//! ```
//!
//! An empty cart is rejected before any network call. Every attempt carries a
//! fresh idempotency key.

use std::sync::Arc;

use bazaar_core::{Money, ProductId, Quantity};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::catalog::{SIGNED_OUT_MESSAGE, log_failure};
use crate::fence::ViewScope;
use crate::remote::{CartAggregate, IdempotencyKey, OrderPayload, PlacedOrder, RemoteClient, RemoteError};
use crate::session::Session;

/// Shown when an order is submitted with nothing in the cart.
pub const EMPTY_CART_MESSAGE: &str = "Your cart is empty. Please add items to the cart.";

/// Shown once the order service accepts an order.
pub const ORDER_PLACED_MESSAGE: &str = "Order placed successfully!";

/// Errors from submitting an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("an order submission is already in progress")]
    AlreadySubmitting,

    #[error("not signed in")]
    SignedOut,

    #[error("order submission failed: {0}")]
    Remote(#[from] RemoteError),
}

impl CheckoutError {
    /// Message suitable for showing to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => EMPTY_CART_MESSAGE.to_string(),
            Self::AlreadySubmitting => "Your order is already being placed.".to_string(),
            Self::SignedOut => SIGNED_OUT_MESSAGE.to_string(),
            Self::Remote(e) => e.user_message(),
        }
    }
}

/// Where the current order submission stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Placed,
    Failed,
}

/// One cart line, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub quantity: Quantity,
    /// Unit price with two decimals.
    pub unit_price: String,
    /// Unit price times quantity, with two decimals.
    pub line_total: String,
}

/// The cart, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    /// Number of distinct lines.
    pub item_count: usize,
    /// Units across all lines.
    pub unit_count: u64,
    /// Cart total with two decimals.
    pub total: String,
}

impl CartView {
    #[must_use]
    pub fn from_aggregate(cart: &CartAggregate) -> Self {
        Self {
            lines: cart
                .lines
                .iter()
                .map(|line| CartLineView {
                    product_id: line.product.id.clone(),
                    name: line.product.name.clone(),
                    description: line.product.description.clone(),
                    image: line.product.image.clone(),
                    quantity: line.quantity,
                    unit_price: line.product.price.display(),
                    line_total: line.line_total().display(),
                })
                .collect(),
            item_count: cart.lines.len(),
            unit_count: cart.unit_count(),
            total: cart.total().display(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Default)]
struct CartState {
    cart: CartAggregate,
    error: Option<String>,
    notice: Option<String>,
    submission: SubmissionState,
    last_order: Option<PlacedOrder>,
}

/// Controller behind the cart view.
///
/// Cheaply cloneable; clones drive the same view.
#[derive(Clone)]
pub struct CartController {
    inner: Arc<CartInner>,
}

struct CartInner {
    remote: RemoteClient,
    session: Session,
    scope: ViewScope,
    state: Mutex<CartState>,
}

impl CartController {
    #[must_use]
    pub fn new(remote: RemoteClient, session: Session) -> Self {
        Self {
            inner: Arc::new(CartInner {
                remote,
                session,
                scope: ViewScope::new(),
                state: Mutex::new(CartState::default()),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Fetch the cart if signed in.
    pub async fn mount(&self) {
        if self.inner.session.is_authenticated() {
            self.refresh().await;
        }
    }

    /// Fetch the cart aggregate. Returns whether the response was applied.
    ///
    /// On failure the previously displayed cart stays as it was.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> bool {
        let Some(token) = self.inner.session.token() else {
            self.inner.state.lock().error = Some(SIGNED_OUT_MESSAGE.to_string());
            return false;
        };

        let scope = &self.inner.scope;
        let ticket = scope.issue();
        let Some(result) = scope
            .until_torn_down(self.inner.remote.fetch_cart(&token))
            .await
        else {
            debug!("Cart view unmounted during fetch");
            return false;
        };

        let mut state = self.inner.state.lock();
        if !scope.accepts(ticket) {
            debug!(generation = ticket.generation(), "Discarding superseded cart response");
            return false;
        }

        match result {
            Ok(cart) => {
                debug!(lines = cart.lines.len(), total = %cart.total(), "Cart loaded");
                state.cart = cart;
                if state.submission != SubmissionState::Failed {
                    state.error = None;
                }
            }
            Err(e) => {
                state.error = Some(e.user_message());
                drop(state);
                log_failure(&e, "Failed to fetch cart");
                self.inner.session.observe_failure(&e);
            }
        }
        true
    }

    /// Re-fetch the cart whenever a token becomes present, until `cancel`
    /// fires or the view is unmounted.
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

            let signed_in = tokens.borrow_and_update().is_some();
            if signed_in {
                self.refresh().await;
            }
        }
    }

    /// Tear the view down. In-flight fetches are abandoned; an in-flight
    /// order submission is not.
    pub fn unmount(&self) {
        self.inner.scope.tear_down();
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// The cart as last fetched.
    #[must_use]
    pub fn cart(&self) -> CartAggregate {
        self.inner.state.lock().cart.clone()
    }

    #[must_use]
    pub fn cart_view(&self) -> CartView {
        CartView::from_aggregate(&self.inner.state.lock().cart)
    }

    /// Cart total, recomputed from the current lines.
    #[must_use]
    pub fn total(&self) -> Money {
        self.inner.state.lock().cart.total()
    }

    #[must_use]
    pub fn submission(&self) -> SubmissionState {
        self.inner.state.lock().submission
    }

    /// Last error message, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    /// Last success notice, if any.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.inner.state.lock().notice.clone()
    }

    /// The most recently placed order.
    #[must_use]
    pub fn last_order(&self) -> Option<PlacedOrder> {
        self.inner.state.lock().last_order.clone()
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submit the current cart as an order, then re-fetch the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] without any network call when the
    /// cart has no lines, [`CheckoutError::AlreadySubmitting`] while another
    /// submission is in flight, and [`CheckoutError::Remote`] when the order
    /// service does not accept the order. Nothing is retried.
    #[instrument(skip(self))]
    pub async fn submit_order(&self) -> Result<PlacedOrder, CheckoutError> {
        let Some(token) = self.inner.session.token() else {
            return Err(self.reject(CheckoutError::SignedOut));
        };

        let payload = {
            let mut state = self.inner.state.lock();
            if state.submission == SubmissionState::Submitting {
                return Err(CheckoutError::AlreadySubmitting);
            }
            let Some(payload) = OrderPayload::from_cart(&state.cart) else {
                drop(state);
                debug!("Refusing to submit an empty cart");
                return Err(self.reject(CheckoutError::EmptyCart));
            };
            state.submission = SubmissionState::Submitting;
            state.error = None;
            state.notice = None;
            payload
        };

        let key = IdempotencyKey::generate();
        info!(idempotency_key = %key, amount = %payload.amount, "Submitting order");

        match self.inner.remote.place_order(&payload, key, &token).await {
            Ok(order) => {
                {
                    let mut state = self.inner.state.lock();
                    state.submission = SubmissionState::Placed;
                    state.notice = Some(ORDER_PLACED_MESSAGE.to_string());
                    state.last_order = Some(order.clone());
                }
                info!(order_id = ?order.id, "Order placed");

                self.refresh().await;

                let mut state = self.inner.state.lock();
                if state.submission == SubmissionState::Placed {
                    state.submission = SubmissionState::Idle;
                }
                Ok(order)
            }
            Err(e) => {
                log_failure(&e, "Order submission failed");
                self.inner.session.observe_failure(&e);
                {
                    let mut state = self.inner.state.lock();
                    state.submission = SubmissionState::Failed;
                    state.error = Some(e.user_message());
                }
                Err(CheckoutError::Remote(e))
            }
        }
    }

    /// Record a submission that never reached the network.
    fn reject(&self, error: CheckoutError) -> CheckoutError {
        let mut state = self.inner.state.lock();
        state.error = Some(error.user_message());
        state.notice = None;
        error
    }
}

impl std::fmt::Debug for CartController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartController")
            .field("state", &*self.inner.state.lock())
            .field("torn_down", &self.inner.scope.is_torn_down())
            .finish_non_exhaustive()
    }
}
