//! Cart aggregate and order submission against the fake services.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use bazaar_client::cart::{EMPTY_CART_MESSAGE, ORDER_PLACED_MESSAGE};
use bazaar_client::{CartController, CheckoutError, RemoteError, Session, SubmissionState};
use bazaar_integration_tests::{FakeMarket, Route, eventually};
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn market_with_cart() -> FakeMarket {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("a", "Lamp", 10.0, 5);
    market.add_product("b", "Rug", 5.5, 5);
    market.seed_cart("a", 2);
    market.seed_cart("b", 1);
    market
}

fn controller(market: &FakeMarket) -> (CartController, Session) {
    let session = Session::new(Some(market.token()));
    (CartController::new(market.client(), session.clone()), session)
}

#[tokio::test]
async fn test_mount_computes_total() {
    let market = market_with_cart().await;
    let (cart, _) = controller(&market);

    cart.mount().await;

    let view = cart.cart_view();
    assert_eq!(view.total, "25.50");
    assert_eq!(cart.total().display(), "25.50");
    assert_eq!(view.item_count, 2);
    assert_eq!(view.unit_count, 3);
    assert_eq!(view.lines[0].line_total, "20.00");
    assert!(cart.error().is_none());
}

#[tokio::test]
async fn test_empty_cart_submission_never_calls_order_service() {
    let market = FakeMarket::start().await.unwrap();
    let (cart, _) = controller(&market);
    cart.mount().await;

    let err = cart.submit_order().await.unwrap_err();

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(cart.error().as_deref(), Some(EMPTY_CART_MESSAGE));
    assert!(market.calls_to(Route::Order).is_empty());
}

#[tokio::test]
async fn test_successful_order_refreshes_cart() {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("A", "Lamp", 10.0, 5);
    market.seed_cart("A", 3);
    let (cart, _) = controller(&market);
    cart.mount().await;

    let order = cart.submit_order().await.unwrap();

    let call = &market.calls_to(Route::Order)[0];
    assert_eq!(
        call.body,
        Some(json!({
            "items": [{"product": {"_id": "A"}, "amount": 3}],
            "amount": "30.00",
            "status": "Pending"
        }))
    );
    assert_eq!(call.idempotency_key, Some(order.idempotency_key.as_header_value()));

    assert_eq!(cart.notice().as_deref(), Some(ORDER_PLACED_MESSAGE));
    assert_eq!(cart.submission(), SubmissionState::Idle);
    assert!(cart.cart_view().is_empty());
    assert_eq!(cart.total().display(), "0.00");
    assert_eq!(market.calls_to(Route::CartFetch).len(), 2);
    assert_eq!(cart.last_order().unwrap().id, order.id);
}

#[tokio::test]
async fn test_each_submission_has_distinct_key() {
    let market = market_with_cart().await;
    let (cart, _) = controller(&market);

    cart.mount().await;
    cart.submit_order().await.unwrap();

    market.seed_cart("a", 1);
    cart.refresh().await;
    cart.submit_order().await.unwrap();

    let keys: Vec<_> = market
        .calls_to(Route::Order)
        .into_iter()
        .map(|call| call.idempotency_key.unwrap())
        .collect();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
    assert_eq!(market.orders().len(), 2);
}

#[tokio::test]
async fn test_failed_order_leaves_cart_untouched() {
    let market = market_with_cart().await;
    let (cart, session) = controller(&market);
    cart.mount().await;
    let before = cart.cart_view();
    market.fail_next(Route::Order, 500, r#"{"message":"Order service unavailable"}"#);

    let err = cart.submit_order().await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Remote(RemoteError::Service { status: 500, .. })
    ));
    assert_eq!(cart.submission(), SubmissionState::Failed);
    assert_eq!(cart.error().as_deref(), Some("Order service unavailable"));
    assert_eq!(cart.cart_view(), before);
    assert!(cart.notice().is_none());
    // No automatic retry, no refresh.
    assert_eq!(market.calls_to(Route::Order).len(), 1);
    assert_eq!(market.calls_to(Route::CartFetch).len(), 1);
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_auth_expired_on_order_forces_logout() {
    let market = market_with_cart().await;
    let (cart, session) = controller(&market);
    cart.mount().await;
    market.fail_next(Route::Order, 401, "");

    let err = cart.submit_order().await.unwrap_err();

    assert!(matches!(err, CheckoutError::Remote(RemoteError::AuthExpired)));
    assert!(!session.is_authenticated());
    assert_eq!(session.forced_logouts(), 1);
}

#[tokio::test]
async fn test_concurrent_submission_rejected() {
    let market = market_with_cart().await;
    let (cart, _) = controller(&market);
    cart.mount().await;
    market.delay_next(Route::Order, Duration::from_millis(200));

    let first = {
        let cart = cart.clone();
        tokio::spawn(async move { cart.submit_order().await })
    };
    assert!(eventually(|| cart.submission() == SubmissionState::Submitting).await);

    let err = cart.submit_order().await.unwrap_err();
    assert!(matches!(err, CheckoutError::AlreadySubmitting));

    first.await.unwrap().unwrap();
    assert_eq!(market.orders().len(), 1);
}

#[tokio::test]
async fn test_fetch_failure_keeps_previous_cart() {
    let market = market_with_cart().await;
    let (cart, _) = controller(&market);
    cart.mount().await;
    market.fail_next(Route::CartFetch, 503, r#"{"message":"Cart unavailable"}"#);

    assert!(cart.refresh().await);

    assert_eq!(cart.error().as_deref(), Some("Cart unavailable"));
    assert_eq!(cart.cart_view().total, "25.50");
}

#[tokio::test]
async fn test_follow_session_fetches_when_signed_in() {
    let market = market_with_cart().await;
    let session = Session::anonymous();
    let cart = CartController::new(market.client(), session.clone());

    cart.mount().await;
    assert!(market.calls().is_empty());

    let cancel = CancellationToken::new();
    let follower = {
        let cart = cart.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { cart.follow_session(cancel).await })
    };

    session.sign_in(market.token());
    assert!(eventually(|| cart.cart_view().item_count == 2).await);

    session.force_logout();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(market.calls_to(Route::CartFetch).len(), 1);

    cancel.cancel();
    follower.await.unwrap();
}
