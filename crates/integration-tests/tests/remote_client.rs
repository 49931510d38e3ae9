//! Wire-level tests for `RemoteClient` against the fake services.

#![allow(clippy::unwrap_used)]

use bazaar_client::BearerToken;
use bazaar_client::remote::{CartAggregate, IdempotencyKey, OrderPayload, RemoteError, SellerName};
use bazaar_core::{ProductId, Quantity, SellerId};
use bazaar_integration_tests::{FakeMarket, Route};
use serde_json::json;

#[tokio::test]
async fn test_fetch_catalog_decodes_products() {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("p1", "Lamp", 10.0, 3);
    market.add_product("p2", "Rug", 5.5, 0);

    let products = market.client().fetch_catalog(&market.token()).await.unwrap();

    assert_eq!(products.len(), 2);
    assert_eq!(products[0].id.as_str(), "p1");
    assert_eq!(products[0].price.display(), "10.00");
    assert_eq!(products[0].stock, 3);
    assert!(products[0].available);
    assert_eq!(products[1].price.display(), "5.50");
    assert!(!products[1].available);
    assert_eq!(products[1].category.as_deref(), Some("General"));
}

#[tokio::test]
async fn test_wrong_token_is_auth_expired() {
    let market = FakeMarket::start().await.unwrap();

    let err = market
        .client()
        .fetch_catalog(&BearerToken::new("stale"))
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteError::AuthExpired));
}

#[tokio::test]
async fn test_service_error_carries_message() {
    let market = FakeMarket::start().await.unwrap();
    market.fail_next(Route::Catalog, 503, r#"{"message":"Catalog is down"}"#);

    let err = market.client().fetch_catalog(&market.token()).await.unwrap_err();

    match err {
        RemoteError::Service { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "Catalog is down");
        }
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_success_body_is_decode_error() {
    let market = FakeMarket::start().await.unwrap();
    market.fail_next(Route::Catalog, 200, "<html>maintenance</html>");

    let err = market.client().fetch_catalog(&market.token()).await.unwrap_err();

    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn test_mutation_requests() {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("p1", "Lamp", 10.0, 3);
    let client = market.client();
    let token = market.token();
    let id = ProductId::new("p1");

    client.add_to_wishlist(&id, &token).await.unwrap();
    client
        .add_to_cart(&id, Quantity::new(3).unwrap(), &token)
        .await
        .unwrap();
    client.remove_from_wishlist(&id, &token).await.unwrap();

    let wishlist_add = &market.calls_to(Route::WishlistAdd)[0];
    assert_eq!(wishlist_add.body, Some(json!({"_id": "p1"})));

    let cart_add = &market.calls_to(Route::CartAdd)[0];
    assert_eq!(cart_add.body, Some(json!({"_id": "p1", "qty": 3})));

    let wishlist_remove = &market.calls_to(Route::WishlistRemove)[0];
    assert_eq!(wishlist_remove.target.as_deref(), Some("p1"));

    assert!(market.remote_wishlist().is_empty());
    assert_eq!(market.remote_cart().get("p1"), Some(&3));
}

#[tokio::test]
async fn test_remove_absent_cart_product_succeeds() {
    let market = FakeMarket::start().await.unwrap();

    market
        .client()
        .remove_from_cart(&ProductId::new("never-added"), &market.token())
        .await
        .unwrap();

    assert_eq!(market.calls_to(Route::CartRemove).len(), 1);
}

#[tokio::test]
async fn test_fetch_cart_empty_and_populated() {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("a", "A", 10.0, 5);
    market.add_product("b", "B", 5.5, 5);
    let client = market.client();
    let token = market.token();

    assert_eq!(client.fetch_cart(&token).await.unwrap(), CartAggregate::empty());

    market.seed_cart("a", 2);
    market.seed_cart("b", 1);
    let cart = client.fetch_cart(&token).await.unwrap();

    assert_eq!(cart.lines.len(), 2);
    assert_eq!(cart.total().display(), "25.50");
}

#[tokio::test]
async fn test_place_order_sends_idempotency_key() {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("A", "A", 10.0, 5);
    market.seed_cart("A", 3);
    let client = market.client();
    let token = market.token();

    let cart = client.fetch_cart(&token).await.unwrap();
    let payload = OrderPayload::from_cart(&cart).unwrap();
    let key = IdempotencyKey::generate();

    let order = client.place_order(&payload, key, &token).await.unwrap();

    assert_eq!(order.id.as_ref().map(ToString::to_string).as_deref(), Some("order-1"));
    assert_eq!(order.amount, "30.00");
    assert_eq!(order.idempotency_key, key);

    let call = &market.calls_to(Route::Order)[0];
    assert_eq!(call.idempotency_key, Some(key.as_header_value()));
    assert_eq!(
        call.body,
        Some(json!({
            "items": [{"product": {"_id": "A"}, "amount": 3}],
            "amount": "30.00",
            "status": "Pending"
        }))
    );
}

#[tokio::test]
async fn test_resubmitted_key_does_not_duplicate_order() {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("A", "A", 10.0, 5);
    market.seed_cart("A", 1);
    let client = market.client();
    let token = market.token();

    let payload = OrderPayload::from_cart(&client.fetch_cart(&token).await.unwrap()).unwrap();
    let key = IdempotencyKey::generate();

    let first = client.place_order(&payload, key, &token).await.unwrap();
    let second = client.place_order(&payload, key, &token).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(market.orders().len(), 1);
}

#[tokio::test]
async fn test_seller_lookup() {
    let market = FakeMarket::start().await.unwrap();
    market.add_product("p1", "Lamp", 10.0, 3);
    market.add_seller("p1", "s1", json!({"name": "Ada's Lamps"}));
    market.add_seller("p1", "s2", json!({"email": "anon@example.test"}));
    let client = market.client();
    let token = market.token();

    assert_eq!(
        client
            .fetch_seller_name(&SellerId::new("s1"), &token)
            .await
            .unwrap(),
        SellerName::Known("Ada's Lamps".to_string())
    );
    assert_eq!(
        client
            .fetch_seller_name(&SellerId::new("s2"), &token)
            .await
            .unwrap(),
        SellerName::Unnamed
    );
    assert!(matches!(
        client.fetch_seller_name(&SellerId::new("s3"), &token).await,
        Err(RemoteError::Service { status: 404, .. })
    ));
}
