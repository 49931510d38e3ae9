//! HTTP client for the catalog, shopping and user services.

use std::sync::Arc;

use bazaar_core::{ProductId, Quantity, SellerId};
use chrono::Utc;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ServiceEndpoints;
use crate::session::BearerToken;

use super::types::{
    CartAggregate, IdempotencyKey, OrderPayload, PlacedOrder, ProductRef, SellerName,
};
use super::wire::{
    CartMutation, WireCartDocument, WireOrder, WireProduct, WireSeller, WishlistMutation,
    convert_cart, convert_order_id, convert_product, error_message,
};
use super::{RemoteError, excerpt};

/// Header carrying the per-attempt order idempotency key.
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// =============================================================================
// RemoteClient
// =============================================================================

/// Client for the remote storefront services.
///
/// Cheaply cloneable; all clones share one connection pool.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl RemoteClient {
    /// Create a new client for the given service endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bazaar-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(RemoteClientInner { client, endpoints }),
        })
    }

    /// Endpoints this client talks to.
    #[must_use]
    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.inner.endpoints
    }

    /// Start an authenticated request.
    fn request(&self, method: Method, url: Url, token: &BearerToken) -> RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .bearer_auth(token.expose())
    }

    /// Send a request and return the body of a success response.
    ///
    /// 401 maps to [`RemoteError::AuthExpired`]; any other non-success status
    /// maps to [`RemoteError::Service`] with the service's message.
    async fn send(&self, request: RequestBuilder) -> Result<String, RemoteError> {
        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            debug!("Service rejected bearer token");
            return Err(RemoteError::AuthExpired);
        }

        if !status.is_success() {
            if status.is_server_error() {
                tracing::error!(
                    status = %status,
                    body = %excerpt(&body),
                    "Service returned server error"
                );
            } else {
                tracing::warn!(
                    status = %status,
                    body = %excerpt(&body),
                    "Service returned non-success status"
                );
            }
            return Err(RemoteError::Service {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(body)
    }

    /// Send a request and decode a JSON success body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let body = self.send(request).await?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse service response"
            );
            RemoteError::Decode(e)
        })
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    /// Fetch the full product catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not a product list.
    #[instrument(skip(self, token))]
    pub async fn fetch_catalog(&self, token: &BearerToken) -> Result<Vec<ProductRef>, RemoteError> {
        let url = endpoint(&self.inner.endpoints.catalog, &[""])?;
        let products: Vec<WireProduct> = self
            .send_json(self.request(Method::GET, url, token))
            .await?;

        debug!(count = products.len(), "Fetched catalog");
        Ok(products.into_iter().map(convert_product).collect())
    }

    /// Fetch a single product.
    ///
    /// # Errors
    ///
    /// Returns an error if the product does not exist or the request fails.
    #[instrument(skip(self, token), fields(product_id = %product_id))]
    pub async fn fetch_product(
        &self,
        product_id: &ProductId,
        token: &BearerToken,
    ) -> Result<ProductRef, RemoteError> {
        let url = endpoint(&self.inner.endpoints.catalog, &[product_id.as_str()])?;
        let product: WireProduct = self
            .send_json(self.request(Method::GET, url, token))
            .await?;

        Ok(convert_product(product))
    }

    /// Look up a seller's display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. A seller without a name is
    /// [`SellerName::Unnamed`], not an error.
    #[instrument(skip(self, token), fields(seller_id = %seller_id))]
    pub async fn fetch_seller_name(
        &self,
        seller_id: &SellerId,
        token: &BearerToken,
    ) -> Result<SellerName, RemoteError> {
        let url = endpoint(
            &self.inner.endpoints.user,
            &["product", "seller", seller_id.as_str()],
        )?;
        let seller: WireSeller = self
            .send_json(self.request(Method::GET, url, token))
            .await?;

        Ok(seller
            .name
            .filter(|name| !name.trim().is_empty())
            .map_or(SellerName::Unnamed, SellerName::Known))
    }

    // =========================================================================
    // Membership Methods
    // =========================================================================

    /// Add a product to the shopper's wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not confirm the change.
    #[instrument(skip(self, token), fields(product_id = %product_id))]
    pub async fn add_to_wishlist(
        &self,
        product_id: &ProductId,
        token: &BearerToken,
    ) -> Result<(), RemoteError> {
        let url = endpoint(&self.inner.endpoints.catalog, &["wishlist"])?;
        let body = self
            .send(
                self.request(Method::PUT, url, token)
                    .json(&WishlistMutation { id: product_id }),
            )
            .await?;

        debug!(response = %excerpt(&body), "Wishlist add confirmed");
        Ok(())
    }

    /// Remove a product from the shopper's wishlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not confirm the change.
    #[instrument(skip(self, token), fields(product_id = %product_id))]
    pub async fn remove_from_wishlist(
        &self,
        product_id: &ProductId,
        token: &BearerToken,
    ) -> Result<(), RemoteError> {
        let url = endpoint(
            &self.inner.endpoints.catalog,
            &["wishlist", product_id.as_str()],
        )?;
        let body = self.send(self.request(Method::DELETE, url, token)).await?;

        debug!(response = %excerpt(&body), "Wishlist remove confirmed");
        Ok(())
    }

    /// Add `quantity` units of a product to the shopper's cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not confirm the change.
    #[instrument(skip(self, token), fields(product_id = %product_id, quantity = %quantity))]
    pub async fn add_to_cart(
        &self,
        product_id: &ProductId,
        quantity: Quantity,
        token: &BearerToken,
    ) -> Result<(), RemoteError> {
        let url = endpoint(&self.inner.endpoints.catalog, &["cart"])?;
        let body = self
            .send(self.request(Method::PUT, url, token).json(&CartMutation {
                id: product_id,
                qty: quantity,
            }))
            .await?;

        debug!(response = %excerpt(&body), "Cart add confirmed");
        Ok(())
    }

    /// Remove a product from the shopper's cart.
    ///
    /// Removing a product that is not in the cart is not a client-side fault;
    /// the service's answer decides the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not confirm the change.
    #[instrument(skip(self, token), fields(product_id = %product_id))]
    pub async fn remove_from_cart(
        &self,
        product_id: &ProductId,
        token: &BearerToken,
    ) -> Result<(), RemoteError> {
        let url = endpoint(&self.inner.endpoints.catalog, &["cart", product_id.as_str()])?;
        let body = self.send(self.request(Method::DELETE, url, token)).await?;

        debug!(response = %excerpt(&body), "Cart remove confirmed");
        Ok(())
    }

    // =========================================================================
    // Shopping Methods (never cached - mutable state)
    // =========================================================================

    /// Fetch the cart aggregate.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not a cart list.
    #[instrument(skip(self, token))]
    pub async fn fetch_cart(&self, token: &BearerToken) -> Result<CartAggregate, RemoteError> {
        let url = endpoint(&self.inner.endpoints.shopping, &["cart"])?;
        let documents: Vec<WireCartDocument> = self
            .send_json(self.request(Method::GET, url, token))
            .await?;

        let cart = convert_cart(documents);
        debug!(lines = cart.lines.len(), "Fetched cart");
        Ok(cart)
    }

    /// Submit an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the order service does not accept the order. A
    /// transport failure does not prove the order was not created.
    #[instrument(skip(self, payload, token), fields(idempotency_key = %key, items = payload.items.len()))]
    pub async fn place_order(
        &self,
        payload: &OrderPayload,
        key: IdempotencyKey,
        token: &BearerToken,
    ) -> Result<PlacedOrder, RemoteError> {
        let url = endpoint(&self.inner.endpoints.shopping, &["order"])?;
        let body = self
            .send(
                self.request(Method::POST, url, token)
                    .header(IDEMPOTENCY_HEADER, key.as_header_value())
                    .json(payload),
            )
            .await?;

        // The created record is service-defined; only its id is of interest.
        let order = serde_json::from_str::<WireOrder>(&body).unwrap_or_else(|e| {
            debug!(error = %e, "Order confirmation body has no readable id");
            WireOrder::default()
        });

        Ok(PlacedOrder {
            id: convert_order_id(order),
            status: bazaar_core::OrderStatus::Placed,
            amount: payload.amount.clone(),
            idempotency_key: key,
            confirmed_at: Utc::now(),
        })
    }
}

/// Append path segments to a service base URL.
///
/// Segments are percent-encoded; an empty final segment yields a trailing slash.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, RemoteError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RemoteError::Endpoint(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
