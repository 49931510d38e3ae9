//! Integration tests for the Bazaar client engine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```
//!
//! The tests need no external services: [`FakeMarket`] serves the catalog,
//! shopping and user services in-process on an ephemeral port.
//!
//! # Test Categories
//!
//! - `remote_client` - Wire format and status mapping of `RemoteClient`
//! - `catalog_sync` - Listing, guarded mutations, replica persistence, fencing
//! - `checkout` - Cart aggregate, totals, order submission

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use bazaar_client::config::ServiceEndpoints;
use bazaar_client::{BearerToken, RemoteClient};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Token the fake accepts unless told otherwise.
pub const VALID_TOKEN: &str = "shopper-token";

/// One remote capability, for call recording and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Catalog,
    Product,
    WishlistAdd,
    WishlistRemove,
    CartAdd,
    CartRemove,
    CartFetch,
    Order,
    Seller,
}

/// A request the fake received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub route: Route,
    /// Product or seller id from the path, if any.
    pub target: Option<String>,
    pub body: Option<Value>,
    pub idempotency_key: Option<String>,
}

/// An order the fake accepted.
#[derive(Debug, Clone)]
pub struct RecordedOrder {
    pub id: String,
    pub payload: Value,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default)]
struct MarketData {
    token: String,
    products: Vec<Value>,
    sellers: HashMap<String, Value>,
    wishlist: Vec<String>,
    cart: BTreeMap<String, u32>,
    orders: Vec<RecordedOrder>,
    calls: Vec<RecordedCall>,
    failures: HashMap<Route, VecDeque<(StatusCode, String)>>,
    delays: HashMap<Route, VecDeque<Duration>>,
}

type Shared = Arc<Mutex<MarketData>>;

/// In-process fake of the three remote services.
///
/// Routes live under `/catalog`, `/shopping` and `/user`. Every request must
/// carry `Authorization: Bearer <token>`.
pub struct FakeMarket {
    addr: SocketAddr,
    data: Shared,
    server: JoinHandle<()>,
}

impl FakeMarket {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let data: Shared = Arc::new(Mutex::new(MarketData {
            token: VALID_TOKEN.to_string(),
            ..MarketData::default()
        }));

        let app = Router::new()
            .route("/catalog/", get(list_products))
            .route("/catalog/wishlist", put(add_wishlist))
            .route("/catalog/wishlist/{id}", delete(remove_wishlist))
            .route("/catalog/cart", put(add_cart))
            .route("/catalog/cart/{id}", delete(remove_cart))
            .route("/catalog/{id}", get(get_product))
            .route("/shopping/cart", get(get_cart))
            .route("/shopping/order", axum::routing::post(place_order))
            .route("/user/product/seller/{id}", get(get_seller))
            .with_state(Arc::clone(&data));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, data, server })
    }

    /// Base URLs pointing at this fake.
    ///
    /// # Panics
    ///
    /// Never in practice: the bound address always forms a valid URL.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn endpoints(&self) -> ServiceEndpoints {
        let base = format!("http://{}", self.addr);
        ServiceEndpoints::new(
            Url::parse(&format!("{base}/catalog")).unwrap(),
            Url::parse(&format!("{base}/shopping")).unwrap(),
            Url::parse(&format!("{base}/user")).unwrap(),
        )
    }

    /// A client for this fake.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn client(&self) -> RemoteClient {
        RemoteClient::new(self.endpoints()).unwrap()
    }

    /// The token the fake currently accepts.
    #[must_use]
    pub fn token(&self) -> BearerToken {
        BearerToken::new(self.data.lock().token.clone())
    }

    /// Stop accepting the current token; later calls answer 401.
    pub fn rotate_token(&self, token: &str) {
        self.data.lock().token = token.to_string();
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Add a product to the catalog. `price` is sent as a JSON number.
    pub fn add_product(&self, id: &str, name: &str, price: f64, stock: u32) {
        self.add_product_json(json!({
            "_id": id,
            "name": name,
            "desc": format!("{name} description"),
            "price": price,
            "img": format!("https://img.example.test/{id}.png"),
            "stock": stock,
            "available": stock > 0,
            "type": "General",
        }));
    }

    /// Add a raw product document.
    pub fn add_product_json(&self, product: Value) {
        self.data.lock().products.push(product);
    }

    /// Replace the whole catalog.
    pub fn set_products(&self, products: Vec<Value>) {
        self.data.lock().products = products;
    }

    /// Attach a seller to a product and register the seller's profile.
    pub fn add_seller(&self, product_id: &str, seller_id: &str, profile: Value) {
        let mut data = self.data.lock();
        for product in &mut data.products {
            if product["_id"] == product_id {
                product["seller"] = json!(seller_id);
            }
        }
        data.sellers.insert(seller_id.to_string(), profile);
    }

    /// Put a product straight into the remote cart.
    pub fn seed_cart(&self, product_id: &str, amount: u32) {
        self.data.lock().cart.insert(product_id.to_string(), amount);
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Answer the next call to `route` with `status` and `body`.
    pub fn fail_next(&self, route: Route, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.data
            .lock()
            .failures
            .entry(route)
            .or_default()
            .push_back((status, body.to_string()));
    }

    /// Hold the next call to `route` for `delay` before answering.
    ///
    /// The response is computed from the state at the time the call arrived.
    pub fn delay_next(&self, route: Route, delay: Duration) {
        self.data
            .lock()
            .delays
            .entry(route)
            .or_default()
            .push_back(delay);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.data.lock().calls.clone()
    }

    #[must_use]
    pub fn calls_to(&self, route: Route) -> Vec<RecordedCall> {
        self.data
            .lock()
            .calls
            .iter()
            .filter(|call| call.route == route)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn orders(&self) -> Vec<RecordedOrder> {
        self.data.lock().orders.clone()
    }

    #[must_use]
    pub fn remote_wishlist(&self) -> Vec<String> {
        self.data.lock().wishlist.clone()
    }

    #[must_use]
    pub fn remote_cart(&self) -> BTreeMap<String, u32> {
        self.data.lock().cart.clone()
    }
}

impl Drop for FakeMarket {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Record the call, then apply auth and any injected failure.
fn admit(
    data: &Shared,
    route: Route,
    headers: &HeaderMap,
    target: Option<&str>,
    body: Option<&Value>,
) -> Result<Option<Duration>, Response> {
    let mut data = data.lock();
    data.calls.push(RecordedCall {
        route,
        target: target.map(str::to_string),
        body: body.cloned(),
        idempotency_key: headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let expected = format!("Bearer {}", data.token);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return Err((StatusCode::UNAUTHORIZED, Json(json!({"message": "Not Authorized"}))).into_response());
    }

    if let Some((status, body)) = data.failures.get_mut(&route).and_then(VecDeque::pop_front) {
        return Err((status, body).into_response());
    }

    Ok(data.delays.get_mut(&route).and_then(VecDeque::pop_front))
}

async fn hold(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": format!("{what} not found")})),
    )
        .into_response()
}

fn product_by_id(data: &MarketData, id: &str) -> Option<Value> {
    data.products.iter().find(|p| p["_id"] == id).cloned()
}

async fn list_products(State(data): State<Shared>, headers: HeaderMap) -> Response {
    let delay = match admit(&data, Route::Catalog, &headers, None, None) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    let products = data.lock().products.clone();
    hold(delay).await;
    Json(products).into_response()
}

async fn get_product(
    State(data): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let delay = match admit(&data, Route::Product, &headers, Some(&id), None) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    let product = product_by_id(&data.lock(), &id);
    hold(delay).await;
    product.map_or_else(|| not_found("Product"), |p| Json(p).into_response())
}

async fn add_wishlist(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let id = body["_id"].as_str().unwrap_or_default().to_string();
    let delay = match admit(&data, Route::WishlistAdd, &headers, Some(&id), Some(&body)) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    hold(delay).await;

    let mut data = data.lock();
    if product_by_id(&data, &id).is_none() {
        return not_found("Product");
    }
    if !data.wishlist.contains(&id) {
        data.wishlist.push(id);
    }
    Json(json!(data.wishlist)).into_response()
}

async fn remove_wishlist(
    State(data): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let delay = match admit(&data, Route::WishlistRemove, &headers, Some(&id), None) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    hold(delay).await;

    let mut data = data.lock();
    data.wishlist.retain(|w| w != &id);
    Json(json!(data.wishlist)).into_response()
}

async fn add_cart(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let id = body["_id"].as_str().unwrap_or_default().to_string();
    let delay = match admit(&data, Route::CartAdd, &headers, Some(&id), Some(&body)) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    hold(delay).await;

    let qty = body["qty"]
        .as_u64()
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1);
    let mut data = data.lock();
    if product_by_id(&data, &id).is_none() {
        return not_found("Product");
    }
    *data.cart.entry(id).or_default() += qty;
    Json(json!({"ok": true})).into_response()
}

async fn remove_cart(
    State(data): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let delay = match admit(&data, Route::CartRemove, &headers, Some(&id), None) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    hold(delay).await;

    // Removing an absent product is not an error.
    data.lock().cart.remove(&id);
    Json(json!({"ok": true})).into_response()
}

async fn get_cart(State(data): State<Shared>, headers: HeaderMap) -> Response {
    let delay = match admit(&data, Route::CartFetch, &headers, None, None) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    let document = {
        let data = data.lock();
        let items: Vec<Value> = data
            .cart
            .iter()
            .filter_map(|(id, amount)| {
                product_by_id(&data, id).map(|product| {
                    json!({"_id": format!("line-{id}"), "product": product, "amount": amount})
                })
            })
            .collect();
        if items.is_empty() {
            json!([])
        } else {
            json!([{ "items": items }])
        }
    };
    hold(delay).await;
    Json(document).into_response()
}

async fn place_order(
    State(data): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let delay = match admit(&data, Route::Order, &headers, None, Some(&body)) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    hold(delay).await;

    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut data = data.lock();
    if let Some(existing) = data
        .orders
        .iter()
        .find(|o| key.is_some() && o.idempotency_key == key)
    {
        return (StatusCode::OK, Json(json!({"_id": existing.id}))).into_response();
    }

    let id = format!("order-{}", data.orders.len() + 1);
    data.orders.push(RecordedOrder {
        id: id.clone(),
        payload: body.clone(),
        idempotency_key: key,
    });
    data.cart.clear();

    (
        StatusCode::CREATED,
        Json(json!({"_id": id, "items": body["items"], "amount": body["amount"], "status": "Pending"})),
    )
        .into_response()
}

async fn get_seller(
    State(data): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let delay = match admit(&data, Route::Seller, &headers, Some(&id), None) {
        Ok(delay) => delay,
        Err(response) => return response,
    };
    let profile = data.lock().sellers.get(&id).cloned();
    hold(delay).await;
    profile.map_or_else(|| not_found("Seller"), |p| Json(p).into_response())
}

/// Poll `condition` until it holds or five seconds pass. Returns whether it held.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
