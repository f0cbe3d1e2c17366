//! Sample storefront served behind the resilience pipeline.
//!
//! # Routes
//! - `GET /products`, `GET /products/{sku}`: cacheable reads
//! - `POST /orders`: idempotent order placement; captures payment through the
//!   `payments` breaker and enqueues a `lowStock` notification when stock
//!   runs low
//!
//! Inventory lives in process memory; it exists to exercise the pipeline.

pub mod payments;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::middleware::{Principal, ReadThroughCache};
use crate::jobs::AsyncJobDispatcher;
use crate::lifecycle::Services;
use crate::resilience::BreakerConfig;

pub use payments::{protected_charge, Charge, PaymentAction, PaymentStatus, SimulatedGateway};

pub const PAYMENTS_BREAKER: &str = "payments";
pub const NOTIFICATIONS_QUEUE: &str = "notifications";

/// Orders leaving fewer units than this trigger a `lowStock` notification.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub price_cents: u64,
    pub stock: u32,
}

impl Product {
    pub fn new(sku: &str, name: &str, price_cents: u64, stock: u32) -> Self {
        Self {
            sku: sku.to_string(),
            name: name.to_string(),
            price_cents,
            stock,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub sku: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: u64,
    pub sku: String,
    pub quantity: u32,
    pub total_cents: u64,
    pub payment: PaymentStatus,
}

#[derive(Clone)]
pub struct ShopState {
    inventory: Arc<DashMap<String, Product>>,
    next_order_id: Arc<AtomicU64>,
    payments: PaymentAction,
    dispatcher: Arc<AsyncJobDispatcher>,
    cache: Arc<ReadThroughCache>,
}

impl ShopState {
    /// Uses the configured `payments` breaker, or a default one if none is configured.
    pub fn new(services: &Services, gateway: SimulatedGateway) -> Self {
        let breaker = services
            .breakers
            .register(PAYMENTS_BREAKER, BreakerConfig::default());
        Self {
            inventory: Arc::new(DashMap::new()),
            next_order_id: Arc::new(AtomicU64::new(1)),
            payments: protected_charge(breaker, gateway),
            dispatcher: services.dispatcher.clone(),
            cache: services.cache.clone(),
        }
    }

    pub fn with_products(self, products: impl IntoIterator<Item = Product>) -> Self {
        for product in products {
            self.inventory.insert(product.sku.clone(), product);
        }
        self
    }

    pub fn product(&self, sku: &str) -> Option<Product> {
        self.inventory.get(sku).map(|p| p.value().clone())
    }

    /// Reserve `quantity` units, returning the product as it is after the reservation.
    fn reserve(&self, sku: &str, quantity: u32) -> Result<Product, OrderRejection> {
        let mut product = self.inventory.get_mut(sku).ok_or(OrderRejection::UnknownSku)?;
        if product.stock < quantity {
            return Err(OrderRejection::OutOfStock {
                available: product.stock,
            });
        }
        product.stock -= quantity;
        Ok(product.clone())
    }

    /// Drop cached reads that show this product's stock.
    async fn invalidate_product(&self, principal: Option<&Principal>, sku: &str) {
        for path in [format!("/products/{sku}"), "/products".to_string()] {
            let Ok(uri) = path.parse::<Uri>() else {
                continue;
            };
            let mut keys = vec![ReadThroughCache::cache_key(None, &uri)];
            if principal.is_some() {
                keys.push(ReadThroughCache::cache_key(principal, &uri));
            }
            for key in keys {
                if let Err(e) = self.cache.invalidate(&key).await {
                    tracing::warn!(key = %key, error = %e, "Failed to invalidate cache entry");
                }
            }
        }
    }
}

/// Demo catalog served by the binary.
pub fn sample_products() -> Vec<Product> {
    vec![
        Product::new("X1", "Trail battery pack", 4_999, 12),
        Product::new("X2", "Solar charger", 8_900, 40),
        Product::new("X3", "Headlamp", 2_450, 6),
    ]
}

pub fn shop_router(state: ShopState) -> Router {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/{sku}", get(get_product))
        .route("/orders", post(create_order))
        .with_state(state)
}

#[derive(Debug)]
enum OrderRejection {
    UnknownSku,
    ZeroQuantity,
    OutOfStock { available: u32 },
}

impl IntoResponse for OrderRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            OrderRejection::UnknownSku => (StatusCode::NOT_FOUND, "unknown sku".to_string()),
            OrderRejection::ZeroQuantity => {
                (StatusCode::UNPROCESSABLE_ENTITY, "quantity must be positive".to_string())
            }
            OrderRejection::OutOfStock { available } => (
                StatusCode::CONFLICT,
                format!("insufficient stock ({available} available)"),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn list_products(State(state): State<ShopState>) -> Json<Vec<Product>> {
    let mut products: Vec<_> = state.inventory.iter().map(|p| p.value().clone()).collect();
    products.sort_by(|a, b| a.sku.cmp(&b.sku));
    Json(products)
}

async fn get_product(
    State(state): State<ShopState>,
    Path(sku): Path<String>,
) -> Result<Json<Product>, StatusCode> {
    state.product(&sku).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn create_order(
    State(state): State<ShopState>,
    principal: Option<Extension<Principal>>,
    Json(order): Json<NewOrder>,
) -> Result<Response, OrderRejection> {
    if order.quantity == 0 {
        return Err(OrderRejection::ZeroQuantity);
    }
    let product = state.reserve(&order.sku, order.quantity)?;
    let order_id = state.next_order_id.fetch_add(1, Ordering::SeqCst);
    let total_cents = product.price_cents * u64::from(order.quantity);

    let payment = match state
        .payments
        .execute(Charge {
            order_id,
            amount_cents: total_cents,
        })
        .await
    {
        Ok(status) => status,
        // The registered fallback absorbs every breaker error.
        Err(e) => {
            tracing::error!(order_id, error = %e, "Payment failed without fallback");
            PaymentStatus::Deferred
        }
    };

    if product.stock < LOW_STOCK_THRESHOLD {
        let queue = state.dispatcher.queue(NOTIFICATIONS_QUEUE);
        state
            .dispatcher
            .enqueue(
                &queue,
                "lowStock",
                &json!({ "sku": product.sku, "remaining": product.stock }),
                None,
            )
            .await;
    }

    let principal = principal.map(|Extension(p)| p);
    state.invalidate_product(principal.as_ref(), &product.sku).await;

    tracing::info!(order_id, sku = %product.sku, quantity = order.quantity, ?payment, "Order placed");

    let receipt = OrderReceipt {
        order_id,
        sku: product.sku,
        quantity: order.quantity,
        total_cents,
        payment,
    };
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/orders/{order_id}"))],
        Json(receipt),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::jobs::{MemoryQueue, QueueProducer};
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct Fixture {
        app: Router,
        queue: MemoryQueue,
        state: ShopState,
    }

    fn fixture() -> Fixture {
        let mut config = ServiceConfig::default();
        config.queue.enabled = true;
        let queue = MemoryQueue::new();
        let producer: Arc<dyn QueueProducer> = Arc::new(queue.clone());
        let services = Services::assemble(&config, Arc::new(MemoryStore::new()), Some(producer));
        let state = ShopState::new(&services, SimulatedGateway::new())
            .with_products([Product::new("X1", "Battery", 1_000, 6)]);
        Fixture {
            app: shop_router(state.clone()),
            queue,
            state,
        }
    }

    fn order(sku: &str, quantity: u32) -> Request<Body> {
        Request::post("/orders")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::to_vec(&json!({ "sku": sku, "quantity": quantity })).unwrap(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_reserves_stock_and_captures_payment() {
        let f = fixture();
        let response = f.app.oneshot(order("X1", 1)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let receipt: OrderReceipt = serde_json::from_slice(&body).unwrap();
        assert_eq!(receipt.total_cents, 1_000);
        assert_eq!(receipt.payment, PaymentStatus::Captured);
        assert_eq!(f.state.product("X1").unwrap().stock, 5);
        assert!(f.queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_low_stock_enqueues_notification() {
        let f = fixture();
        f.app.oneshot(order("X1", 2)).await.unwrap();

        let jobs = f.queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].queue_name, NOTIFICATIONS_QUEUE);
        assert_eq!(jobs[0].job_name, "lowStock");
        assert_eq!(jobs[0].payload, json!({ "sku": "X1", "remaining": 4 }));
    }

    #[tokio::test]
    async fn test_rejections() {
        let f = fixture();
        let unknown = f.app.clone().oneshot(order("nope", 1)).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let too_many = f.app.clone().oneshot(order("X1", 7)).await.unwrap();
        assert_eq!(too_many.status(), StatusCode::CONFLICT);

        let zero = f.app.oneshot(order("X1", 0)).await.unwrap();
        assert_eq!(zero.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(f.state.product("X1").unwrap().stock, 6);
    }
}
