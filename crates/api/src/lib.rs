//! HTTP API server for the orders service.
//!
//! Provides REST endpoints for accounts, profiles, followers, products, orders
//! and stock allocation, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post};
use chrono::{DateTime, Utc};
use domain::{OrderService, ProductService, ProfileService, UserService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{OrderRepository, ProductRepository, ProfileRepository, UserRepository};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// A backend that serves every repository.
pub trait Store:
    ProductRepository + OrderRepository + UserRepository + ProfileRepository + Clone + 'static
{
}

impl<T> Store for T where
    T: ProductRepository + OrderRepository + UserRepository + ProfileRepository + Clone + 'static
{
}

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub users: UserService<S>,
    pub profiles: ProfileService<S>,
    pub products: ProductService<S>,
    pub orders: OrderService<S>,
    pub environment: String,
    pub started_at: DateTime<Utc>,
}

impl<S: Store> AppState<S> {
    /// Builds every service over one store with the given call deadline.
    pub fn new(store: S, timeout: Duration, environment: impl Into<String>) -> Self {
        Self {
            users: UserService::new(store.clone()).with_timeout(timeout),
            profiles: ProfileService::new(store.clone()).with_timeout(timeout),
            products: ProductService::new(store.clone()).with_timeout(timeout),
            orders: OrderService::new(store).with_timeout(timeout),
            environment: environment.into(),
            started_at: Utc::now(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{auth, followers, orders, products, profiles};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let v1 = Router::new()
        .route("/auth/sign-up", post(auth::sign_up::<S>))
        .route("/auth/sign-in", post(auth::sign_in::<S>))
        .route(
            "/profiles/my",
            post(profiles::create_my::<S>)
                .get(profiles::get_my::<S>)
                .delete(profiles::remove_my::<S>),
        )
        .route(
            "/profiles/{id}",
            get(profiles::get::<S>).put(profiles::update::<S>),
        )
        .route(
            "/followers",
            post(followers::add::<S>).get(followers::list::<S>),
        )
        .route("/followers/{follower_id}", delete(followers::remove::<S>))
        .route(
            "/products",
            post(products::create::<S>).get(products::list::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .put(products::update::<S>)
                .delete(products::remove::<S>),
        )
        .route("/products/{id}/prices", post(products::add_price::<S>))
        .route("/orders", post(orders::create::<S>).get(orders::list::<S>))
        .route(
            "/orders/{id}",
            get(orders::get::<S>)
                .put(orders::update::<S>)
                .delete(orders::remove::<S>),
        )
        .route(
            "/orders/{id}/products",
            post(orders::add_product::<S>).get(orders::lines::<S>),
        )
        .route(
            "/orders/{id}/products/{product_id}",
            delete(orders::remove_product::<S>),
        );

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/status", get(routes::status::get::<S>))
        .nest("/v1", v1)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}
