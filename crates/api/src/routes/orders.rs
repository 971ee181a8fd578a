//! Order and allocation endpoints.
//!
//! Every handler acts on behalf of the caller named by `X-User-Id`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId, UserId};
use serde::Deserialize;
use store::{NewOrder, Order, OrderLine, OrderLineView};

use super::{Created, Envelope, data, done};
use crate::error::ApiError;
use crate::extract::{CallerId, JsonBody, parse_id};
use crate::{AppState, Store};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Defaults to the caller. Naming anyone else is forbidden.
    pub user_id: Option<UserId>,
    pub number: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub number: i32,
}

#[derive(Debug, Deserialize)]
pub struct AddProductRequest {
    pub product_id: ProductId,
    pub amount: i32,
}

// -- Handlers --

/// POST /v1/orders: create an order, or return the caller's existing order
/// with the same number.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    JsonBody(req): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Envelope<Created<OrderId>>>), ApiError> {
    let user_id = req.user_id.unwrap_or(caller);
    if user_id != caller {
        return Err(ApiError::Forbidden);
    }

    let id = state
        .orders
        .create(NewOrder {
            user_id,
            number: req.number,
        })
        .await?;
    Ok((StatusCode::CREATED, data(Created { id })))
}

/// GET /v1/orders: the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
) -> Result<Json<Envelope<Vec<Order>>>, ApiError> {
    Ok(data(state.orders.get_all_by_user(caller).await?))
}

/// GET /v1/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(data(state.orders.get_by_id(caller, id).await?))
}

/// PUT /v1/orders/{id}: renumber an order.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateOrderRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    state
        .orders
        .update(
            caller,
            Order {
                id,
                user_id: caller,
                number: req.number,
            },
        )
        .await?;
    Ok(done())
}

/// DELETE /v1/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    state.orders.remove(caller, id).await?;
    Ok(done())
}

/// POST /v1/orders/{id}/products: allocate stock to the order.
#[tracing::instrument(skip(state, req))]
pub async fn add_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<AddProductRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    state
        .orders
        .add_product(
            caller,
            OrderLine {
                order_id,
                product_id: req.product_id,
                amount: req.amount,
            },
        )
        .await?;
    Ok(done())
}

/// GET /v1/orders/{id}/products
#[tracing::instrument(skip(state))]
pub async fn lines<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Vec<OrderLineView>>>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(data(state.orders.get_lines(caller, id).await?))
}

/// DELETE /v1/orders/{id}/products/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove_product<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(caller): CallerId,
    Path((id, product_id)): Path<(String, String)>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let product_id: ProductId = parse_id(&product_id)?;
    state
        .orders
        .remove_product(caller, order_id, product_id)
        .await?;
    Ok(done())
}
