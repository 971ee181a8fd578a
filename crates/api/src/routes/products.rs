//! Product catalogue endpoints.
//!
//! Every handler requires a caller identity. The catalogue itself is shared.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use store::{NewProduct, Price, Product, ProductUpdate};

use super::{Created, Envelope, data, done};
use crate::error::ApiError;
use crate::extract::{CallerId, JsonBody, parse_id};
use crate::{AppState, Store};

/// POST /v1/products: create a product, optionally with prices.
#[tracing::instrument(skip(state, product))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(_caller): CallerId,
    JsonBody(product): JsonBody<NewProduct>,
) -> Result<(StatusCode, Json<Envelope<Created<ProductId>>>), ApiError> {
    let id = state.products.create(product).await?;
    Ok((StatusCode::CREATED, data(Created { id })))
}

/// GET /v1/products
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(_caller): CallerId,
) -> Result<Json<Envelope<Vec<Product>>>, ApiError> {
    Ok(data(state.products.get_all().await?))
}

/// GET /v1/products/{id}: a product with its prices.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(_caller): CallerId,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Product>>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    Ok(data(state.products.get_by_id(id).await?))
}

/// PUT /v1/products/{id}: partial update.
#[tracing::instrument(skip(state, update))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(_caller): CallerId,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<ProductUpdate>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    state.products.update(id, update).await?;
    Ok(done())
}

/// DELETE /v1/products/{id}
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(_caller): CallerId,
    Path(id): Path<String>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    state.products.remove(id).await?;
    Ok(done())
}

/// POST /v1/products/{id}/prices: set the price in one currency.
#[tracing::instrument(skip(state, price))]
pub async fn add_price<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    CallerId(_caller): CallerId,
    Path(id): Path<String>,
    JsonBody(price): JsonBody<Price>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    state.products.add_price(id, price).await?;
    Ok(done())
}
