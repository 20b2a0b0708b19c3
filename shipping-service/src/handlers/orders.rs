use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    ChangeStatusRequest, CreateOrderRequest, ListOrdersQuery, OrderListResponse,
    UpdateOrderRequest,
};
use crate::models::{ProfitReport, ShippingOrder};
use crate::services::{OrderOutcome, TransitionOutcome};
use crate::startup::AppState;

#[tracing::instrument(skip(state, request))]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderOutcome>), AppError> {
    request.validate()?;

    let outcome = state.services.orders.create(request.into()).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, AppError> {
    let (orders, next_page_token) = state.services.orders.list(query.into()).await?;

    Ok(Json(OrderListResponse {
        orders,
        next_page_token,
    }))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShippingOrder>, AppError> {
    Ok(Json(state.services.orders.get(id).await?))
}

#[tracing::instrument(skip(state, request))]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<OrderOutcome>, AppError> {
    request.validate()?;
    for item in request.items.iter().flatten() {
        item.validate()?;
    }

    let outcome = state.services.orders.update(id, request.into()).await?;

    Ok(Json(outcome))
}

#[tracing::instrument(skip(state))]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShippingOrder>, AppError> {
    Ok(Json(state.services.orders.delete(id).await?))
}

#[tracing::instrument(skip(state, request))]
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome = state
        .services
        .orders
        .change_status(id, request.status)
        .await?;

    Ok(Json(outcome))
}

pub async fn order_profit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProfitReport>, AppError> {
    let order = state.services.orders.get(id).await?;
    let report = state.services.fifo.order_report(order.id).await?;

    Ok(Json(report))
}
