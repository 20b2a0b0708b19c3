use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CostQuoteRequest, StockResponse};
use crate::error::ShippingError;
use crate::models::{CostBreakdown, Product, ProfitReport};
use crate::startup::AppState;

async fn find_product(state: &AppState, id: Uuid) -> Result<Product, ShippingError> {
    state
        .catalog
        .product_by_id(id)
        .await?
        .ok_or_else(|| ShippingError::ProductNotFound(id.to_string()))
}

pub async fn product_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<StockResponse>, AppError> {
    let product = find_product(&state, product_id).await?;
    let on_hand = state.services.stock.on_hand(product.id).await?;

    Ok(Json(StockResponse {
        product_ref: product.id,
        product_code: product.code,
        on_hand,
        exclude_from_stock: product.exclude_from_stock,
    }))
}

#[tracing::instrument(skip(state, request))]
pub async fn cost_quote(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<CostQuoteRequest>,
) -> Result<Json<CostBreakdown>, AppError> {
    request.validate()?;

    let breakdown = state
        .services
        .fifo
        .cost_and_profit(product_id, request.quantity, request.unit_revenue)
        .await?;

    Ok(Json(breakdown))
}

pub async fn product_profit(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ProfitReport>, AppError> {
    Ok(Json(state.services.fifo.product_report(product_id).await?))
}
