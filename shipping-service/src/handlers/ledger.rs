use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{LedgerPageResponse, LedgerQuery, RecordMovementRequest};
use crate::models::{LedgerCursor, LedgerEntry};
use crate::startup::AppState;

/// Receiving and stock corrections.
#[tracing::instrument(skip(state, request))]
pub async fn record_movement(
    State(state): State<AppState>,
    Json(request): Json<RecordMovementRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), AppError> {
    request.validate()?;

    let entry = state
        .services
        .inventory
        .record_movement(request.into())
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn product_ledger(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerPageResponse>, AppError> {
    let cursor = match query.cursor.as_deref() {
        Some(token) => Some(LedgerCursor::decode(token).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Invalid ledger cursor '{}'", token))
        })?),
        None => None,
    };

    let page = state
        .services
        .inventory
        .list_by_product(product_id, query.kind, cursor, query.page_size)
        .await?;

    Ok(Json(LedgerPageResponse {
        entries: page.entries,
        next_cursor: page.next_cursor.map(|c| c.encode()),
    }))
}
