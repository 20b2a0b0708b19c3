//! Request and response bodies of the HTTP surface.

use crate::models::{
    LedgerEntry, ListOrdersFilter, MovementKind, OrderStatus, OrderType, Packaging, PaymentStatus,
    ShippingOrder,
};
use crate::services::{CreateOrder, ItemInput, MovementRequest, UpdateOrder};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ItemRequest {
    #[validate(length(min = 1, max = 64, message = "Product code must be 1-64 characters"))]
    pub product_code: String,
    #[validate(range(min = 1, max = 1_000_000_000, message = "Quantity must be between 1 and 1000000000"))]
    pub quantity: i64,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
    pub packaging: Option<Packaging>,
}

impl From<ItemRequest> for ItemInput {
    fn from(item: ItemRequest) -> Self {
        ItemInput {
            product_code: item.product_code,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_total: item.line_total,
            packaging: item.packaging,
        }
    }
}

fn default_order_type() -> OrderType {
    OrderType::Shipping
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 64, message = "Order number must be 1-64 characters"))]
    pub order_number: Option<String>,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub counterparty_ref: Option<Uuid>,
    #[validate(length(max = 255))]
    pub counterparty_name: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one item"), nested)]
    pub items: Vec<ItemRequest>,
    pub payment_status: Option<PaymentStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub allow_negative: Option<bool>,
}

impl From<CreateOrderRequest> for CreateOrder {
    fn from(req: CreateOrderRequest) -> Self {
        CreateOrder {
            order_number: req.order_number,
            order_type: req.order_type,
            counterparty_ref: req.counterparty_ref,
            counterparty_name: req.counterparty_name,
            items: req.items.into_iter().map(ItemInput::from).collect(),
            payment_status: req.payment_status,
            notes: req.notes,
            allow_negative: req.allow_negative,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Option<Vec<ItemRequest>>,
    pub counterparty_ref: Option<Uuid>,
    #[validate(length(max = 255))]
    pub counterparty_name: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub allow_negative: Option<bool>,
}

impl From<UpdateOrderRequest> for UpdateOrder {
    fn from(req: UpdateOrderRequest) -> Self {
        UpdateOrder {
            items: req
                .items
                .map(|items| items.into_iter().map(ItemInput::from).collect()),
            counterparty_ref: req.counterparty_ref,
            counterparty_name: req.counterparty_name,
            payment_status: req.payment_status,
            notes: req.notes,
            allow_negative: req.allow_negative,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub order_type: Option<OrderType>,
    pub counterparty_ref: Option<Uuid>,
    pub include_deleted: Option<bool>,
    pub page_size: Option<i64>,
    pub page_token: Option<Uuid>,
}

impl From<ListOrdersQuery> for ListOrdersFilter {
    fn from(q: ListOrdersQuery) -> Self {
        ListOrdersFilter {
            status: q.status,
            order_type: q.order_type,
            counterparty_ref: q.counterparty_ref,
            include_deleted: q.include_deleted.unwrap_or(false),
            page_size: q.page_size.unwrap_or(50),
            page_token: q.page_token,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<ShippingOrder>,
    pub next_page_token: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordMovementRequest {
    pub product_ref: Uuid,
    pub kind: MovementKind,
    pub quantity: i64,
    pub unit_amount: Decimal,
    pub occurred_at: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

impl From<RecordMovementRequest> for MovementRequest {
    fn from(req: RecordMovementRequest) -> Self {
        MovementRequest {
            product_ref: req.product_ref,
            kind: req.kind,
            signed_quantity: req.quantity,
            unit_amount: req.unit_amount,
            occurred_at: req.occurred_at,
            note: req.note,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub kind: Option<MovementKind>,
    /// Opaque token from a previous page's `next_cursor`.
    pub cursor: Option<String>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LedgerPageResponse {
    pub entries: Vec<LedgerEntry>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub product_ref: Uuid,
    pub product_code: String,
    pub on_hand: i64,
    pub exclude_from_stock: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CostQuoteRequest {
    #[validate(range(min = 1, max = 1_000_000_000, message = "Quantity must be between 1 and 1000000000"))]
    pub quantity: i64,
    #[serde(default)]
    pub unit_revenue: Decimal,
}
