use std::time::Duration;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::events::ChangeEvent;
use crate::domain::identity::Identity;
use crate::domain::order::{Order, OrderItem, OrderView};
use crate::errors::AppError;
use crate::infrastructure::change_feed::Delivery;
use crate::AppState;

use super::{blocking, money, AddressDto};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: String,
}

const MAX_WAIT_MS: u64 = 60_000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct WatchParams {
    /// How long to hold the request open, in milliseconds. Defaults to
    /// 25000, capped at 60000.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
}

fn default_wait_ms() -> u64 {
    25_000
}

/// One change to the caller's orders.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderChangeResponse {
    /// Changes were missed; re-read the order list.
    pub resync: bool,
    pub order_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Product name at the time of purchase.
    pub name: String,
    pub quantity: i32,
    pub unit_price: String,
    pub supplier_status: String,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            name: item.product_snapshot.name.clone(),
            quantity: item.quantity,
            unit_price: money(&item.price),
            supplier_status: item.supplier_status.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: String,
    pub payment_method: String,
    pub payment_status: String,
    pub subtotal: String,
    pub shipping_cost: String,
    pub total: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub address: AddressDto,
    /// Index into placed, processing, shipped, delivered. Absent once cancelled.
    pub tracking_step: Option<usize>,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    pub(crate) fn summary(order: &Order) -> Self {
        Self {
            id: order.id,
            status: order.status.to_string(),
            payment_method: order.payment_method.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            subtotal: money(&order.subtotal),
            shipping_cost: money(&order.shipping_cost),
            total: money(&order.total),
            notes: order.notes.clone(),
            created_at: order.created_at.to_rfc3339(),
            address: AddressDto::from(&order.address),
            tracking_step: order.status.step_index(),
            items: vec![],
        }
    }
}

impl From<&OrderView> for OrderResponse {
    fn from(view: &OrderView) -> Self {
        Self {
            items: view.items.iter().map(OrderItemResponse::from).collect(),
            ..Self::summary(&view.order)
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /orders
///
/// The caller's orders, newest first. Cancelled orders are left out.
#[utoipa::path(
    get,
    path = "/orders",
    responses(
        (status = 200, description = "Caller's orders", body = Vec<OrderResponse>),
        (status = 401, description = "Sign in required"),
    ),
    tag = "orders"
)]
pub async fn list_my_orders(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let views = blocking(move || state.orders.list_mine(&identity)).await?;
    let body: Vec<OrderResponse> = views.iter().map(OrderResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// GET /orders/changes
///
/// Long poll: answers with the next change to one of the caller's orders, or
/// 204 when none arrives within `wait_ms`.
#[utoipa::path(
    get,
    path = "/orders/changes",
    params(
        ("wait_ms" = Option<u64>, Query, description = "Wait budget in ms (default 25000, max 60000)"),
    ),
    responses(
        (status = 200, description = "An order changed", body = OrderChangeResponse),
        (status = 204, description = "Nothing changed in time"),
        (status = 401, description = "Sign in required"),
    ),
    tag = "orders"
)]
pub async fn watch_my_orders(
    state: web::Data<AppState>,
    identity: Identity,
    query: web::Query<WatchParams>,
) -> Result<HttpResponse, AppError> {
    let mut changes = state.orders.watch_mine(&identity)?;
    let wait = Duration::from_millis(query.wait_ms.min(MAX_WAIT_MS));

    let body = match tokio::time::timeout(wait, changes.next()).await {
        Ok(Some(Delivery::Event(ChangeEvent::OrderChanged {
            order_id, status, ..
        }))) => OrderChangeResponse {
            resync: false,
            order_id: Some(order_id),
            status: Some(status.to_string()),
        },
        Ok(Some(_)) => OrderChangeResponse {
            resync: true,
            order_id: None,
            status: None,
        },
        Ok(None) | Err(_) => return Ok(HttpResponse::NoContent().finish()),
    };
    Ok(HttpResponse::Ok().json(body))
}

/// GET /orders/{id}
///
/// Tracking view of a single order with its items.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let view = blocking(move || state.orders.track(&identity, order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(&view)))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already delivered or cancelled"),
        (status = 422, description = "Empty reason"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<CancelOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let reason = body.into_inner().reason;
    let order = blocking(move || state.orders.cancel(&identity, order_id, &reason)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::summary(&order)))
}
