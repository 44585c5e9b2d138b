use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::catalog_service::ReviewDecision;
use crate::domain::events::ChangeEvent;
use crate::domain::identity::Identity;
use crate::domain::order::OrderStatus;
use crate::domain::product::ApprovalStatus;
use crate::errors::AppError;
use crate::AppState;

use super::orders::OrderResponse;
use super::{blocking, parse_enum, ProductResponse};

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersParams {
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

// ── Request DTOs ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// `processing`, `shipped`, `delivered` or `cancelled`.
    pub status: String,
    /// Required when cancelling.
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    /// `forward` sends the product to finance, `reject` ends its review.
    pub decision: String,
    /// Optional stock correction applied when forwarding.
    pub stock_quantity: Option<i32>,
}

// ── Orders ───────────────────────────────────────────────────────────────────

/// GET /admin/orders
///
/// Returns a paginated list of orders (without their items).
#[utoipa::path(
    get,
    path = "/admin/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number (1-based, default 1)"),
        ("limit" = Option<i64>, Query, description = "Items per page (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 403, description = "Admin role required"),
    ),
    tag = "admin"
)]
pub async fn list_orders(
    state: web::Data<AppState>,
    identity: Identity,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 100);

    let result = blocking(move || state.orders.list(&identity, page, limit)).await?;
    Ok(HttpResponse::Ok().json(ListOrdersResponse {
        items: result.items.iter().map(OrderResponse::summary).collect(),
        total: result.total,
        page,
        limit,
    }))
}

#[utoipa::path(
    put,
    path = "/admin/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Transition not allowed"),
    ),
    tag = "admin"
)]
pub async fn update_order_status(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();
    let to: OrderStatus = parse_enum("order status", &body.status)?;
    let order =
        blocking(move || state.orders.advance(&identity, order_id, to, body.notes)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::summary(&order)))
}

// ── Catalog review ───────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/admin/products/pending",
    responses(
        (status = 200, description = "Submissions awaiting review", body = Vec<ProductResponse>),
        (status = 403, description = "Admin role required"),
    ),
    tag = "admin"
)]
pub async fn list_pending_review(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let products = blocking(move || state.catalog.list_pending_review(&identity)).await?;
    let body: Vec<ProductResponse> = products.iter().map(ProductResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /admin/products/{id}/review
///
/// Forwarded products show up on the finance board straight away.
#[utoipa::path(
    post,
    path = "/admin/products/{id}/review",
    params(("id" = Uuid, Path, description = "Product UUID")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Reviewed", body = ProductResponse),
        (status = 409, description = "Product is not awaiting review"),
        (status = 422, description = "Unknown decision"),
    ),
    tag = "admin"
)]
pub async fn review_product(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<ReviewRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let body = body.into_inner();
    let decision = match body.decision.trim() {
        "forward" => ReviewDecision::Forward {
            stock_quantity: body.stock_quantity,
        },
        "reject" => ReviewDecision::Reject,
        other => {
            return Err(AppError::Validation(format!(
                "unknown review decision '{other}'"
            )))
        }
    };

    let reviewed = blocking(move || {
        let reviewed = state.catalog.review(&identity, product_id, decision)?;
        state.reconcile_pending(&ChangeEvent::ProductChanged {
            product_id,
            old_status: Some(ApprovalStatus::Pending),
            new_status: Some(reviewed.approval_status),
        })?;
        Ok(reviewed)
    })
    .await?;
    Ok(HttpResponse::Ok().json(ProductResponse::from(&reviewed)))
}

#[utoipa::path(
    delete,
    path = "/admin/products/{id}",
    params(("id" = Uuid, Path, description = "Product UUID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Product not found"),
    ),
    tag = "admin"
)]
pub async fn delete_product(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    blocking(move || {
        state.catalog.delete(&identity, product_id)?;
        state.reconcile_pending(&ChangeEvent::ProductChanged {
            product_id,
            old_status: None,
            new_status: None,
        })
    })
    .await?;
    Ok(HttpResponse::NoContent().finish())
}
