use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::events::ChangeEvent;
use crate::domain::identity::{Identity, Role};
use crate::domain::product::{ApprovalStatus, PendingProduct};
use crate::errors::AppError;
use crate::AppState;

use super::{blocking, money, parse_money, ProductResponse};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub supplier_price: String,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
    pub supplier_name: String,
    pub supplier_email: String,
    pub created_at: String,
}

impl From<&PendingProduct> for PendingProductResponse {
    fn from(p: &PendingProduct) -> Self {
        Self {
            id: p.product.id,
            name: p.product.name.clone(),
            description: p.product.description.clone(),
            supplier_price: money(&p.product.supplier_price),
            stock_quantity: p.product.stock_quantity,
            image_url: p.image_url.clone(),
            supplier_name: p.supplier_name.clone(),
            supplier_email: p.supplier_email.clone(),
            created_at: p.product.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarginParams {
    /// Candidate selling price, e.g. "120.00"
    pub price: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarginResponse {
    pub product_id: Uuid,
    pub supplier_price: String,
    pub final_price: String,
    /// Percentage over the supplier price.
    pub margin: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveRequest {
    /// Decimal price as a string, e.g. "120.00"
    pub final_price: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /finance/pending
///
/// Products waiting for a selling price, newest first. Served from the live
/// board, which follows the change feed.
#[utoipa::path(
    get,
    path = "/finance/pending",
    responses(
        (status = 200, description = "Pending products", body = Vec<PendingProductResponse>),
        (status = 403, description = "Finance role required"),
    ),
    tag = "finance"
)]
pub async fn list_pending(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let body = blocking(move || {
        identity.require_role(Role::Finance)?;
        let entries = state.pending_entries()?;
        Ok(entries
            .iter()
            .map(PendingProductResponse::from)
            .collect::<Vec<_>>())
    })
    .await?;
    Ok(HttpResponse::Ok().json(body))
}

#[utoipa::path(
    get,
    path = "/finance/products/{id}/margin",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
        ("price" = String, Query, description = "Candidate selling price"),
    ),
    responses(
        (status = 200, description = "Margin at the given price", body = MarginResponse),
        (status = 404, description = "Product not found"),
    ),
    tag = "finance"
)]
pub async fn preview_margin(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    query: web::Query<MarginParams>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let price = parse_money("price", &query.price)?;
    let quote =
        blocking(move || state.approvals.margin_preview(&identity, product_id, price)).await?;
    Ok(HttpResponse::Ok().json(MarginResponse {
        product_id: quote.product_id,
        supplier_price: money(&quote.supplier_price),
        final_price: money(&quote.final_price),
        margin: money(&quote.margin),
    }))
}

/// POST /finance/products/{id}/approve
///
/// Sets the selling price and opens the product for sale. The product leaves
/// the pending board before the response goes out.
#[utoipa::path(
    post,
    path = "/finance/products/{id}/approve",
    params(("id" = Uuid, Path, description = "Product UUID")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Approved", body = ProductResponse),
        (status = 403, description = "Finance role required"),
        (status = 409, description = "Product is not awaiting a price"),
        (status = 422, description = "Price must be positive"),
    ),
    tag = "finance"
)]
pub async fn approve_product(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<ApproveRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let final_price = parse_money("final_price", &body.final_price)?;
    let approved = blocking(move || {
        let approved = state
            .approvals
            .approve_with_price(&identity, product_id, final_price)?;
        state.reconcile_pending(&ChangeEvent::ProductChanged {
            product_id,
            old_status: Some(ApprovalStatus::FinancePending),
            new_status: Some(approved.approval_status),
        })?;
        Ok(approved)
    })
    .await?;
    Ok(HttpResponse::Ok().json(ProductResponse::from(&approved)))
}
