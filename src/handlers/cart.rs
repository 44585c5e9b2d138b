use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::cart::CartView;
use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::identity::Identity;
use crate::errors::AppError;
use crate::AppState;

use super::{blocking, money};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    /// Defaults to 1. The line may hold at most 9999 units.
    #[serde(default = "default_quantity")]
    #[schema(minimum = 1, maximum = 9999)]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetQuantityRequest {
    /// Zero or less removes the line; at most 9999.
    #[schema(maximum = 9999)]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Absent when the product no longer exists.
    pub name: Option<String>,
    pub unit_price: Option<String>,
    pub line_total: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    pub item_count: i64,
    pub total: String,
}

impl From<&CartView> for CartResponse {
    fn from(view: &CartView) -> Self {
        Self {
            items: view
                .entries
                .iter()
                .map(|e| CartItemResponse {
                    product_id: e.product_id,
                    quantity: e.quantity,
                    name: e.product.as_ref().map(|p| p.name.clone()),
                    unit_price: e.product.as_ref().map(|p| money(p.display_price())),
                    line_total: money(&e.line_total()),
                })
                .collect(),
            item_count: view.item_count(),
            total: money(&view.total()),
        }
    }
}

fn ok(view: CartView) -> HttpResponse {
    HttpResponse::Ok().json(CartResponse::from(&view))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /cart
///
/// The caller's cart: the persisted one when signed in, otherwise the guest
/// slot named by `X-Guest-Session`.
#[utoipa::path(
    get,
    path = "/cart",
    responses(
        (status = 200, description = "Current cart", body = CartResponse),
        (status = 401, description = "Neither signed in nor a guest session"),
    ),
    tag = "cart"
)]
pub async fn get_cart(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let view = blocking(move || state.cart.view(identity.cart_owner()?)).await?;
    Ok(ok(view))
}

#[utoipa::path(
    post,
    path = "/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Cart after the add", body = CartResponse),
        (status = 404, description = "Product not found"),
        (status = 422, description = "Product not purchasable or bad quantity"),
    ),
    tag = "cart"
)]
pub async fn add_item(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<AddItemRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let view = blocking(move || {
        state
            .cart
            .add(identity.cart_owner()?, body.product_id, body.quantity)
    })
    .await?;
    Ok(ok(view))
}

#[utoipa::path(
    put,
    path = "/cart/items/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product UUID")),
    request_body = SetQuantityRequest,
    responses((status = 200, description = "Cart after the change", body = CartResponse)),
    tag = "cart"
)]
pub async fn set_quantity(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<SetQuantityRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let quantity = body.into_inner().quantity;
    let view = blocking(move || {
        state
            .cart
            .set_quantity(identity.cart_owner()?, product_id, quantity)
    })
    .await?;
    Ok(ok(view))
}

#[utoipa::path(
    delete,
    path = "/cart/items/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product UUID")),
    responses((status = 200, description = "Cart after the removal", body = CartResponse)),
    tag = "cart"
)]
pub async fn remove_item(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let view = blocking(move || state.cart.remove(identity.cart_owner()?, product_id)).await?;
    Ok(ok(view))
}

#[utoipa::path(
    delete,
    path = "/cart",
    responses((status = 200, description = "Empty cart", body = CartResponse)),
    tag = "cart"
)]
pub async fn clear_cart(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let view = blocking(move || state.cart.clear(identity.cart_owner()?)).await?;
    Ok(ok(view))
}

/// POST /cart/merge
///
/// Moves the guest slot named by `X-Guest-Session` into the signed-in
/// user's cart.
#[utoipa::path(
    post,
    path = "/cart/merge",
    responses(
        (status = 200, description = "Merged cart", body = CartResponse),
        (status = 401, description = "Not signed in"),
        (status = 422, description = "No guest session given"),
    ),
    tag = "cart"
)]
pub async fn merge_guest_cart(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let view = blocking(move || {
        let user_id = identity.require_user()?;
        let session = identity
            .guest_session
            .ok_or(DomainError::Validation(ValidationError::MissingField(
                "X-Guest-Session",
            )))?;
        state.cart.merge_guest_cart(session, user_id)
    })
    .await?;
    Ok(ok(view))
}
