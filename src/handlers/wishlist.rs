use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::wishlist_service::{MoveOutcome, WishlistOutcome};
use crate::domain::identity::Identity;
use crate::domain::wishlist::WishlistEntry;
use crate::errors::AppError;
use crate::AppState;

use super::{blocking, ProductResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToWishlistRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WishlistItemResponse {
    pub product_id: Uuid,
    /// Absent when the product has since been removed from the catalog.
    pub product: Option<ProductResponse>,
    pub added_at: String,
}

impl From<&WishlistEntry> for WishlistItemResponse {
    fn from(entry: &WishlistEntry) -> Self {
        Self {
            product_id: entry.product_id,
            product: entry.product.as_ref().map(ProductResponse::from),
            added_at: entry.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WishlistStatusResponse {
    /// `added`, `already_present`, `moved` or `already_in_cart`.
    pub status: String,
}

fn status(label: &str) -> HttpResponse {
    HttpResponse::Ok().json(WishlistStatusResponse {
        status: label.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/wishlist",
    responses(
        (status = 200, description = "Wishlist, newest first", body = Vec<WishlistItemResponse>),
        (status = 401, description = "Sign in required"),
    ),
    tag = "wishlist"
)]
pub async fn list_wishlist(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let entries = blocking(move || state.wishlist.list(&identity)).await?;
    let body: Vec<WishlistItemResponse> = entries.iter().map(WishlistItemResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /wishlist
///
/// Adding a product that is already saved is not an error.
#[utoipa::path(
    post,
    path = "/wishlist",
    request_body = AddToWishlistRequest,
    responses(
        (status = 200, description = "Outcome of the add", body = WishlistStatusResponse),
        (status = 404, description = "Product not found"),
    ),
    tag = "wishlist"
)]
pub async fn add_to_wishlist(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<AddToWishlistRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = body.into_inner().product_id;
    let outcome = blocking(move || state.wishlist.add(&identity, product_id)).await?;
    Ok(status(match outcome {
        WishlistOutcome::Added => "added",
        WishlistOutcome::AlreadyPresent => "already_present",
    }))
}

#[utoipa::path(
    delete,
    path = "/wishlist/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product UUID")),
    responses((status = 204, description = "Removed")),
    tag = "wishlist"
)]
pub async fn remove_from_wishlist(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    blocking(move || state.wishlist.remove(&identity, product_id)).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /wishlist/{product_id}/move-to-cart
///
/// One unit goes to the cart. When the cart already holds the product the
/// wishlist entry is kept.
#[utoipa::path(
    post,
    path = "/wishlist/{product_id}/move-to-cart",
    params(("product_id" = Uuid, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "Outcome of the move", body = WishlistStatusResponse),
        (status = 404, description = "Product not found"),
        (status = 422, description = "Product not purchasable"),
    ),
    tag = "wishlist"
)]
pub async fn move_to_cart(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let outcome = blocking(move || state.wishlist.move_to_cart(&identity, product_id)).await?;
    Ok(status(match outcome {
        MoveOutcome::Moved => "moved",
        MoveOutcome::AlreadyInCart => "already_in_cart",
    }))
}
