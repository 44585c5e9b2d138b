use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::catalog_service::Submission;
use crate::domain::identity::Identity;
use crate::errors::AppError;
use crate::AppState;

use super::{blocking, parse_money, ProductResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitProductRequest {
    pub name: String,
    pub description: Option<String>,
    /// Decimal price as a string, e.g. "100.00"
    pub supplier_price: String,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
}

/// GET /products
///
/// Products open for purchase, newest first.
#[utoipa::path(
    get,
    path = "/products",
    responses(
        (status = 200, description = "Purchasable products", body = Vec<ProductResponse>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "products"
)]
pub async fn list_products(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = blocking(move || state.catalog.list_purchasable()).await?;
    let body: Vec<ProductResponse> = products.iter().map(ProductResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    params(("id" = Uuid, Path, description = "Product UUID")),
    responses(
        (status = 200, description = "Product found", body = ProductResponse),
        (status = 404, description = "Product not found or not visible"),
    ),
    tag = "products"
)]
pub async fn get_product(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let product = blocking(move || state.catalog.get(&identity, product_id)).await?;
    Ok(HttpResponse::Ok().json(ProductResponse::from(&product)))
}

/// POST /supplier/products
///
/// Supplier submission; the product waits for admin review.
#[utoipa::path(
    post,
    path = "/supplier/products",
    request_body = SubmitProductRequest,
    responses(
        (status = 201, description = "Submitted for review", body = ProductResponse),
        (status = 403, description = "Supplier role required"),
        (status = 422, description = "Invalid submission"),
    ),
    tag = "products"
)]
pub async fn submit_product(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<SubmitProductRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let submission = Submission {
        supplier_price: parse_money("supplier_price", &body.supplier_price)?,
        name: body.name,
        description: body.description,
        stock_quantity: body.stock_quantity,
        image_url: body.image_url,
    };
    let created = blocking(move || state.catalog.submit(&identity, submission)).await?;
    Ok(HttpResponse::Created().json(ProductResponse::from(&created)))
}
