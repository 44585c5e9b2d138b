pub mod admin;
pub mod cart;
pub mod checkout;
pub mod finance;
pub mod orders;
pub mod products;
pub mod wishlist;

use std::str::FromStr;

use actix_web::web;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::Address;
use crate::domain::product::Product;
use crate::errors::AppError;

/// Runs blocking store work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(AppError::from)
}

/// Money always leaves the API as a two-decimal string.
pub(crate) fn money(value: &BigDecimal) -> String {
    value.round(2).with_scale(2).to_string()
}

pub(crate) fn parse_money(field: &str, raw: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("{field} '{raw}' is not a valid amount")))
}

pub(crate) fn parse_enum<T: FromStr>(field: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("unknown {field} '{raw}'")))
}

// ── Shared DTOs ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Finance price once approved, supplier price before that.
    pub price: String,
    pub stock_quantity: i32,
    pub approval_status: String,
    pub created_at: String,
}

impl From<&Product> for ProductResponse {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            description: p.description.clone(),
            price: money(p.display_price()),
            stock_quantity: p.stock_quantity,
            approval_status: p.approval_status.to_string(),
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressDto {
    pub full_name: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl From<AddressDto> for Address {
    fn from(a: AddressDto) -> Self {
        Address {
            full_name: a.full_name,
            phone: a.phone,
            address_line: a.address_line,
            city: a.city,
            state: a.state,
            pincode: a.pincode,
        }
    }
}

impl From<&Address> for AddressDto {
    fn from(a: &Address) -> Self {
        Self {
            full_name: a.full_name.clone(),
            phone: a.phone.clone(),
            address_line: a.address_line.clone(),
            city: a.city.clone(),
            state: a.state.clone(),
            pincode: a.pincode.clone(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Storefront API"),
    paths(
        products::list_products,
        products::get_product,
        products::submit_product,
        cart::get_cart,
        cart::add_item,
        cart::set_quantity,
        cart::remove_item,
        cart::clear_cart,
        cart::merge_guest_cart,
        checkout::start_checkout,
        checkout::get_checkout,
        checkout::submit_address,
        checkout::choose_payment,
        checkout::go_back,
        checkout::cancel_checkout,
        checkout::commit_checkout,
        orders::list_my_orders,
        orders::watch_my_orders,
        orders::get_order,
        orders::cancel_order,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::remove_from_wishlist,
        wishlist::move_to_cart,
        finance::list_pending,
        finance::preview_margin,
        finance::approve_product,
        admin::list_orders,
        admin::update_order_status,
        admin::list_pending_review,
        admin::review_product,
        admin::delete_product,
    ),
    tags(
        (name = "products"),
        (name = "cart"),
        (name = "checkout"),
        (name = "orders"),
        (name = "wishlist"),
        (name = "finance"),
        (name = "admin"),
    )
)]
pub struct ApiDoc;
