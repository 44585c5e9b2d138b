use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::checkout::{CheckoutStage, CheckoutWorkflow, Invoice};
use crate::domain::errors::DomainError;
use crate::domain::identity::Identity;
use crate::domain::order::PaymentMethod;
use crate::errors::AppError;
use crate::AppState;

use super::cart::CartItemResponse;
use super::{blocking, money, parse_enum, AddressDto};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChoosePaymentRequest {
    /// One of `cod`, `upi`, `card`.
    pub payment_method: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceResponse {
    pub address: AddressDto,
    pub payment_method: String,
    pub items: Vec<CartItemResponse>,
    pub subtotal: String,
    pub shipping_cost: String,
    pub total: String,
}

impl From<&Invoice> for InvoiceResponse {
    fn from(invoice: &Invoice) -> Self {
        Self {
            address: AddressDto::from(&invoice.address),
            payment_method: invoice.payment_method.as_str().to_string(),
            items: invoice
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
            subtotal: money(&invoice.totals.subtotal),
            shipping_cost: money(&invoice.totals.shipping_cost),
            total: money(&invoice.totals.total),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    /// `closed`, `address`, `payment` or `invoice`.
    pub stage: String,
    pub address: AddressDto,
    pub payment_method: Option<String>,
    /// Present on the invoice step only.
    pub invoice: Option<InvoiceResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommitResponse {
    pub order_id: Uuid,
}

fn describe(
    state: &AppState,
    identity: &Identity,
    workflow: &CheckoutWorkflow,
) -> Result<CheckoutResponse, DomainError> {
    let invoice = match workflow.stage() {
        CheckoutStage::Invoice => Some(InvoiceResponse::from(
            &state.checkout.invoice(identity, workflow)?,
        )),
        _ => None,
    };
    Ok(CheckoutResponse {
        stage: workflow.stage().as_str().to_string(),
        address: AddressDto::from(workflow.address()),
        payment_method: workflow.payment_method().map(|m| m.as_str().to_string()),
        invoice,
    })
}

/// Runs `apply` on the caller's wizard and describes the result.
async fn step(
    state: web::Data<AppState>,
    identity: Identity,
    apply: impl FnOnce(&mut CheckoutWorkflow) -> Result<(), DomainError> + Send + 'static,
) -> Result<HttpResponse, AppError> {
    let body = blocking(move || {
        let user_id = identity.require_user()?;
        let ((), workflow) = state.checkouts.update(user_id, apply)?;
        describe(&state, &identity, &workflow)
    })
    .await?;
    Ok(HttpResponse::Ok().json(body))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /checkout
///
/// Opens the wizard at the address step.
#[utoipa::path(
    post,
    path = "/checkout",
    responses(
        (status = 200, description = "Wizard state", body = CheckoutResponse),
        (status = 401, description = "Sign in required"),
    ),
    tag = "checkout"
)]
pub async fn start_checkout(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    step(state, identity, |w| {
        w.start();
        Ok(())
    })
    .await
}

#[utoipa::path(
    get,
    path = "/checkout",
    responses((status = 200, description = "Wizard state", body = CheckoutResponse)),
    tag = "checkout"
)]
pub async fn get_checkout(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    step(state, identity, |_| Ok(())).await
}

#[utoipa::path(
    put,
    path = "/checkout/address",
    request_body = AddressDto,
    responses(
        (status = 200, description = "Moved to the payment step", body = CheckoutResponse),
        (status = 422, description = "Missing address field or wrong step"),
    ),
    tag = "checkout"
)]
pub async fn submit_address(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<AddressDto>,
) -> Result<HttpResponse, AppError> {
    let address = body.into_inner().into();
    step(state, identity, move |w| Ok(w.submit_address(address)?)).await
}

#[utoipa::path(
    put,
    path = "/checkout/payment",
    request_body = ChoosePaymentRequest,
    responses(
        (status = 200, description = "Moved to the invoice step", body = CheckoutResponse),
        (status = 422, description = "Unknown method or wrong step"),
    ),
    tag = "checkout"
)]
pub async fn choose_payment(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<ChoosePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let method: PaymentMethod = parse_enum("payment method", &body.payment_method)?;
    step(state, identity, move |w| Ok(w.choose_payment(method)?)).await
}

#[utoipa::path(
    post,
    path = "/checkout/back",
    responses((status = 200, description = "Previous step", body = CheckoutResponse)),
    tag = "checkout"
)]
pub async fn go_back(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    step(state, identity, |w| Ok(w.back()?)).await
}

#[utoipa::path(
    delete,
    path = "/checkout",
    responses((status = 200, description = "Wizard closed", body = CheckoutResponse)),
    tag = "checkout"
)]
pub async fn cancel_checkout(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    step(state, identity, |w| {
        w.cancel();
        Ok(())
    })
    .await
}

/// POST /checkout/commit
///
/// Places the order. The order, its items, the stock decrement and the cart
/// clear are written together or not at all.
#[utoipa::path(
    post,
    path = "/checkout/commit",
    responses(
        (status = 201, description = "Order placed", body = CommitResponse),
        (status = 409, description = "Cart changed while the order was being placed"),
        (status = 422, description = "Empty cart, wrong step or insufficient stock"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "checkout"
)]
pub async fn commit_checkout(
    state: web::Data<AppState>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    let order_id = blocking(move || {
        let user_id = identity.require_user()?;
        let (order_id, _) = state
            .checkouts
            .update(user_id, |w| state.checkout.commit(&identity, w))?;
        Ok(order_id)
    })
    .await?;
    Ok(HttpResponse::Created().json(CommitResponse { order_id }))
}
