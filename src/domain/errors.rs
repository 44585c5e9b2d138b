use thiserror::Error;
use uuid::Uuid;

use super::order::OrderStatus;

/// Rejections raised locally, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Price must be greater than zero")]
    NonPositivePrice,
    #[error("Quantity must be at least 1")]
    NonPositiveQuantity,
    #[error("At most {max} of one product fit in a cart")]
    QuantityTooLarge { max: i32 },
    #[error("Address field '{0}' is required")]
    MissingAddressField(&'static str),
    #[error("A cancellation reason is required")]
    EmptyCancellationReason,
    #[error("Product {0} is not available for purchase")]
    NotPurchasable(Uuid),
    #[error("Only {available} of product {product_id} in stock, {requested} requested")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },
    #[error("Checkout is at the {actual} step, expected {expected}")]
    CheckoutStage {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Sign in to continue")]
    LoginRequired,
    #[error("Field '{0}' is required")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Store unavailable: {0}")]
    Transport(String),
}

impl DomainError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }
}
