pub mod cart_repo;
pub mod change_feed;
pub mod guest_cart;
pub mod memory;
pub mod models;
pub mod notifier;
pub mod order_repo;
pub mod outbox;
pub mod product_repo;
pub mod wishlist_repo;

use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::domain::errors::DomainError;

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<DieselError> for DomainError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DomainError::Conflict(info.message().to_string())
            }
            DieselError::NotFound => DomainError::NotFound("Record"),
            other => DomainError::Transport(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Transport(e.to_string())
    }
}
