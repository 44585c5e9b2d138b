use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use uuid::Uuid;

use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::identity::{Identity, Role};
use crate::domain::notice::Notice;
use crate::domain::ports::{Notifier, ProductRepository};
use crate::domain::product::{ApprovalStatus, NewProduct, Product, ProductPatch};

/// What a supplier sends in for review.
#[derive(Debug, Clone)]
pub struct Submission {
    pub name: String,
    pub description: Option<String>,
    pub supplier_price: BigDecimal,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Hand over to finance, optionally correcting the stock count.
    Forward { stock_quantity: Option<i32> },
    Reject,
}

pub struct CatalogService {
    products: Arc<dyn ProductRepository>,
    notifier: Arc<dyn Notifier>,
}

impl CatalogService {
    pub fn new(products: Arc<dyn ProductRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { products, notifier }
    }

    /// Approved products, newest first.
    pub fn list_purchasable(&self) -> Result<Vec<Product>, DomainError> {
        self.products.list_by_status(ApprovalStatus::Approved)
    }

    /// Unapproved products are only visible to staff and their supplier.
    pub fn get(&self, identity: &Identity, product_id: Uuid) -> Result<Product, DomainError> {
        let product = self
            .products
            .find(product_id)?
            .ok_or(DomainError::NotFound("Product"))?;
        let visible = product.is_purchasable()
            || identity.has_role(Role::Admin)
            || identity.has_role(Role::Finance)
            || (identity.user_id.is_some() && identity.user_id == product.supplier_id);
        if visible {
            Ok(product)
        } else {
            Err(DomainError::NotFound("Product"))
        }
    }

    pub fn submit(&self, identity: &Identity, submission: Submission) -> Result<Product, DomainError> {
        let supplier_id = identity.require_role(Role::Supplier)?;
        let name = submission.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        if submission.supplier_price < BigDecimal::zero() {
            return Err(ValidationError::NonPositivePrice.into());
        }
        if submission.stock_quantity < 0 {
            return Err(ValidationError::NonPositiveQuantity.into());
        }

        let created = self.products.insert(NewProduct {
            supplier_id,
            name,
            description: submission.description,
            supplier_price: submission.supplier_price,
            stock_quantity: submission.stock_quantity,
            image_url: submission.image_url,
        })?;
        log::info!("supplier {supplier_id} submitted product {}", created.id);
        self.notifier.notify(Notice::info("Product submitted for review"));
        Ok(created)
    }

    pub fn list_pending_review(&self, identity: &Identity) -> Result<Vec<Product>, DomainError> {
        identity.require_role(Role::Admin)?;
        self.products.list_by_status(ApprovalStatus::Pending)
    }

    pub fn review(
        &self,
        identity: &Identity,
        product_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<Product, DomainError> {
        identity.require_role(Role::Admin)?;
        let patch = match decision {
            ReviewDecision::Forward { stock_quantity } => {
                if matches!(stock_quantity, Some(q) if q < 0) {
                    return Err(ValidationError::NonPositiveQuantity.into());
                }
                ProductPatch {
                    approval_status: Some(ApprovalStatus::FinancePending),
                    stock_quantity,
                    ..Default::default()
                }
            }
            ReviewDecision::Reject => ProductPatch {
                approval_status: Some(ApprovalStatus::Rejected),
                ..Default::default()
            },
        };

        let reviewed = self
            .products
            .transition(product_id, ApprovalStatus::Pending, patch)?;
        log::info!("product {product_id} reviewed: now {}", reviewed.approval_status);
        Ok(reviewed)
    }

    pub fn delete(&self, identity: &Identity, product_id: Uuid) -> Result<(), DomainError> {
        identity.require_role(Role::Admin)?;
        if self.products.find(product_id)?.is_none() {
            return Err(DomainError::NotFound("Product"));
        }
        self.products.delete(product_id)?;
        log::info!("product {product_id} deleted");
        Ok(())
    }
}
