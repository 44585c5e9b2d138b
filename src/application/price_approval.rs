use std::sync::{Arc, Mutex};

use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::events::ChangeEvent;
use crate::domain::identity::{Identity, Role};
use crate::domain::notice::Notice;
use crate::domain::ports::{Notifier, ProductRepository};
use crate::domain::product::{
    ApprovalStatus, FinanceStatus, PendingProduct, Product, ProductPatch,
};
use crate::infrastructure::change_feed::{Delivery, Subscription};

/// Percentage markup of `final_price` over `supplier_price`, two decimals.
/// Zero when the supplier price is zero.
pub fn margin(final_price: &BigDecimal, supplier_price: &BigDecimal) -> BigDecimal {
    if supplier_price.is_zero() {
        return BigDecimal::zero();
    }
    ((final_price - supplier_price) / supplier_price.clone() * BigDecimal::from(100)).round(2)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginQuote {
    pub product_id: Uuid,
    pub supplier_price: BigDecimal,
    pub final_price: BigDecimal,
    pub margin: BigDecimal,
}

/// Finance review of supplier products waiting for a selling price.
pub struct PriceApprovalWorkflow {
    products: Arc<dyn ProductRepository>,
    notifier: Arc<dyn Notifier>,
}

impl PriceApprovalWorkflow {
    pub fn new(products: Arc<dyn ProductRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { products, notifier }
    }

    pub fn list_pending(&self, identity: &Identity) -> Result<Vec<PendingProduct>, DomainError> {
        identity.require_role(Role::Finance)?;
        self.products.list_pending_pricing()
    }

    pub fn margin_preview(
        &self,
        identity: &Identity,
        product_id: Uuid,
        final_price: BigDecimal,
    ) -> Result<MarginQuote, DomainError> {
        identity.require_role(Role::Finance)?;
        let product = self
            .products
            .find(product_id)?
            .ok_or(DomainError::NotFound("Product"))?;
        Ok(MarginQuote {
            product_id,
            margin: margin(&final_price, &product.supplier_price),
            supplier_price: product.supplier_price,
            final_price,
        })
    }

    /// Sets the selling price and releases the product for sale.
    pub fn approve_with_price(
        &self,
        identity: &Identity,
        product_id: Uuid,
        final_price: BigDecimal,
    ) -> Result<Product, DomainError> {
        let approver = identity.require_role(Role::Finance)?;
        if final_price <= BigDecimal::zero() {
            return Err(ValidationError::NonPositivePrice.into());
        }

        let approved = self.products.transition(
            product_id,
            ApprovalStatus::FinancePending,
            ProductPatch {
                approval_status: Some(ApprovalStatus::Approved),
                finance_price: Some(final_price.clone()),
                price: Some(final_price.clone()),
                finance_status: Some(FinanceStatus::Approved),
                finance_approved_by: Some(approver),
                finance_approved_at: Some(Utc::now()),
                ..Default::default()
            },
        )?;

        let markup = margin(&final_price, &approved.supplier_price);
        log::info!(
            "product {product_id} approved at {final_price} by {approver}, margin {markup}%"
        );
        self.notifier.notify(
            Notice::info("Price approved")
                .with_message(format!("{} is now on sale at {final_price}", approved.name)),
        );
        Ok(approved)
    }
}

/// What [`PendingBoard::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Added,
    Updated,
    Removed,
    Unchanged,
}

/// Live list of products awaiting a finance price.
///
/// Membership is recomputed from each event's after-state and a fresh read of
/// the product, so duplicated or reordered events settle on the same list.
pub struct PendingBoard {
    products: Arc<dyn ProductRepository>,
    entries: Vec<PendingProduct>,
}

impl PendingBoard {
    pub fn load(products: Arc<dyn ProductRepository>) -> Result<Self, DomainError> {
        let entries = products.list_pending_pricing()?;
        Ok(Self { products, entries })
    }

    pub fn entries(&self) -> &[PendingProduct] {
        &self.entries
    }

    pub fn contains(&self, product_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.product.id == product_id)
    }

    /// Reloads everything, for when events may have been missed.
    pub fn resync(&mut self) -> Result<(), DomainError> {
        self.entries = self.products.list_pending_pricing()?;
        Ok(())
    }

    pub fn apply(&mut self, event: &ChangeEvent) -> Result<Reconciled, DomainError> {
        let ChangeEvent::ProductChanged {
            product_id,
            new_status,
            ..
        } = event
        else {
            return Ok(Reconciled::Unchanged);
        };

        let current = if *new_status == Some(ApprovalStatus::FinancePending) {
            self.products.find_pending_pricing(*product_id)?
        } else {
            None
        };

        let outcome = match current {
            Some(pending) => self.upsert(pending),
            None => self.remove(*product_id),
        };
        log::debug!("pending board {outcome:?} for product {product_id}");
        Ok(outcome)
    }

    fn upsert(&mut self, pending: PendingProduct) -> Reconciled {
        let existing = self
            .entries
            .iter()
            .position(|e| e.product.id == pending.product.id);
        match existing {
            Some(i) if self.entries[i] == pending => Reconciled::Unchanged,
            Some(i) => {
                self.entries[i] = pending;
                Reconciled::Updated
            }
            None => {
                let at = self
                    .entries
                    .iter()
                    .position(|e| e.product.created_at < pending.product.created_at)
                    .unwrap_or(self.entries.len());
                self.entries.insert(at, pending);
                Reconciled::Added
            }
        }
    }

    fn remove(&mut self, product_id: Uuid) -> Reconciled {
        let before = self.entries.len();
        self.entries.retain(|e| e.product.id != product_id);
        if self.entries.len() < before {
            Reconciled::Removed
        } else {
            Reconciled::Unchanged
        }
    }
}

/// Keeps `board` in step with `subscription` until the feed closes.
pub async fn follow(board: Arc<Mutex<PendingBoard>>, mut subscription: Subscription) {
    while let Some(delivery) = subscription.next().await {
        let board = board.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut board = board
                .lock()
                .map_err(|_| DomainError::Transport("pending board lock poisoned".to_string()))?;
            match delivery {
                Delivery::Event(event) => board.apply(&event).map(|_| ()),
                Delivery::Resync => board.resync(),
            }
        })
        .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("pending board update failed: {e}"),
            Err(e) => {
                log::error!("pending board follower stopped: {e}");
                return;
            }
        }
    }
    log::info!("change feed closed, pending board follower exiting");
}
