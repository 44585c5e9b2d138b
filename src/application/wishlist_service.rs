use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::identity::Identity;
use crate::domain::notice::Notice;
use crate::domain::ports::{CartRepository, Notifier, ProductRepository, WishlistRepository};
use crate::domain::wishlist::WishlistEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WishlistOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved,
    /// The cart already held the product; the wishlist entry stays.
    AlreadyInCart,
}

pub struct WishlistService {
    wishlist: Arc<dyn WishlistRepository>,
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    notifier: Arc<dyn Notifier>,
}

impl WishlistService {
    pub fn new(
        wishlist: Arc<dyn WishlistRepository>,
        carts: Arc<dyn CartRepository>,
        products: Arc<dyn ProductRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            wishlist,
            carts,
            products,
            notifier,
        }
    }

    pub fn list(&self, identity: &Identity) -> Result<Vec<WishlistEntry>, DomainError> {
        self.wishlist.list(identity.require_user()?)
    }

    pub fn contains(&self, identity: &Identity, product_id: Uuid) -> Result<bool, DomainError> {
        self.wishlist.contains(identity.require_user()?, product_id)
    }

    pub fn add(&self, identity: &Identity, product_id: Uuid) -> Result<WishlistOutcome, DomainError> {
        let owner_id = identity.require_user()?;
        if self.products.find(product_id)?.is_none() {
            return Err(DomainError::NotFound("Product"));
        }
        match self.wishlist.add(owner_id, product_id) {
            Ok(()) => {
                self.notifier.notify(Notice::info("Added to wishlist"));
                Ok(WishlistOutcome::Added)
            }
            Err(e) if e.is_conflict() => {
                self.notifier.notify(Notice::warning("Already in wishlist"));
                Ok(WishlistOutcome::AlreadyPresent)
            }
            Err(e) => Err(e),
        }
    }

    pub fn remove(&self, identity: &Identity, product_id: Uuid) -> Result<(), DomainError> {
        self.wishlist.remove(identity.require_user()?, product_id)
    }

    /// Adds when absent, removes when present. Returns whether the product
    /// is wishlisted afterwards.
    pub fn toggle(&self, identity: &Identity, product_id: Uuid) -> Result<bool, DomainError> {
        if self.contains(identity, product_id)? {
            self.remove(identity, product_id)?;
            self.notifier.notify(Notice::info("Removed from wishlist"));
            Ok(false)
        } else {
            self.add(identity, product_id)?;
            Ok(true)
        }
    }

    /// Puts one unit in the cart and drops the wishlist entry.
    pub fn move_to_cart(
        &self,
        identity: &Identity,
        product_id: Uuid,
    ) -> Result<MoveOutcome, DomainError> {
        let owner_id = identity.require_user()?;
        let product = self
            .products
            .find(product_id)?
            .ok_or(DomainError::NotFound("Product"))?;
        if !product.is_purchasable() {
            return Err(ValidationError::NotPurchasable(product_id).into());
        }

        match self.carts.insert(owner_id, product_id, 1) {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                self.notifier.notify(Notice::warning("Already in cart"));
                return Ok(MoveOutcome::AlreadyInCart);
            }
            Err(e) => return Err(e),
        }
        self.wishlist.remove(owner_id, product_id)?;
        self.notifier
            .notify(Notice::info("Moved to cart").with_message(product.name));
        Ok(MoveOutcome::Moved)
    }
}
