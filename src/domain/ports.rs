use uuid::Uuid;

use super::cart::CartLine;
use super::errors::DomainError;
use super::notice::Notice;
use super::order::{ListResult, NewOrder, Order, OrderStatus, OrderView};
use super::product::{ApprovalStatus, NewProduct, PendingProduct, Product, ProductPatch};
use super::wishlist::WishlistEntry;

pub trait ProductRepository: Send + Sync + 'static {
    fn find(&self, id: Uuid) -> Result<Option<Product>, DomainError>;
    fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, DomainError>;
    /// Newest first.
    fn list_by_status(&self, status: ApprovalStatus) -> Result<Vec<Product>, DomainError>;
    fn find_pending_pricing(&self, id: Uuid) -> Result<Option<PendingProduct>, DomainError>;
    /// `finance_pending` products with image and supplier details, newest first.
    fn list_pending_pricing(&self) -> Result<Vec<PendingProduct>, DomainError>;
    fn insert(&self, product: NewProduct) -> Result<Product, DomainError>;
    /// Applies `patch` only while the product is still in `expected` status.
    /// `NotFound` when the product is gone, `Conflict` when its status moved on.
    fn transition(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        patch: ProductPatch,
    ) -> Result<Product, DomainError>;
    fn delete(&self, id: Uuid) -> Result<(), DomainError>;
}

/// Persisted per-user cart. At most one line per (user, product).
pub trait CartRepository: Send + Sync + 'static {
    fn lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, DomainError>;
    /// Increments an existing line or creates it. Totals past
    /// `MAX_LINE_QUANTITY` are refused.
    fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError>;
    /// Folds every line into the cart in one step, capping totals at
    /// `MAX_LINE_QUANTITY`. All or nothing.
    fn add_many(&self, user_id: Uuid, lines: &[CartLine]) -> Result<(), DomainError>;
    /// Creates a line; `Conflict` if one already exists.
    fn insert(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError>;
    /// Overwrites the quantity of an existing line; no-op when absent.
    fn set_quantity(&self, user_id: Uuid, product_id: Uuid, quantity: i32)
        -> Result<(), DomainError>;
    fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), DomainError>;
    fn clear(&self, user_id: Uuid) -> Result<(), DomainError>;
}

/// Device-local slot holding an anonymous session's cart.
pub trait GuestCartStore: Send + Sync + 'static {
    fn load(&self, session: Uuid) -> Result<Vec<CartLine>, DomainError>;
    fn save(&self, session: Uuid, lines: &[CartLine]) -> Result<(), DomainError>;
    fn clear(&self, session: Uuid) -> Result<(), DomainError>;
}

pub trait OrderRepository: Send + Sync + 'static {
    /// Writes the order and all its items, takes the ordered quantities out of
    /// stock and empties the owner's cart, all or nothing.
    fn place(&self, order: NewOrder) -> Result<Order, DomainError>;
    fn find(&self, id: Uuid) -> Result<Option<Order>, DomainError>;
    fn find_for_owner(&self, id: Uuid, owner_id: Uuid) -> Result<Option<OrderView>, DomainError>;
    /// The owner's orders, newest first, cancelled ones left out.
    fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<OrderView>, DomainError>;
    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError>;
    /// Moves the order to `to` only while it is still in `from`.
    fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        notes: Option<String>,
    ) -> Result<Order, DomainError>;
}

pub trait WishlistRepository: Send + Sync + 'static {
    fn list(&self, owner_id: Uuid) -> Result<Vec<WishlistEntry>, DomainError>;
    fn contains(&self, owner_id: Uuid, product_id: Uuid) -> Result<bool, DomainError>;
    /// `Conflict` if the pair already exists.
    fn add(&self, owner_id: Uuid, product_id: Uuid) -> Result<(), DomainError>;
    fn remove(&self, owner_id: Uuid, product_id: Uuid) -> Result<(), DomainError>;
}

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: Notice);
}
