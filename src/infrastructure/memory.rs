use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::cart::{add_line, merge_lines, set_line_quantity, CartLine};
use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::events::ChangeEvent;
use crate::domain::order::{
    ListResult, NewOrder, Order, OrderItem, OrderStatus, OrderView, INITIAL_SUPPLIER_STATUS,
};
use crate::domain::ports::{CartRepository, OrderRepository, ProductRepository, WishlistRepository};
use crate::domain::product::{
    ApprovalStatus, FinanceStatus, NewProduct, PendingProduct, Product, ProductPatch,
};
use crate::domain::wishlist::WishlistEntry;

use super::change_feed::ChangeFeed;

/// Tables a [`MemoryStore`] can be told to fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Cart,
    Orders,
    Wishlist,
}

#[derive(Debug, Clone)]
struct Profile {
    full_name: String,
    email: String,
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<Uuid, Product>,
    images: HashMap<Uuid, String>,
    profiles: HashMap<Uuid, Profile>,
    carts: HashMap<Uuid, Vec<CartLine>>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
    wishlist: Vec<WishlistEntry>,
    unavailable: HashSet<Table>,
}

impl State {
    fn check(&self, table: Table) -> Result<(), DomainError> {
        if self.unavailable.contains(&table) {
            Err(DomainError::Transport(format!("{table:?} table unavailable")))
        } else {
            Ok(())
        }
    }

    fn order_view(&self, order: &Order) -> OrderView {
        OrderView {
            order: order.clone(),
            items: self
                .order_items
                .iter()
                .filter(|i| i.order_id == order.id)
                .cloned()
                .collect(),
        }
    }

    fn pending_product(&self, product: &Product) -> PendingProduct {
        let profile = product.supplier_id.and_then(|id| self.profiles.get(&id));
        PendingProduct {
            product: product.clone(),
            image_url: self.images.get(&product.id).cloned(),
            supplier_name: profile.map_or_else(|| "N/A".to_string(), |p| p.full_name.clone()),
            supplier_email: profile.map_or_else(|| "N/A".to_string(), |p| p.email.clone()),
        }
    }
}

/// Process-local store implementing every repository port with the same
/// semantics as the Postgres backend. Changes go straight to the feed.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new(feed: ChangeFeed) -> Self {
        Self {
            state: Mutex::new(State::default()),
            feed,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Transport("store lock poisoned".to_string()))
    }

    /// Makes every call touching `table` fail with a transport error.
    pub fn set_unavailable(&self, table: Table, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            if unavailable {
                state.unavailable.insert(table);
            } else {
                state.unavailable.remove(&table);
            }
        }
    }

    /// Inserts or replaces a product as-is, bypassing the supplier flow.
    pub fn put_product(&self, product: Product) -> Result<(), DomainError> {
        self.state()?.products.insert(product.id, product);
        Ok(())
    }

    pub fn put_profile(
        &self,
        id: Uuid,
        full_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<(), DomainError> {
        self.state()?.profiles.insert(
            id,
            Profile {
                full_name: full_name.into(),
                email: email.into(),
            },
        );
        Ok(())
    }

    pub fn put_image(&self, product_id: Uuid, url: impl Into<String>) -> Result<(), DomainError> {
        self.state()?.images.insert(product_id, url.into());
        Ok(())
    }

    pub fn order_count(&self) -> Result<usize, DomainError> {
        Ok(self.state()?.orders.len())
    }

    pub fn order_item_count(&self) -> Result<usize, DomainError> {
        Ok(self.state()?.order_items.len())
    }
}

impl ProductRepository for MemoryStore {
    fn find(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        let state = self.state()?;
        state.check(Table::Products)?;
        Ok(state.products.get(&id).cloned())
    }

    fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, DomainError> {
        let state = self.state()?;
        state.check(Table::Products)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    fn list_by_status(&self, status: ApprovalStatus) -> Result<Vec<Product>, DomainError> {
        let state = self.state()?;
        state.check(Table::Products)?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.approval_status == status)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    fn find_pending_pricing(&self, id: Uuid) -> Result<Option<PendingProduct>, DomainError> {
        let state = self.state()?;
        state.check(Table::Products)?;
        Ok(state
            .products
            .get(&id)
            .filter(|p| p.approval_status == ApprovalStatus::FinancePending)
            .map(|p| state.pending_product(p)))
    }

    fn list_pending_pricing(&self) -> Result<Vec<PendingProduct>, DomainError> {
        let products = self.list_by_status(ApprovalStatus::FinancePending)?;
        let state = self.state()?;
        Ok(products.iter().map(|p| state.pending_product(p)).collect())
    }

    fn insert(&self, product: NewProduct) -> Result<Product, DomainError> {
        let mut state = self.state()?;
        state.check(Table::Products)?;
        // Keep newest-first ordering stable for products created back to back.
        let latest = state.products.values().map(|p| p.created_at).max();
        let now = Utc::now();
        let created_at = match latest {
            Some(latest) if latest >= now => latest + Duration::microseconds(1),
            _ => now,
        };
        let created = Product {
            id: Uuid::new_v4(),
            supplier_id: Some(product.supplier_id),
            name: product.name,
            description: product.description,
            price: product.supplier_price.clone(),
            supplier_price: product.supplier_price,
            finance_price: None,
            stock_quantity: product.stock_quantity,
            approval_status: ApprovalStatus::Pending,
            finance_status: Some(FinanceStatus::Pending),
            finance_approved_by: None,
            finance_approved_at: None,
            created_at,
        }
        .validate()?;
        if let Some(url) = product.image_url {
            state.images.insert(created.id, url);
        }
        state.products.insert(created.id, created.clone());
        drop(state);
        self.feed.publish(ChangeEvent::ProductChanged {
            product_id: created.id,
            old_status: None,
            new_status: Some(created.approval_status),
        });
        Ok(created)
    }

    fn transition(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        patch: ProductPatch,
    ) -> Result<Product, DomainError> {
        let mut state = self.state()?;
        state.check(Table::Products)?;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(DomainError::NotFound("Product"))?;
        if product.approval_status != expected {
            return Err(DomainError::Conflict(format!(
                "product {id} is {}, not {expected}",
                product.approval_status
            )));
        }
        let mut updated = product.clone();
        patch.apply(&mut updated);
        let updated = updated.validate()?;
        *product = updated.clone();
        drop(state);
        self.feed.publish(ChangeEvent::ProductChanged {
            product_id: id,
            old_status: Some(expected),
            new_status: Some(updated.approval_status),
        });
        Ok(updated)
    }

    fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Products)?;
        let removed = state.products.remove(&id);
        state.images.remove(&id);
        state.wishlist.retain(|e| e.product_id != id);
        drop(state);
        if let Some(product) = removed {
            self.feed.publish(ChangeEvent::ProductChanged {
                product_id: id,
                old_status: Some(product.approval_status),
                new_status: None,
            });
        }
        Ok(())
    }
}

impl CartRepository for MemoryStore {
    fn lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, DomainError> {
        let state = self.state()?;
        state.check(Table::Cart)?;
        Ok(state.carts.get(&user_id).cloned().unwrap_or_default())
    }

    fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Cart)?;
        add_line(state.carts.entry(user_id).or_default(), product_id, quantity)?;
        Ok(())
    }

    fn add_many(&self, user_id: Uuid, lines: &[CartLine]) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Cart)?;
        merge_lines(state.carts.entry(user_id).or_default(), lines);
        Ok(())
    }

    fn insert(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Cart)?;
        let lines = state.carts.entry(user_id).or_default();
        if lines.iter().any(|l| l.product_id == product_id) {
            return Err(DomainError::Conflict("cart line".to_string()));
        }
        lines.push(CartLine {
            product_id,
            quantity,
        });
        Ok(())
    }

    fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Cart)?;
        if let Some(lines) = state.carts.get_mut(&user_id) {
            set_line_quantity(lines, product_id, quantity);
        }
        Ok(())
    }

    fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Cart)?;
        if let Some(lines) = state.carts.get_mut(&user_id) {
            lines.retain(|l| l.product_id != product_id);
        }
        Ok(())
    }

    fn clear(&self, user_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Cart)?;
        state.carts.remove(&user_id);
        Ok(())
    }
}

impl OrderRepository for MemoryStore {
    fn place(&self, new_order: NewOrder) -> Result<Order, DomainError> {
        let mut state = self.state()?;
        state.check(Table::Orders)?;
        state.check(Table::Cart)?;

        let cart = state
            .carts
            .get(&new_order.owner_id)
            .cloned()
            .unwrap_or_default();
        new_order.matches_cart(&cart)?;

        // Validate every stock decrement before touching anything.
        for item in &new_order.items {
            let available = state
                .products
                .get(&item.product_id())
                .map(|p| p.stock_quantity)
                .ok_or(ValidationError::NotPurchasable(item.product_id()))?;
            if available < item.quantity {
                return Err(ValidationError::InsufficientStock {
                    product_id: item.product_id(),
                    requested: item.quantity,
                    available,
                }
                .into());
            }
        }

        let now = Utc::now();
        let created_at = match state.orders.last() {
            Some(last) if last.created_at >= now => last.created_at + Duration::microseconds(1),
            _ => now,
        };
        let order = Order {
            id: Uuid::new_v4(),
            owner_id: new_order.owner_id,
            address: new_order.address.clone(),
            subtotal: new_order.totals.subtotal.clone(),
            shipping_cost: new_order.totals.shipping_cost.clone(),
            total: new_order.totals.total.clone(),
            payment_method: new_order.payment_method,
            payment_status: new_order.payment_status(),
            status: OrderStatus::Placed,
            notes: None,
            created_at,
        };
        for item in new_order.items {
            if let Some(product) = state.products.get_mut(&item.product_id()) {
                product.stock_quantity -= item.quantity;
            }
            state.order_items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                product_id: item.product_id(),
                product_snapshot: item.product_snapshot,
                quantity: item.quantity,
                price: item.price,
                supplier_status: INITIAL_SUPPLIER_STATUS.to_string(),
            });
        }
        state.orders.push(order.clone());
        state.carts.remove(&order.owner_id);
        drop(state);

        self.feed.publish(ChangeEvent::OrderChanged {
            order_id: order.id,
            owner_id: order.owner_id,
            status: order.status,
        });
        Ok(order)
    }

    fn find(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let state = self.state()?;
        state.check(Table::Orders)?;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    fn find_for_owner(&self, id: Uuid, owner_id: Uuid) -> Result<Option<OrderView>, DomainError> {
        let state = self.state()?;
        state.check(Table::Orders)?;
        Ok(state
            .orders
            .iter()
            .find(|o| o.id == id && o.owner_id == owner_id)
            .map(|o| state.order_view(o)))
    }

    fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<OrderView>, DomainError> {
        let state = self.state()?;
        state.check(Table::Orders)?;
        let mut views: Vec<OrderView> = state
            .orders
            .iter()
            .filter(|o| o.owner_id == owner_id && o.status != OrderStatus::Cancelled)
            .map(|o| state.order_view(o))
            .collect();
        views.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
        Ok(views)
    }

    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        let state = self.state()?;
        state.check(Table::Orders)?;
        let mut orders = state.orders.clone();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = usize::try_from((page - 1).max(0) * limit).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(ListResult {
            total: i64::try_from(orders.len()).unwrap_or(i64::MAX),
            items: orders.into_iter().skip(offset).take(limit).collect(),
        })
    }

    fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        notes: Option<String>,
    ) -> Result<Order, DomainError> {
        let mut state = self.state()?;
        state.check(Table::Orders)?;
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(DomainError::NotFound("Order"))?;
        if order.status != from {
            return Err(DomainError::Conflict(format!(
                "order {id} is {}, not {from}",
                order.status
            )));
        }
        order.status = to;
        if notes.is_some() {
            order.notes = notes;
        }
        let updated = order.clone();
        drop(state);
        self.feed.publish(ChangeEvent::OrderChanged {
            order_id: updated.id,
            owner_id: updated.owner_id,
            status: updated.status,
        });
        Ok(updated)
    }
}

impl WishlistRepository for MemoryStore {
    fn list(&self, owner_id: Uuid) -> Result<Vec<WishlistEntry>, DomainError> {
        let state = self.state()?;
        state.check(Table::Wishlist)?;
        Ok(state
            .wishlist
            .iter()
            .rev()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| WishlistEntry {
                product: state.products.get(&e.product_id).cloned(),
                ..e.clone()
            })
            .collect())
    }

    fn contains(&self, owner_id: Uuid, product_id: Uuid) -> Result<bool, DomainError> {
        let state = self.state()?;
        state.check(Table::Wishlist)?;
        Ok(state
            .wishlist
            .iter()
            .any(|e| e.owner_id == owner_id && e.product_id == product_id))
    }

    fn add(&self, owner_id: Uuid, product_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Wishlist)?;
        if state
            .wishlist
            .iter()
            .any(|e| e.owner_id == owner_id && e.product_id == product_id)
        {
            return Err(DomainError::Conflict("wishlist entry".to_string()));
        }
        state.wishlist.push(WishlistEntry {
            owner_id,
            product_id,
            product: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn remove(&self, owner_id: Uuid, product_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.state()?;
        state.check(Table::Wishlist)?;
        state
            .wishlist
            .retain(|e| !(e.owner_id == owner_id && e.product_id == product_id));
        Ok(())
    }
}
