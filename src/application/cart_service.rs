use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::domain::cart::{
    add_line, checked_line_total, set_line_quantity, CartLine, CartOwner, CartView,
};
use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::notice::Notice;
use crate::domain::ports::{CartRepository, GuestCartStore, Notifier, ProductRepository};

/// Owns the (product, quantity) selections of a shopper.
///
/// Signed-in carts go to the cart repository; guest carts live in the
/// device-local slot. Every mutation returns the freshly re-resolved cart.
pub struct CartAggregator {
    carts: Arc<dyn CartRepository>,
    guest_carts: Arc<dyn GuestCartStore>,
    products: Arc<dyn ProductRepository>,
    notifier: Arc<dyn Notifier>,
    /// One lock per guest session around its slot's load-modify-save.
    guest_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CartAggregator {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        guest_carts: Arc<dyn GuestCartStore>,
        products: Arc<dyn ProductRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            carts,
            guest_carts,
            products,
            notifier,
            guest_locks: Mutex::default(),
        }
    }

    fn edit_guest_cart<T>(
        &self,
        session: Uuid,
        edit: impl FnOnce(&mut Vec<CartLine>) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let slot = self.guest_lock(session)?;
        let _held = slot.lock().map_err(|_| poisoned())?;
        let mut lines = self.guest_carts.load(session)?;
        let value = edit(&mut lines)?;
        self.guest_carts.save(session, &lines)?;
        Ok(value)
    }

    fn guest_lock(&self, session: Uuid) -> Result<Arc<Mutex<()>>, DomainError> {
        let mut locks = self.guest_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(session).or_default().clone())
    }

    pub fn lines(&self, owner: CartOwner) -> Result<Vec<CartLine>, DomainError> {
        match owner {
            CartOwner::User(user_id) => self.carts.lines(user_id),
            CartOwner::Guest(session) => self.guest_carts.load(session),
        }
    }

    /// The cart with every line joined to its current product.
    pub fn view(&self, owner: CartOwner) -> Result<CartView, DomainError> {
        let lines = self.lines(owner)?;
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = self.products.find_many(&ids)?;
        Ok(CartView::resolve(lines, &products))
    }

    pub fn add(
        &self,
        owner: CartOwner,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, DomainError> {
        if quantity < 1 {
            return Err(ValidationError::NonPositiveQuantity.into());
        }
        checked_line_total(0, quantity)?;
        let product = self
            .products
            .find(product_id)?
            .ok_or(DomainError::NotFound("Product"))?;
        if !product.is_purchasable() {
            return Err(ValidationError::NotPurchasable(product_id).into());
        }

        match owner {
            CartOwner::User(user_id) => self.carts.add(user_id, product_id, quantity)?,
            CartOwner::Guest(session) => self.edit_guest_cart(session, |lines| {
                add_line(lines, product_id, quantity)?;
                Ok(())
            })?,
        }
        self.notifier
            .notify(Notice::info("Added to cart").with_message(product.name));
        self.view(owner)
    }

    pub fn remove(&self, owner: CartOwner, product_id: Uuid) -> Result<CartView, DomainError> {
        match owner {
            CartOwner::User(user_id) => self.carts.remove(user_id, product_id)?,
            CartOwner::Guest(session) => self.edit_guest_cart(session, |lines| {
                lines.retain(|l| l.product_id != product_id);
                Ok(())
            })?,
        }
        self.view(owner)
    }

    /// `quantity <= 0` removes the line; a missing line stays missing.
    pub fn set_quantity(
        &self,
        owner: CartOwner,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, DomainError> {
        if quantity <= 0 {
            return self.remove(owner, product_id);
        }
        checked_line_total(0, quantity)?;
        match owner {
            CartOwner::User(user_id) => self.carts.set_quantity(user_id, product_id, quantity)?,
            CartOwner::Guest(session) => self.edit_guest_cart(session, |lines| {
                set_line_quantity(lines, product_id, quantity);
                Ok(())
            })?,
        }
        self.view(owner)
    }

    pub fn clear(&self, owner: CartOwner) -> Result<CartView, DomainError> {
        match owner {
            CartOwner::User(user_id) => self.carts.clear(user_id)?,
            CartOwner::Guest(session) => {
                let slot = self.guest_lock(session)?;
                let _held = slot.lock().map_err(|_| poisoned())?;
                self.guest_carts.clear(session)?
            }
        }
        self.view(owner)
    }

    /// Adds the guest slot's quantities onto the user's cart in one write,
    /// then empties the slot. Lines for products that no longer resolve are
    /// dropped. A failed merge leaves both carts as they were.
    pub fn merge_guest_cart(&self, session: Uuid, user_id: Uuid) -> Result<CartView, DomainError> {
        let slot = self.guest_lock(session)?;
        let held = slot.lock().map_err(|_| poisoned())?;
        let guest_lines = self.guest_carts.load(session)?;
        let ids: Vec<Uuid> = guest_lines.iter().map(|l| l.product_id).collect();
        let known = self.products.find_many(&ids)?;

        let (kept, dropped): (Vec<CartLine>, Vec<CartLine>) = guest_lines
            .into_iter()
            .partition(|line| known.iter().any(|p| p.id == line.product_id));
        for line in &dropped {
            log::debug!("dropping unresolved guest line {}", line.product_id);
        }
        let merged = kept.len();
        if merged > 0 {
            self.carts.add_many(user_id, &kept)?;
        }
        self.guest_carts.clear(session)?;
        drop(held);

        if merged > 0 {
            log::info!("merged {merged} guest cart lines into cart of {user_id}");
            self.notifier
                .notify(Notice::info("Cart merged").with_message(format!("{merged} items kept")));
        }
        self.view(CartOwner::User(user_id))
    }
}

fn poisoned() -> DomainError {
    DomainError::Transport("guest cart lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use bigdecimal::BigDecimal;

    use super::*;
    use crate::domain::cart::MAX_LINE_QUANTITY;
    use crate::domain::product::fixtures::product;
    use crate::domain::product::ApprovalStatus;
    use crate::infrastructure::change_feed::ChangeFeed;
    use crate::infrastructure::guest_cart::{FileGuestCartStore, MemoryGuestCartStore};
    use crate::infrastructure::memory::MemoryStore;
    use crate::infrastructure::notifier::RecordingNotifier;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        cart: CartAggregator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new(ChangeFeed::default()));
        let notifier = Arc::new(RecordingNotifier::new());
        let cart = CartAggregator::new(
            store.clone(),
            Arc::new(MemoryGuestCartStore::default()),
            store.clone(),
            notifier.clone(),
        );
        Fixture {
            store,
            notifier,
            cart,
        }
    }

    /// Cart repository that fails the next bulk merge once.
    struct FlakyCarts {
        inner: Arc<MemoryStore>,
        fail_next_merge: AtomicBool,
    }

    impl CartRepository for FlakyCarts {
        fn lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, DomainError> {
            self.inner.lines(user_id)
        }
        fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError> {
            CartRepository::add(self.inner.as_ref(), user_id, product_id, quantity)
        }
        fn add_many(&self, user_id: Uuid, lines: &[CartLine]) -> Result<(), DomainError> {
            if self.fail_next_merge.swap(false, Ordering::SeqCst) {
                return Err(DomainError::Transport("connection reset".to_string()));
            }
            self.inner.add_many(user_id, lines)
        }
        fn insert(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError> {
            CartRepository::insert(self.inner.as_ref(), user_id, product_id, quantity)
        }
        fn set_quantity(
            &self,
            user_id: Uuid,
            product_id: Uuid,
            quantity: i32,
        ) -> Result<(), DomainError> {
            self.inner.set_quantity(user_id, product_id, quantity)
        }
        fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), DomainError> {
            CartRepository::remove(self.inner.as_ref(), user_id, product_id)
        }
        fn clear(&self, user_id: Uuid) -> Result<(), DomainError> {
            CartRepository::clear(self.inner.as_ref(), user_id)
        }
    }

    // ── add / setQuantity / remove ────────────────────────────────────────────

    #[test]
    fn add_refuses_quantity_past_line_limit() {
        let f = fixture();
        let lamp = product(250, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        let user = CartOwner::User(Uuid::new_v4());

        let err = f.cart.add(user, lamp.id, i32::MAX).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::QuantityTooLarge { .. })
        ));

        f.cart.add(user, lamp.id, MAX_LINE_QUANTITY).expect("add");
        let err = f.cart.add(user, lamp.id, 1).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::QuantityTooLarge { .. })
        ));
        assert_eq!(f.cart.view(user).expect("view").item_count(), i64::from(MAX_LINE_QUANTITY));

        let err = f.cart.set_quantity(user, lamp.id, i32::MAX).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn guest_slot_stays_readable_after_oversized_add() {
        let f = fixture();
        let lamp = product(250, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        let guest = CartOwner::Guest(Uuid::new_v4());

        f.cart.add(guest, lamp.id, MAX_LINE_QUANTITY).expect("add");
        assert!(f.cart.add(guest, lamp.id, 1).is_err());

        let view = f.cart.view(guest).expect("slot still decodes");
        assert_eq!(view.item_count(), i64::from(MAX_LINE_QUANTITY));
    }

    #[test]
    fn repeated_add_keeps_one_line() {
        let f = fixture();
        let lamp = product(250, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        let owner = CartOwner::User(Uuid::new_v4());

        f.cart.add(owner, lamp.id, 1).expect("add");
        let view = f.cart.add(owner, lamp.id, 2).expect("add again");

        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.item_count(), 3);
        assert_eq!(view.total(), BigDecimal::from(750));
        assert_eq!(f.notifier.titles(), vec!["Added to cart", "Added to cart"]);
    }

    #[test]
    fn add_rejects_unapproved_product() {
        let f = fixture();
        let draft = product(100, ApprovalStatus::FinancePending);
        f.store.put_product(draft.clone()).expect("put");

        let err = f
            .cart
            .add(CartOwner::User(Uuid::new_v4()), draft.id, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::NotPurchasable(_))
        ));
    }

    #[test]
    fn add_rejects_unknown_product() {
        let f = fixture();
        let err = f
            .cart
            .add(CartOwner::User(Uuid::new_v4()), Uuid::new_v4(), 1)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound("Product")));
    }

    #[test]
    fn set_quantity_zero_removes_and_repeats_are_harmless() {
        let f = fixture();
        let lamp = product(250, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        let owner = CartOwner::User(Uuid::new_v4());
        f.cart.add(owner, lamp.id, 4).expect("add");

        let view = f.cart.set_quantity(owner, lamp.id, 0).expect("set");
        assert!(view.is_empty());
        let view = f.cart.set_quantity(owner, lamp.id, 0).expect("set again");
        assert!(view.is_empty());
        let view = f.cart.remove(owner, lamp.id).expect("remove absent");
        assert!(view.is_empty());
    }

    #[test]
    fn deleted_product_prices_at_zero() {
        let f = fixture();
        let lamp = product(250, ApprovalStatus::Approved);
        let mug = product(40, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        f.store.put_product(mug.clone()).expect("put");
        let owner = CartOwner::User(Uuid::new_v4());
        f.cart.add(owner, lamp.id, 1).expect("add");
        f.cart.add(owner, mug.id, 2).expect("add");

        ProductRepository::delete(f.store.as_ref(), lamp.id).expect("delete");

        let view = f.cart.view(owner).expect("view");
        assert_eq!(view.item_count(), 3);
        assert_eq!(view.total(), BigDecimal::from(80));
    }

    // ── guest slot ────────────────────────────────────────────────────────────

    #[test]
    fn guest_cart_uses_device_slot() {
        let f = fixture();
        let lamp = product(250, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        let session = Uuid::new_v4();

        f.cart.add(CartOwner::Guest(session), lamp.id, 2).expect("add");
        let view = f
            .cart
            .set_quantity(CartOwner::Guest(session), lamp.id, 5)
            .expect("set");

        assert_eq!(view.item_count(), 5);
        assert!(f.cart.view(CartOwner::User(session)).expect("view").is_empty());
    }

    #[test]
    fn concurrent_guest_adds_are_all_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(MemoryStore::new(ChangeFeed::default()));
        let cart = CartAggregator::new(
            store.clone(),
            Arc::new(FileGuestCartStore::new(dir.path())),
            store.clone(),
            Arc::new(RecordingNotifier::new()),
        );
        let lamp = product(250, ApprovalStatus::Approved);
        store.put_product(lamp.clone()).expect("put");
        let guest = CartOwner::Guest(Uuid::new_v4());

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10 {
                        cart.add(guest, lamp.id, 1).expect("add");
                    }
                });
            }
        });

        let view = cart.view(guest).expect("view");
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.item_count(), 80);
    }

    #[test]
    fn failed_merge_can_be_retried_without_double_counting() {
        let store = Arc::new(MemoryStore::new(ChangeFeed::default()));
        let carts = Arc::new(FlakyCarts {
            inner: store.clone(),
            fail_next_merge: AtomicBool::new(true),
        });
        let cart = CartAggregator::new(
            carts,
            Arc::new(MemoryGuestCartStore::new()),
            store.clone(),
            Arc::new(RecordingNotifier::new()),
        );
        let lamp = product(250, ApprovalStatus::Approved);
        let mug = product(40, ApprovalStatus::Approved);
        store.put_product(lamp.clone()).expect("put");
        store.put_product(mug.clone()).expect("put");
        let session = Uuid::new_v4();
        let user = Uuid::new_v4();
        cart.add(CartOwner::User(user), lamp.id, 1).expect("add");
        cart.add(CartOwner::Guest(session), lamp.id, 2).expect("add");
        cart.add(CartOwner::Guest(session), mug.id, 3).expect("add");

        let err = cart.merge_guest_cart(session, user).unwrap_err();
        assert!(matches!(err, DomainError::Transport(_)));
        assert_eq!(cart.view(CartOwner::User(user)).expect("view").item_count(), 1);
        assert_eq!(
            cart.view(CartOwner::Guest(session)).expect("view").item_count(),
            5
        );

        let view = cart.merge_guest_cart(session, user).expect("retry");
        let quantity_of = |id: Uuid| {
            view.entries
                .iter()
                .find(|e| e.product_id == id)
                .map(|e| e.quantity)
        };
        assert_eq!(quantity_of(lamp.id), Some(3));
        assert_eq!(quantity_of(mug.id), Some(3));
        assert!(cart
            .view(CartOwner::Guest(session))
            .expect("guest view")
            .is_empty());
    }

    #[test]
    fn merge_adds_guest_quantities_and_empties_slot() {
        let f = fixture();
        let lamp = product(250, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        let session = Uuid::new_v4();
        let user = Uuid::new_v4();

        f.cart.add(CartOwner::User(user), lamp.id, 1).expect("add");
        f.cart.add(CartOwner::Guest(session), lamp.id, 2).expect("add");

        let view = f.cart.merge_guest_cart(session, user).expect("merge");
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.item_count(), 3);
        assert!(f
            .cart
            .view(CartOwner::Guest(session))
            .expect("guest view")
            .is_empty());
    }
}
