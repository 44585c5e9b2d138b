use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use uuid::Uuid;

use crate::domain::cart::{CartEntry, CartOwner};
use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::identity::Identity;
use crate::domain::notice::Notice;
use crate::domain::order::{
    Address, NewOrder, NewOrderItem, OrderTotals, PaymentMethod, ShippingPolicy,
};
use crate::domain::ports::{Notifier, OrderRepository};

use super::cart_service::CartAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage {
    #[default]
    Closed,
    Address,
    Payment,
    Invoice,
}

impl CheckoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::Closed => "closed",
            CheckoutStage::Address => "address",
            CheckoutStage::Payment => "payment",
            CheckoutStage::Invoice => "invoice",
        }
    }
}

/// The four-step checkout wizard of one shopper.
///
/// Only ever moves one step at a time. The address form survives `back` and
/// `cancel`, and is wiped once an order has been placed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutWorkflow {
    stage: CheckoutStage,
    address: Address,
    payment_method: Option<PaymentMethod>,
}

impl CheckoutWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> CheckoutStage {
        self.stage
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    fn expect_stage(&self, expected: CheckoutStage) -> Result<(), ValidationError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ValidationError::CheckoutStage {
                expected: expected.as_str(),
                actual: self.stage.as_str(),
            })
        }
    }

    /// Opens the wizard at the address step. Already open: stays put.
    pub fn start(&mut self) {
        if self.stage == CheckoutStage::Closed {
            self.stage = CheckoutStage::Address;
        }
    }

    pub fn submit_address(&mut self, address: Address) -> Result<(), ValidationError> {
        self.expect_stage(CheckoutStage::Address)?;
        address.validate()?;
        self.address = address;
        self.stage = CheckoutStage::Payment;
        Ok(())
    }

    pub fn choose_payment(&mut self, method: PaymentMethod) -> Result<(), ValidationError> {
        self.expect_stage(CheckoutStage::Payment)?;
        self.payment_method = Some(method);
        self.stage = CheckoutStage::Invoice;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), ValidationError> {
        self.stage = match self.stage {
            CheckoutStage::Closed => {
                return Err(ValidationError::CheckoutStage {
                    expected: CheckoutStage::Address.as_str(),
                    actual: CheckoutStage::Closed.as_str(),
                })
            }
            CheckoutStage::Address => CheckoutStage::Closed,
            CheckoutStage::Payment => CheckoutStage::Address,
            CheckoutStage::Invoice => CheckoutStage::Payment,
        };
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.stage = CheckoutStage::Closed;
    }

    fn finish(&mut self) {
        *self = Self::default();
    }
}

/// Read-only summary shown on the invoice step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub address: Address,
    pub payment_method: PaymentMethod,
    pub entries: Vec<CartEntry>,
    pub totals: OrderTotals,
}

/// Places orders out of the shopper's cart.
pub struct CheckoutService {
    cart: Arc<CartAggregator>,
    orders: Arc<dyn OrderRepository>,
    shipping: ShippingPolicy,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutService {
    pub fn new(
        cart: Arc<CartAggregator>,
        orders: Arc<dyn OrderRepository>,
        shipping: ShippingPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            cart,
            orders,
            shipping,
            notifier,
        }
    }

    pub fn shipping(&self) -> &ShippingPolicy {
        &self.shipping
    }

    pub fn invoice(
        &self,
        identity: &Identity,
        workflow: &CheckoutWorkflow,
    ) -> Result<Invoice, DomainError> {
        let user_id = identity.require_user()?;
        workflow.expect_stage(CheckoutStage::Invoice)?;
        let payment_method = workflow
            .payment_method
            .ok_or(ValidationError::MissingField("payment_method"))?;
        let view = self.cart.view(CartOwner::User(user_id))?;
        Ok(Invoice {
            address: workflow.address.clone(),
            payment_method,
            totals: self.shipping.quote(view.total()),
            entries: view.entries,
        })
    }

    /// Turns the cart into an order. On success the wizard closes and the
    /// order id is returned; on failure it stays on the invoice step.
    pub fn commit(
        &self,
        identity: &Identity,
        workflow: &mut CheckoutWorkflow,
    ) -> Result<Uuid, DomainError> {
        let invoice = self.invoice(identity, workflow)?;
        let owner_id = identity.require_user()?;
        if invoice.entries.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        let items = invoice
            .entries
            .iter()
            .map(|entry| match &entry.product {
                Some(product) if product.is_purchasable() => Ok(NewOrderItem {
                    product_snapshot: product.clone(),
                    quantity: entry.quantity,
                    price: product.display_price().clone(),
                }),
                _ => Err(ValidationError::NotPurchasable(entry.product_id)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let placed = self.orders.place(NewOrder {
            owner_id,
            address: invoice.address,
            totals: invoice.totals,
            payment_method: invoice.payment_method,
            items,
        });
        let order = match placed {
            Ok(order) => order,
            Err(e) => {
                log::warn!("order placement for {owner_id} failed: {e}");
                self.notifier
                    .notify(Notice::error("Order failed", e.to_string()));
                return Err(e);
            }
        };

        workflow.finish();
        log::info!("order {} placed by {owner_id}, total {}", order.id, order.total);
        self.notifier.notify(
            Notice::info("Order placed").with_message(format!("Order {} confirmed", order.id)),
        );
        Ok(order.id)
    }
}

/// Open checkout wizards, one per signed-in shopper.
///
/// Each wizard sits behind its own lock, held for the whole of an
/// [`update`](Self::update), so one shopper's steps run one at a time while
/// other shoppers proceed in parallel.
#[derive(Debug, Default)]
pub struct CheckoutSessions {
    workflows: Mutex<HashMap<Uuid, Arc<Mutex<CheckoutWorkflow>>>>,
}

impl CheckoutSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: Uuid) -> Result<CheckoutWorkflow, DomainError> {
        let slot = self.slot(user_id)?;
        let workflow = lock_workflow(&slot)?;
        Ok(workflow.clone())
    }

    pub fn put(&self, user_id: Uuid, workflow: CheckoutWorkflow) -> Result<(), DomainError> {
        let slot = self.slot(user_id)?;
        *lock_workflow(&slot)? = workflow;
        Ok(())
    }

    /// Runs `f` on the user's wizard and stores the result, even when `f`
    /// fails part-way. Concurrent calls for the same user queue up.
    pub fn update<T>(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut CheckoutWorkflow) -> Result<T, DomainError>,
    ) -> Result<(T, CheckoutWorkflow), DomainError> {
        let slot = self.slot(user_id)?;
        let mut workflow = lock_workflow(&slot)?;
        let value = f(&mut *workflow)?;
        Ok((value, workflow.clone()))
    }

    fn slot(&self, user_id: Uuid) -> Result<Arc<Mutex<CheckoutWorkflow>>, DomainError> {
        let mut workflows = self
            .workflows
            .lock()
            .map_err(|_| DomainError::Transport("checkout sessions lock poisoned".to_string()))?;
        Ok(workflows.entry(user_id).or_default().clone())
    }
}

fn lock_workflow(
    slot: &Mutex<CheckoutWorkflow>,
) -> Result<MutexGuard<'_, CheckoutWorkflow>, DomainError> {
    slot.lock()
        .map_err(|_| DomainError::Transport("checkout wizard lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use bigdecimal::BigDecimal;

    use super::*;
    use crate::domain::identity::Role;
    use crate::domain::order::{ListResult, Order, OrderStatus, OrderView, PaymentStatus};
    use crate::domain::ports::{OrderRepository, ProductRepository};
    use crate::domain::product::fixtures::product;
    use crate::domain::product::{ApprovalStatus, Product};
    use crate::infrastructure::change_feed::ChangeFeed;
    use crate::infrastructure::guest_cart::MemoryGuestCartStore;
    use crate::infrastructure::memory::{MemoryStore, Table};
    use crate::infrastructure::notifier::RecordingNotifier;

    fn address() -> Address {
        Address {
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            address_line: "12 MG Road".into(),
            city: "Pune".into(),
            state: "MH".into(),
            pincode: "411001".into(),
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        cart: Arc<CartAggregator>,
        checkout: CheckoutService,
        notifier: Arc<RecordingNotifier>,
        shopper: Identity,
    }

    impl Fixture {
        fn owner(&self) -> CartOwner {
            CartOwner::User(self.shopper.user_id.expect("signed in"))
        }

        fn stock(&self, product: &Product) -> Product {
            ProductRepository::find(self.store.as_ref(), product.id)
                .expect("find")
                .expect("exists")
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new(ChangeFeed::default()));
        let notifier = Arc::new(RecordingNotifier::new());
        let cart = Arc::new(CartAggregator::new(
            store.clone(),
            Arc::new(MemoryGuestCartStore::new()),
            store.clone(),
            notifier.clone(),
        ));
        let checkout = CheckoutService::new(
            cart.clone(),
            store.clone(),
            ShippingPolicy::default(),
            notifier.clone(),
        );
        Fixture {
            store,
            cart,
            checkout,
            notifier,
            shopper: Identity::user(Uuid::new_v4(), vec![Role::Shopper]),
        }
    }

    fn at_invoice(method: PaymentMethod) -> CheckoutWorkflow {
        let mut workflow = CheckoutWorkflow::new();
        workflow.start();
        workflow.submit_address(address()).expect("address");
        workflow.choose_payment(method).expect("payment");
        workflow
    }

    // ── stage machine ─────────────────────────────────────────────────────────

    #[test]
    fn stages_advance_one_at_a_time() {
        let mut workflow = CheckoutWorkflow::new();
        assert!(workflow.choose_payment(PaymentMethod::Upi).is_err());

        workflow.start();
        assert_eq!(workflow.stage(), CheckoutStage::Address);
        assert!(matches!(
            workflow.choose_payment(PaymentMethod::Upi),
            Err(ValidationError::CheckoutStage {
                expected: "payment",
                actual: "address"
            })
        ));

        workflow.submit_address(address()).expect("address");
        workflow.choose_payment(PaymentMethod::Upi).expect("payment");
        assert_eq!(workflow.stage(), CheckoutStage::Invoice);

        workflow.back().expect("back");
        assert_eq!(workflow.stage(), CheckoutStage::Payment);
        workflow.back().expect("back");
        workflow.back().expect("back");
        assert_eq!(workflow.stage(), CheckoutStage::Closed);
        assert!(workflow.back().is_err());
    }

    #[test]
    fn missing_address_field_keeps_address_stage() {
        let mut workflow = CheckoutWorkflow::new();
        workflow.start();
        let err = workflow
            .submit_address(Address {
                pincode: "  ".into(),
                ..address()
            })
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingAddressField("pincode"));
        assert_eq!(workflow.stage(), CheckoutStage::Address);
    }

    #[test]
    fn cancel_closes_but_keeps_address() {
        let mut workflow = at_invoice(PaymentMethod::Card);
        workflow.cancel();
        assert_eq!(workflow.stage(), CheckoutStage::Closed);
        assert_eq!(workflow.address(), &address());
    }

    // ── commit ────────────────────────────────────────────────────────────────

    #[test]
    fn commit_on_empty_cart_writes_nothing() {
        let f = fixture();
        let mut workflow = at_invoice(PaymentMethod::Cod);

        let err = f.checkout.commit(&f.shopper, &mut workflow).unwrap_err();

        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::EmptyCart)
        ));
        assert_eq!(f.store.order_count().expect("count"), 0);
        assert_eq!(workflow.stage(), CheckoutStage::Invoice);
    }

    #[test]
    fn commit_requires_sign_in() {
        let f = fixture();
        let mut workflow = at_invoice(PaymentMethod::Cod);
        let err = f
            .checkout
            .commit(&Identity::guest(Uuid::new_v4()), &mut workflow)
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::LoginRequired)
        ));
    }

    #[test]
    fn commit_places_order_with_snapshot_prices() {
        let f = fixture();
        let lamp = product(400, ApprovalStatus::Approved);
        let mug = product(200, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        f.store.put_product(mug.clone()).expect("put");
        f.cart.add(f.owner(), lamp.id, 1).expect("add");
        f.cart.add(f.owner(), mug.id, 2).expect("add");
        let mut workflow = at_invoice(PaymentMethod::Cod);

        let order_id = f.checkout.commit(&f.shopper, &mut workflow).expect("commit");

        assert_eq!(workflow, CheckoutWorkflow::default());
        assert!(f.cart.view(f.owner()).expect("view").is_empty());
        assert_eq!(f.stock(&mug).stock_quantity, 8);

        let owner_id = f.shopper.user_id.expect("signed in");
        let view = f
            .store
            .find_for_owner(order_id, owner_id)
            .expect("find")
            .expect("owned");
        assert_eq!(view.order.subtotal, BigDecimal::from(800));
        assert_eq!(view.order.shipping_cost, BigDecimal::from(50));
        assert_eq!(view.order.total, BigDecimal::from(850));
        assert_eq!(view.order.status, OrderStatus::Placed);
        assert_eq!(view.order.payment_status, PaymentStatus::Pending);
        assert_eq!(view.items.len(), 2);

        let mut repriced = f.stock(&lamp);
        repriced.finance_price = Some(BigDecimal::from(999));
        f.store.put_product(repriced).expect("put");
        let view = f
            .store
            .find_for_owner(order_id, owner_id)
            .expect("find")
            .expect("owned");
        let lamp_item = view
            .items
            .iter()
            .find(|i| i.product_id == lamp.id)
            .expect("lamp item");
        assert_eq!(lamp_item.price, BigDecimal::from(400));
        assert!(f.notifier.titles().contains(&"Order placed".to_string()));
    }

    #[test]
    fn prepaid_order_above_threshold_ships_free() {
        let f = fixture();
        let sofa = product(1000, ApprovalStatus::Approved);
        f.store.put_product(sofa.clone()).expect("put");
        f.cart.add(f.owner(), sofa.id, 1).expect("add");
        let mut workflow = at_invoice(PaymentMethod::Upi);

        let invoice = f.checkout.invoice(&f.shopper, &workflow).expect("invoice");
        assert_eq!(invoice.totals.shipping_cost, BigDecimal::from(0));
        assert_eq!(invoice.totals.total, BigDecimal::from(1000));

        let order_id = f.checkout.commit(&f.shopper, &mut workflow).expect("commit");
        let order = OrderRepository::find(f.store.as_ref(), order_id)
            .expect("find")
            .expect("exists");
        assert_eq!(order.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn failed_placement_keeps_cart_and_invoice_stage() {
        let f = fixture();
        let lamp = product(400, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        f.cart.add(f.owner(), lamp.id, 1).expect("add");
        let mut workflow = at_invoice(PaymentMethod::Card);

        f.store.set_unavailable(Table::Orders, true);
        let err = f.checkout.commit(&f.shopper, &mut workflow).unwrap_err();
        assert!(matches!(err, DomainError::Transport(_)));
        assert_eq!(workflow.stage(), CheckoutStage::Invoice);
        assert_eq!(f.cart.view(f.owner()).expect("view").item_count(), 1);
        assert_eq!(f.store.order_item_count().expect("count"), 0);

        f.store.set_unavailable(Table::Orders, false);
        f.checkout.commit(&f.shopper, &mut workflow).expect("retry");
        assert_eq!(f.store.order_count().expect("count"), 1);
    }

    #[test]
    fn insufficient_stock_rejects_whole_order() {
        let f = fixture();
        let lamp = product(400, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        f.cart.add(f.owner(), lamp.id, 11).expect("add");
        let mut workflow = at_invoice(PaymentMethod::Cod);

        let err = f.checkout.commit(&f.shopper, &mut workflow).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::InsufficientStock { available: 10, .. })
        ));
        assert_eq!(f.stock(&lamp).stock_quantity, 10);
        assert_eq!(f.store.order_count().expect("count"), 0);
    }

    struct GatedOrders {
        inner: Arc<MemoryStore>,
        gate: Barrier,
    }

    impl OrderRepository for GatedOrders {
        fn place(&self, order: NewOrder) -> Result<Order, DomainError> {
            self.gate.wait();
            self.inner.place(order)
        }
        fn find(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
            OrderRepository::find(self.inner.as_ref(), id)
        }
        fn find_for_owner(&self, id: Uuid, owner_id: Uuid) -> Result<Option<OrderView>, DomainError> {
            self.inner.find_for_owner(id, owner_id)
        }
        fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<OrderView>, DomainError> {
            self.inner.list_for_owner(owner_id)
        }
        fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
            OrderRepository::list(self.inner.as_ref(), page, limit)
        }
        fn update_status(
            &self,
            id: Uuid,
            from: OrderStatus,
            to: OrderStatus,
            notes: Option<String>,
        ) -> Result<Order, DomainError> {
            self.inner.update_status(id, from, to, notes)
        }
    }

    #[test]
    fn store_rejects_second_placement_of_one_cart() {
        let f = fixture();
        let lamp = product(400, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        f.cart.add(f.owner(), lamp.id, 1).expect("add");
        let checkout = CheckoutService::new(
            f.cart.clone(),
            Arc::new(GatedOrders {
                inner: f.store.clone(),
                gate: Barrier::new(2),
            }),
            ShippingPolicy::default(),
            f.notifier.clone(),
        );

        // Both wizards price the same cart before either reaches the store.
        let results: Vec<Result<Uuid, DomainError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        let mut workflow = at_invoice(PaymentMethod::Cod);
                        checkout.commit(&f.shopper, &mut workflow)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("commit thread"))
                .collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DomainError::Validation(ValidationError::EmptyCart))
        )));
        assert_eq!(f.store.order_count().expect("count"), 1);
        assert_eq!(f.stock(&lamp).stock_quantity, 9);
    }

    // ── sessions ──────────────────────────────────────────────────────────────

    #[test]
    fn concurrent_commits_place_one_order() {
        let f = fixture();
        let lamp = product(400, ApprovalStatus::Approved);
        f.store.put_product(lamp.clone()).expect("put");
        f.cart.add(f.owner(), lamp.id, 1).expect("add");
        let user = f.shopper.user_id.expect("signed in");
        let sessions = CheckoutSessions::new();
        sessions
            .put(user, at_invoice(PaymentMethod::Card))
            .expect("put");

        let results: Vec<Result<Uuid, DomainError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        sessions
                            .update(user, |w| f.checkout.commit(&f.shopper, w))
                            .map(|(order_id, _)| order_id)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("commit thread"))
                .collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(f.store.order_count().expect("count"), 1);
        assert_eq!(f.stock(&lamp).stock_quantity, 9);
        assert_eq!(
            sessions.get(user).expect("get").stage(),
            CheckoutStage::Closed
        );
    }


    #[test]
    fn sessions_keep_progress_after_failed_step() {
        let sessions = CheckoutSessions::new();
        let user = Uuid::new_v4();
        sessions
            .update(user, |w| {
                w.start();
                Ok(())
            })
            .expect("start");

        let err = sessions.update(user, |w| {
            w.choose_payment(PaymentMethod::Cod)?;
            Ok(())
        });
        assert!(err.is_err());
        assert_eq!(
            sessions.get(user).expect("get").stage(),
            CheckoutStage::Address
        );
    }
}
