use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{DomainError, ValidationError};
use crate::domain::events::ChangeFilter;
use crate::domain::identity::{Identity, Role};
use crate::domain::notice::Notice;
use crate::domain::order::{ListResult, Order, OrderStatus, OrderView};
use crate::domain::ports::{Notifier, OrderRepository};
use crate::infrastructure::change_feed::{ChangeFeed, Subscription};

pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    feed: ChangeFeed,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>, feed: ChangeFeed, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repo,
            feed,
            notifier,
        }
    }

    /// The caller's orders, newest first, without cancelled ones.
    pub fn list_mine(&self, identity: &Identity) -> Result<Vec<OrderView>, DomainError> {
        let owner_id = identity.require_user()?;
        self.repo.list_for_owner(owner_id)
    }

    /// Orders that do not belong to the caller are reported as missing.
    pub fn track(&self, identity: &Identity, order_id: Uuid) -> Result<OrderView, DomainError> {
        let owner_id = identity.require_user()?;
        self.repo
            .find_for_owner(order_id, owner_id)?
            .ok_or(DomainError::NotFound("Order"))
    }

    pub fn cancel(
        &self,
        identity: &Identity,
        order_id: Uuid,
        reason: &str,
    ) -> Result<Order, DomainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::EmptyCancellationReason.into());
        }
        let current = self.track(identity, order_id)?.order;
        current.status.ensure_transition(OrderStatus::Cancelled)?;

        let cancelled = self.repo.update_status(
            order_id,
            current.status,
            OrderStatus::Cancelled,
            Some(reason.to_string()),
        )?;
        log::info!("order {order_id} cancelled by owner: {reason}");
        self.notifier.notify(Notice::info("Order cancelled"));
        Ok(cancelled)
    }

    /// Paginated view over every order, for administrators.
    pub fn list(&self, identity: &Identity, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        identity.require_role(Role::Admin)?;
        self.repo.list(page.max(1), limit.clamp(1, 100))
    }

    /// Moves an order forward along the fulfilment track. Cancelling this
    /// way still needs a reason.
    pub fn advance(
        &self,
        identity: &Identity,
        order_id: Uuid,
        to: OrderStatus,
        notes: Option<String>,
    ) -> Result<Order, DomainError> {
        identity.require_role(Role::Admin)?;
        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if to == OrderStatus::Cancelled && notes.is_none() {
            return Err(ValidationError::EmptyCancellationReason.into());
        }

        let current = self
            .repo
            .find(order_id)?
            .ok_or(DomainError::NotFound("Order"))?;
        if let Err(e) = current.status.ensure_transition(to) {
            log::warn!("rejected status change on order {order_id}: {e}");
            return Err(e);
        }

        let updated = self.repo.update_status(order_id, current.status, to, notes)?;
        log::info!("order {order_id} moved from {} to {to}", current.status);
        Ok(updated)
    }

    /// Change notifications for the caller's orders. Dropping the
    /// subscription unsubscribes.
    pub fn watch_mine(&self, identity: &Identity) -> Result<Subscription, DomainError> {
        let owner_id = identity.require_user()?;
        Ok(self.feed.subscribe(ChangeFilter::OrdersOf(owner_id)))
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use super::*;
    use crate::domain::events::ChangeEvent;
    use crate::domain::order::{
        Address, NewOrder, NewOrderItem, PaymentMethod, ShippingPolicy,
    };
    use crate::domain::ports::CartRepository;
    use crate::domain::product::fixtures::product;
    use crate::domain::product::ApprovalStatus;
    use crate::infrastructure::change_feed::Delivery;
    use crate::infrastructure::memory::MemoryStore;
    use crate::infrastructure::notifier::RecordingNotifier;

    fn setup() -> (Arc<MemoryStore>, OrderService) {
        let feed = ChangeFeed::default();
        let store = Arc::new(MemoryStore::new(feed.clone()));
        let service = OrderService::new(store.clone(), feed, Arc::new(RecordingNotifier::new()));
        (store, service)
    }

    fn place(store: &MemoryStore, owner_id: Uuid) -> Order {
        let lamp = product(400, ApprovalStatus::Approved);
        store.put_product(lamp.clone()).expect("put");
        CartRepository::add(store, owner_id, lamp.id, 1).expect("add to cart");
        store
            .place(NewOrder {
                owner_id,
                address: Address {
                    full_name: "Asha Rao".into(),
                    phone: "9876543210".into(),
                    address_line: "12 MG Road".into(),
                    city: "Pune".into(),
                    state: "MH".into(),
                    pincode: "411001".into(),
                },
                totals: ShippingPolicy::default().quote(BigDecimal::from(400)),
                payment_method: PaymentMethod::Cod,
                items: vec![NewOrderItem {
                    price: lamp.price.clone(),
                    product_snapshot: lamp,
                    quantity: 1,
                }],
            })
            .expect("place")
    }

    fn admin() -> Identity {
        Identity::user(Uuid::new_v4(), vec![Role::Admin])
    }

    // ── owner operations ──────────────────────────────────────────────────────

    #[test]
    fn cancel_requires_reason() {
        let (store, service) = setup();
        let owner = Identity::user(Uuid::new_v4(), vec![Role::Shopper]);
        let order = place(&store, owner.user_id.expect("user"));

        let err = service.cancel(&owner, order.id, "   ").unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::EmptyCancellationReason)
        ));
        assert_eq!(
            service.track(&owner, order.id).expect("track").order.status,
            OrderStatus::Placed
        );
    }

    #[test]
    fn cancelled_order_is_final_and_hidden() {
        let (store, service) = setup();
        let owner = Identity::user(Uuid::new_v4(), vec![Role::Shopper]);
        let order = place(&store, owner.user_id.expect("user"));

        let cancelled = service
            .cancel(&owner, order.id, "Ordered by mistake")
            .expect("cancel");
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("Ordered by mistake"));
        assert!(service.list_mine(&owner).expect("list").is_empty());

        let err = service.cancel(&owner, order.id, "again").unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        let err = service
            .advance(&admin(), order.id, OrderStatus::Shipped, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn other_owners_order_is_not_found() {
        let (store, service) = setup();
        let order = place(&store, Uuid::new_v4());
        let stranger = Identity::user(Uuid::new_v4(), vec![Role::Shopper]);

        assert!(matches!(
            service.track(&stranger, order.id),
            Err(DomainError::NotFound("Order"))
        ));
        assert!(service.cancel(&stranger, order.id, "nope").is_err());
    }

    #[test]
    fn tracking_step_follows_status() {
        let (store, service) = setup();
        let owner = Identity::user(Uuid::new_v4(), vec![Role::Shopper]);
        let order = place(&store, owner.user_id.expect("user"));

        service
            .advance(&admin(), order.id, OrderStatus::Shipped, None)
            .expect("ship");
        let view = service.track(&owner, order.id).expect("track");
        assert_eq!(view.tracking_step(), Some(2));
    }

    // ── admin operations ──────────────────────────────────────────────────────

    #[test]
    fn advance_refuses_going_backwards() {
        let (store, service) = setup();
        let order = place(&store, Uuid::new_v4());
        service
            .advance(&admin(), order.id, OrderStatus::Delivered, None)
            .expect("deliver");

        let err = service
            .advance(&admin(), order.id, OrderStatus::Processing, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn admin_cancel_needs_notes() {
        let (store, service) = setup();
        let order = place(&store, Uuid::new_v4());
        let err = service
            .advance(&admin(), order.id, OrderStatus::Cancelled, Some(" ".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::EmptyCancellationReason)
        ));
    }

    #[test]
    fn list_is_admin_only_and_paginates() {
        let (store, service) = setup();
        for _ in 0..3 {
            place(&store, Uuid::new_v4());
        }
        let shopper = Identity::user(Uuid::new_v4(), vec![Role::Shopper]);
        assert!(matches!(
            service.list(&shopper, 1, 20),
            Err(DomainError::Forbidden(_))
        ));

        let page = service.list(&admin(), 2, 2).expect("list");
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
    }

    // ── change notifications ──────────────────────────────────────────────────

    #[test]
    fn watch_mine_sees_only_own_orders() {
        let (store, service) = setup();
        let owner = Identity::user(Uuid::new_v4(), vec![Role::Shopper]);
        let mut subscription = service.watch_mine(&owner).expect("watch");

        place(&store, Uuid::new_v4());
        let mine = place(&store, owner.user_id.expect("user"));

        match subscription.try_next() {
            Some(Delivery::Event(ChangeEvent::OrderChanged { order_id, .. })) => {
                assert_eq!(order_id, mine.id)
            }
            other => panic!("unexpected delivery {other:?}"),
        }
        assert!(subscription.try_next().is_none());
    }
}
