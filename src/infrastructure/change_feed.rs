use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::domain::events::{ChangeEvent, ChangeFilter};

/// In-process fan-out of row change events.
///
/// Delivery is at-least-once from the consumer's point of view: the outbox
/// relay may republish after a restart, so consumers must reconcile rather
/// than apply deltas.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

/// What a subscriber gets out of [`Subscription::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Event(ChangeEvent),
    /// Events were dropped because the subscriber fell behind; re-read state.
    Resync,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No live subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription {
            filter,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A live listener. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    filter: ChangeFilter,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn filter(&self) -> ChangeFilter {
        self.filter
    }

    /// Waits for the next matching event. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(Delivery::Event(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("change subscriber lagged, {skipped} events dropped");
                    return Some(Delivery::Resync);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::next`].
    pub fn try_next(&mut self) -> Option<Delivery> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(Delivery::Event(event)),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("change subscriber lagged, {skipped} events dropped");
                    return Some(Delivery::Resync);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::domain::product::ApprovalStatus;

    fn product_event() -> ChangeEvent {
        ChangeEvent::ProductChanged {
            product_id: Uuid::new_v4(),
            old_status: Some(ApprovalStatus::FinancePending),
            new_status: Some(ApprovalStatus::Approved),
        }
    }

    #[test]
    fn subscription_only_sees_matching_events() {
        let feed = ChangeFeed::new(8);
        let mut sub = feed.subscribe(ChangeFilter::Products);
        feed.publish(ChangeEvent::OrderChanged {
            order_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            status: OrderStatus::Placed,
        });
        let event = product_event();
        feed.publish(event.clone());

        assert_eq!(sub.try_next(), Some(Delivery::Event(event)));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let feed = ChangeFeed::new(8);
        let sub = feed.subscribe(ChangeFilter::Products);
        assert_eq!(feed.subscriber_count(), 1);
        drop(sub);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn lagging_subscriber_is_told_to_resync() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe(ChangeFilter::Products);
        for _ in 0..5 {
            feed.publish(product_event());
        }
        assert_eq!(sub.try_next(), Some(Delivery::Resync));
    }

    #[tokio::test]
    async fn next_waits_for_published_event() {
        let feed = ChangeFeed::new(8);
        let mut sub = feed.subscribe(ChangeFilter::Products);
        let event = product_event();
        let publisher = feed.clone();
        let sent = event.clone();
        tokio::spawn(async move { publisher.publish(sent) });

        assert_eq!(sub.next().await, Some(Delivery::Event(event)));
    }
}
