use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::OrderStatus;
use super::product::ApprovalStatus;

/// Row-level change notification. Each event carries the full before/after
/// state it concerns, so consumers can reconcile without remembering history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ChangeEvent {
    ProductChanged {
        product_id: Uuid,
        old_status: Option<ApprovalStatus>,
        new_status: Option<ApprovalStatus>,
    },
    OrderChanged {
        order_id: Uuid,
        owner_id: Uuid,
        status: OrderStatus,
    },
}

impl ChangeEvent {
    pub fn aggregate_type(&self) -> &'static str {
        match self {
            ChangeEvent::ProductChanged { .. } => "Product",
            ChangeEvent::OrderChanged { .. } => "Order",
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::ProductChanged { .. } => "ProductChanged",
            ChangeEvent::OrderChanged { .. } => "OrderChanged",
        }
    }

    pub fn aggregate_id(&self) -> Uuid {
        match self {
            ChangeEvent::ProductChanged { product_id, .. } => *product_id,
            ChangeEvent::OrderChanged { order_id, .. } => *order_id,
        }
    }
}

/// Which events a subscriber wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    Products,
    OrdersOf(Uuid),
}

impl ChangeFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (ChangeFilter::Products, ChangeEvent::ProductChanged { .. }) => true,
            (ChangeFilter::OrdersOf(owner), ChangeEvent::OrderChanged { owner_id, .. }) => {
                owner == owner_id
            }
            _ => false,
        }
    }
}
