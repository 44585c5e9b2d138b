use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::CartLine;
use super::errors::{DomainError, ValidationError};
use super::product::Product;

/// Shipping address as captured on the address step. Stored on the order as
/// an immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub phone: String,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl Address {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("full_name", &self.full_name),
            ("phone", &self.phone),
            ("address_line", &self.address_line),
            ("city", &self.city),
            ("state", &self.state),
            ("pincode", &self.pincode),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(ValidationError::MissingAddressField(*name)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Upi,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
        }
    }

    /// Prepaid methods are settled at checkout (simulated); cash on delivery
    /// stays pending until the parcel is paid for.
    pub fn initial_payment_status(&self) -> PaymentStatus {
        match self {
            PaymentMethod::Cod => PaymentStatus::Pending,
            PaymentMethod::Upi | PaymentMethod::Card => PaymentStatus::Completed,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(PaymentMethod::Cod),
            "upi" => Ok(PaymentMethod::Upi),
            "card" => Ok(PaymentMethod::Card),
            other => Err(DomainError::MalformedRecord(format!(
                "unknown payment method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            other => Err(DomainError::MalformedRecord(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Fulfilment steps in order; `Cancelled` sits outside the track.
pub const TRACKING_STEPS: [OrderStatus; 4] = [
    OrderStatus::Placed,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Position on the tracking track, `None` for cancelled orders.
    pub fn step_index(&self) -> Option<usize> {
        TRACKING_STEPS.iter().position(|s| s == self)
    }

    /// Forward moves along the track, or cancellation from any
    /// non-terminal state. Nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == OrderStatus::Cancelled {
            return true;
        }
        match (self.step_index(), next.step_index()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    pub fn ensure_transition(&self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(OrderStatus::Placed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::MalformedRecord(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// Flat-rate shipping, waived when the subtotal is strictly above the
/// threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ShippingPolicy {
    pub free_above: BigDecimal,
    pub flat_cost: BigDecimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            free_above: BigDecimal::from(999),
            flat_cost: BigDecimal::from(50),
        }
    }
}

impl ShippingPolicy {
    pub fn quote(&self, subtotal: BigDecimal) -> OrderTotals {
        let shipping_cost = if subtotal > self.free_above {
            BigDecimal::zero()
        } else {
            self.flat_cost.clone()
        };
        let total = &subtotal + &shipping_cost;
        OrderTotals {
            subtotal,
            shipping_cost,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderTotals {
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub address: Address,
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub total: BigDecimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_snapshot: Product,
    pub quantity: i32,
    pub price: BigDecimal,
    pub supplier_status: String,
}

/// Everything needed to write an order and its items in one go.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub owner_id: Uuid,
    pub address: Address,
    pub totals: OrderTotals,
    pub payment_method: PaymentMethod,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_method.initial_payment_status()
    }

    /// Checks the cart rows about to be cleared are exactly the lines this
    /// order was priced from. An emptied cart means the order was already
    /// placed.
    pub fn matches_cart(&self, lines: &[CartLine]) -> Result<(), DomainError> {
        if lines.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }
        let same = lines.len() == self.items.len()
            && lines.iter().all(|line| {
                self.items
                    .iter()
                    .any(|item| item.product_id() == line.product_id && item.quantity == line.quantity)
            });
        if same {
            Ok(())
        } else {
            Err(DomainError::Conflict("cart changed during checkout".to_string()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_snapshot: Product,
    pub quantity: i32,
    pub price: BigDecimal,
}

impl NewOrderItem {
    pub fn product_id(&self) -> Uuid {
        self.product_snapshot.id
    }
}

pub const INITIAL_SUPPLIER_STATUS: &str = "pending";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderView {
    pub fn tracking_step(&self) -> Option<usize> {
        self.order.status.step_index()
    }
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<Order>,
    pub total: i64,
}
