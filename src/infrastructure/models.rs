use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderItem};
use crate::domain::product::Product;
use crate::schema::{cart, order_items, orders, products, storefront_outbox, wishlist};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductRow {
    pub id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub supplier_price: BigDecimal,
    pub finance_price: Option<BigDecimal>,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub approval_status: String,
    pub finance_status: Option<String>,
    pub finance_approved_by: Option<Uuid>,
    pub finance_approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DomainError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Product {
            id: row.id,
            supplier_id: row.supplier_id,
            name: row.name,
            description: row.description,
            supplier_price: row.supplier_price,
            finance_price: row.finance_price,
            price: row.price,
            stock_quantity: row.stock_quantity,
            approval_status: row.approval_status.parse()?,
            finance_status: row.finance_status.map(|s| s.parse()).transpose()?,
            finance_approved_by: row.finance_approved_by,
            finance_approved_at: row.finance_approved_at,
            created_at: row.created_at,
        }
        .validate()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = products)]
pub struct NewProductRow {
    pub id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub supplier_price: BigDecimal,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub approval_status: String,
    pub finance_status: Option<String>,
}

/// Only the `Some` fields are written.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = products)]
pub struct ProductChangeset {
    pub approval_status: Option<String>,
    pub finance_price: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub finance_status: Option<String>,
    pub finance_approved_by: Option<Uuid>,
    pub finance_approved_at: Option<DateTime<Utc>>,
    pub stock_quantity: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = cart)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartRow {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = cart)]
pub struct NewCartRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_snapshot: Value,
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub total: BigDecimal,
    pub payment_method: String,
    pub payment_status: String,
    pub order_status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let address = serde_json::from_value(row.address_snapshot).map_err(|e| {
            DomainError::MalformedRecord(format!("order {} address: {e}", row.id))
        })?;
        Ok(Order {
            id: row.id,
            owner_id: row.user_id,
            address,
            subtotal: row.subtotal,
            shipping_cost: row.shipping_cost,
            total: row.total,
            payment_method: row.payment_method.parse()?,
            payment_status: row.payment_status.parse()?,
            status: row.order_status.parse()?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_snapshot: Value,
    pub subtotal: BigDecimal,
    pub shipping_cost: BigDecimal,
    pub total: BigDecimal,
    pub payment_method: String,
    pub payment_status: String,
    pub order_status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_items)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_snapshot: Value,
    pub quantity: i32,
    pub price: BigDecimal,
    pub supplier_status: String,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = DomainError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let product_snapshot = serde_json::from_value(row.product_snapshot).map_err(|e| {
            DomainError::MalformedRecord(format!("order item {} snapshot: {e}", row.id))
        })?;
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_snapshot,
            quantity: row.quantity,
            price: row.price,
            supplier_status: row.supplier_status,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_items)]
pub struct NewOrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_snapshot: Value,
    pub quantity: i32,
    pub price: BigDecimal,
    pub supplier_status: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = wishlist)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WishlistRow {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = wishlist)]
pub struct NewWishlistRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = storefront_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = storefront_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}
