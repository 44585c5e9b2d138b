use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::product::Product;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WishlistEntry {
    pub owner_id: Uuid,
    pub product_id: Uuid,
    pub product: Option<Product>,
    pub created_at: DateTime<Utc>,
}
