use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ValidationError;
use super::product::Product;

/// Whose cart an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartOwner {
    User(Uuid),
    /// Anonymous device session; its cart lives in the guest slot.
    Guest(Uuid),
}

/// One selection in a cart. The guest slot stores these as JSON verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A cart line joined with its product, if the product still resolves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartEntry {
    pub product_id: Uuid,
    pub quantity: i32,
    pub product: Option<Product>,
}

impl CartEntry {
    pub fn line_total(&self) -> BigDecimal {
        match &self.product {
            Some(product) => product.display_price().clone() * BigDecimal::from(self.quantity),
            None => BigDecimal::zero(),
        }
    }
}

/// Post-mutation view of a cart, products resolved.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CartView {
    pub entries: Vec<CartEntry>,
}

impl CartView {
    pub fn resolve(lines: Vec<CartLine>, products: &[Product]) -> Self {
        let entries = lines
            .into_iter()
            .map(|line| CartEntry {
                product: products.iter().find(|p| p.id == line.product_id).cloned(),
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect();
        Self { entries }
    }

    pub fn total(&self) -> BigDecimal {
        self.entries
            .iter()
            .fold(BigDecimal::zero(), |acc, entry| acc + entry.line_total())
    }

    pub fn item_count(&self) -> i64 {
        self.entries.iter().map(|e| i64::from(e.quantity)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Most units of one product a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 9_999;

/// `current + added`, refused past [`MAX_LINE_QUANTITY`].
pub fn checked_line_total(current: i32, added: i32) -> Result<i32, ValidationError> {
    current
        .checked_add(added)
        .filter(|total| *total <= MAX_LINE_QUANTITY)
        .ok_or(ValidationError::QuantityTooLarge {
            max: MAX_LINE_QUANTITY,
        })
}

/// Applies `add` semantics to an in-memory line list: bump or append.
pub fn add_line(
    lines: &mut Vec<CartLine>,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ValidationError> {
    match lines.iter_mut().find(|l| l.product_id == product_id) {
        Some(line) => line.quantity = checked_line_total(line.quantity, quantity)?,
        None => lines.push(CartLine {
            product_id,
            quantity: checked_line_total(0, quantity)?,
        }),
    }
    Ok(())
}

/// Folds `incoming` into `lines` the way a login merge does. Totals past
/// [`MAX_LINE_QUANTITY`] are capped rather than refused.
pub fn merge_lines(lines: &mut Vec<CartLine>, incoming: &[CartLine]) {
    for extra in incoming {
        match lines.iter_mut().find(|l| l.product_id == extra.product_id) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .saturating_add(extra.quantity)
                    .min(MAX_LINE_QUANTITY)
            }
            None => lines.push(CartLine {
                product_id: extra.product_id,
                quantity: extra.quantity.min(MAX_LINE_QUANTITY),
            }),
        }
    }
}

/// Applies `setQuantity` semantics; a non-positive quantity removes the line.
pub fn set_line_quantity(lines: &mut Vec<CartLine>, product_id: Uuid, quantity: i32) {
    if quantity <= 0 {
        lines.retain(|l| l.product_id != product_id);
    } else if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
        line.quantity = quantity;
    }
}
