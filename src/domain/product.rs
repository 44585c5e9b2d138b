use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Submitted by a supplier, waiting for an admin to look at it.
    Pending,
    /// Accepted by an admin, waiting for finance to set the selling price.
    FinancePending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::FinancePending => "finance_pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "finance_pending" => Ok(ApprovalStatus::FinancePending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(DomainError::MalformedRecord(format!(
                "unknown approval status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinanceStatus {
    Pending,
    Approved,
}

impl FinanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinanceStatus::Pending => "pending",
            FinanceStatus::Approved => "approved",
        }
    }
}

impl FromStr for FinanceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FinanceStatus::Pending),
            "approved" => Ok(FinanceStatus::Approved),
            other => Err(DomainError::MalformedRecord(format!(
                "unknown finance status '{other}'"
            ))),
        }
    }
}

/// A catalog product as the storefront sees it.
///
/// `price` mirrors the finance price once finance has approved the product;
/// customer-facing computations always go through [`Product::display_price`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub supplier_price: BigDecimal,
    pub finance_price: Option<BigDecimal>,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub approval_status: ApprovalStatus,
    pub finance_status: Option<FinanceStatus>,
    pub finance_approved_by: Option<Uuid>,
    pub finance_approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn display_price(&self) -> &BigDecimal {
        self.finance_price.as_ref().unwrap_or(&self.supplier_price)
    }

    pub fn is_purchasable(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }

    /// Rejects values no well-formed product row can hold.
    pub fn validate(self) -> Result<Self, DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::MalformedRecord(format!(
                "product {} has no name",
                self.id
            )));
        }
        if self.supplier_price < BigDecimal::zero() {
            return Err(DomainError::MalformedRecord(format!(
                "product {} has a negative supplier price",
                self.id
            )));
        }
        if matches!(&self.finance_price, Some(p) if *p <= BigDecimal::zero()) {
            return Err(DomainError::MalformedRecord(format!(
                "product {} has a non-positive finance price",
                self.id
            )));
        }
        if self.stock_quantity < 0 {
            return Err(DomainError::MalformedRecord(format!(
                "product {} has negative stock",
                self.id
            )));
        }
        Ok(self)
    }
}

/// Supplier submission. New products always start as `pending`.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub supplier_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub supplier_price: BigDecimal,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
}

/// Partial update applied to a product whose approval status is known.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub approval_status: Option<ApprovalStatus>,
    pub finance_price: Option<BigDecimal>,
    pub price: Option<BigDecimal>,
    pub finance_status: Option<FinanceStatus>,
    pub finance_approved_by: Option<Uuid>,
    pub finance_approved_at: Option<DateTime<Utc>>,
    pub stock_quantity: Option<i32>,
}

impl ProductPatch {
    pub fn apply(&self, product: &mut Product) {
        if let Some(status) = self.approval_status {
            product.approval_status = status;
        }
        if let Some(price) = &self.finance_price {
            product.finance_price = Some(price.clone());
        }
        if let Some(price) = &self.price {
            product.price = price.clone();
        }
        if let Some(status) = self.finance_status {
            product.finance_status = Some(status);
        }
        if let Some(by) = self.finance_approved_by {
            product.finance_approved_by = Some(by);
        }
        if let Some(at) = self.finance_approved_at {
            product.finance_approved_at = Some(at);
        }
        if let Some(stock) = self.stock_quantity {
            product.stock_quantity = stock;
        }
    }
}

/// A `finance_pending` product with the details the finance queue shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingProduct {
    pub product: Product,
    pub image_url: Option<String>,
    pub supplier_name: String,
    pub supplier_email: String,
}
