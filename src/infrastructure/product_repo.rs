use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::events::ChangeEvent;
use crate::domain::ports::ProductRepository;
use crate::domain::product::{
    ApprovalStatus, FinanceStatus, NewProduct, PendingProduct, Product, ProductPatch,
};
use crate::schema::{product_images, products, profiles};

use super::models::{NewProductRow, ProductChangeset, ProductRow};
use super::outbox::record_change;

impl From<&ProductPatch> for ProductChangeset {
    fn from(patch: &ProductPatch) -> Self {
        Self {
            approval_status: patch.approval_status.map(|s| s.as_str().to_string()),
            finance_price: patch.finance_price.clone(),
            price: patch.price.clone(),
            finance_status: patch.finance_status.map(|s| s.as_str().to_string()),
            finance_approved_by: patch.finance_approved_by,
            finance_approved_at: patch.finance_approved_at,
            stock_quantity: patch.stock_quantity,
            updated_at: Some(Utc::now()),
        }
    }
}

fn parse_rows(rows: Vec<ProductRow>) -> Result<Vec<Product>, DomainError> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Attaches first image and supplier profile to each product.
fn enrich(
    conn: &mut PgConnection,
    products: Vec<Product>,
) -> Result<Vec<PendingProduct>, DomainError> {
    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let supplier_ids: Vec<Uuid> = products.iter().filter_map(|p| p.supplier_id).collect();

    let images: Vec<(Uuid, String)> = product_images::table
        .filter(product_images::product_id.eq_any(&ids))
        .order((
            product_images::product_id,
            product_images::position.asc(),
            product_images::created_at.asc(),
        ))
        .select((product_images::product_id, product_images::image_url))
        .load(conn)?;
    let mut first_image: HashMap<Uuid, String> = HashMap::new();
    for (product_id, url) in images {
        first_image.entry(product_id).or_insert(url);
    }

    let suppliers: HashMap<Uuid, (Option<String>, Option<String>)> = profiles::table
        .filter(profiles::id.eq_any(&supplier_ids))
        .select((profiles::id, profiles::full_name, profiles::email))
        .load::<(Uuid, Option<String>, Option<String>)>(conn)?
        .into_iter()
        .map(|(id, name, email)| (id, (name, email)))
        .collect();

    Ok(products
        .into_iter()
        .map(|product| {
            let supplier = product.supplier_id.and_then(|id| suppliers.get(&id));
            PendingProduct {
                image_url: first_image.remove(&product.id),
                supplier_name: supplier
                    .and_then(|(name, _)| name.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                supplier_email: supplier
                    .and_then(|(_, email)| email.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                product,
            }
        })
        .collect())
}

pub struct DieselProductRepository {
    pool: DbPool,
}

impl DieselProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl ProductRepository for DieselProductRepository {
    fn find(&self, id: Uuid) -> Result<Option<Product>, DomainError> {
        let mut conn = self.pool.get()?;
        products::table
            .filter(products::id.eq(id))
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(Product::try_from)
            .transpose()
    }

    fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get()?;
        let rows = products::table
            .filter(products::id.eq_any(ids))
            .select(ProductRow::as_select())
            .load(&mut conn)?;
        parse_rows(rows)
    }

    fn list_by_status(&self, status: ApprovalStatus) -> Result<Vec<Product>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = products::table
            .filter(products::approval_status.eq(status.as_str()))
            .order(products::created_at.desc())
            .select(ProductRow::as_select())
            .load(&mut conn)?;
        parse_rows(rows)
    }

    fn find_pending_pricing(&self, id: Uuid) -> Result<Option<PendingProduct>, DomainError> {
        let mut conn = self.pool.get()?;
        let row = products::table
            .filter(products::id.eq(id))
            .filter(products::approval_status.eq(ApprovalStatus::FinancePending.as_str()))
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(enrich(&mut conn, vec![Product::try_from(row)?])?.pop())
    }

    fn list_pending_pricing(&self) -> Result<Vec<PendingProduct>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = products::table
            .filter(products::approval_status.eq(ApprovalStatus::FinancePending.as_str()))
            .order(products::created_at.desc())
            .select(ProductRow::as_select())
            .load(&mut conn)?;
        let products = parse_rows(rows)?;
        enrich(&mut conn, products)
    }

    fn insert(&self, product: NewProduct) -> Result<Product, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let row = diesel::insert_into(products::table)
                .values(&NewProductRow {
                    id: Uuid::new_v4(),
                    supplier_id: Some(product.supplier_id),
                    name: product.name.clone(),
                    description: product.description.clone(),
                    supplier_price: product.supplier_price.clone(),
                    price: product.supplier_price.clone(),
                    stock_quantity: product.stock_quantity,
                    approval_status: ApprovalStatus::Pending.as_str().to_string(),
                    finance_status: Some(FinanceStatus::Pending.as_str().to_string()),
                })
                .returning(ProductRow::as_returning())
                .get_result(conn)?;
            let created = Product::try_from(row)?;

            if let Some(url) = &product.image_url {
                diesel::insert_into(product_images::table)
                    .values((
                        product_images::id.eq(Uuid::new_v4()),
                        product_images::product_id.eq(created.id),
                        product_images::image_url.eq(url),
                        product_images::position.eq(0),
                    ))
                    .execute(conn)?;
            }

            record_change(
                conn,
                &ChangeEvent::ProductChanged {
                    product_id: created.id,
                    old_status: None,
                    new_status: Some(created.approval_status),
                },
            )?;
            Ok(created)
        })
    }

    fn transition(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        patch: ProductPatch,
    ) -> Result<Product, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // Lock the row so the status check and the write see the same state.
            let current = products::table
                .filter(products::id.eq(id))
                .select(ProductRow::as_select())
                .for_update()
                .get_result(conn)
                .optional()?
                .ok_or(DomainError::NotFound("Product"))?;
            let current = Product::try_from(current)?;
            if current.approval_status != expected {
                return Err(DomainError::Conflict(format!(
                    "product {id} is {}, not {expected}",
                    current.approval_status
                )));
            }

            let mut updated = current;
            patch.apply(&mut updated);
            let updated = updated.validate()?;

            diesel::update(products::table.filter(products::id.eq(id)))
                .set(&ProductChangeset::from(&patch))
                .execute(conn)?;

            record_change(
                conn,
                &ChangeEvent::ProductChanged {
                    product_id: id,
                    old_status: Some(expected),
                    new_status: Some(updated.approval_status),
                },
            )?;
            Ok(updated)
        })
    }

    fn delete(&self, id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let status: Option<String> = diesel::delete(products::table.filter(products::id.eq(id)))
                .returning(products::approval_status)
                .get_result(conn)
                .optional()?;
            if let Some(status) = status {
                record_change(
                    conn,
                    &ChangeEvent::ProductChanged {
                        product_id: id,
                        old_status: Some(status.parse()?),
                        new_status: None,
                    },
                )?;
            }
            Ok(())
        })
    }
}
