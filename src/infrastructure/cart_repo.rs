use diesel::prelude::*;
use diesel::upsert::excluded;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::{checked_line_total, merge_lines, CartLine};
use crate::domain::errors::DomainError;
use crate::domain::ports::CartRepository;
use crate::schema::cart;

use super::models::{CartRow, NewCartRow};

pub struct DieselCartRepository {
    pool: DbPool,
}

impl DieselCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CartRepository for DieselCartRepository {
    fn lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = cart::table
            .filter(cart::user_id.eq(user_id))
            .order(cart::created_at.asc())
            .select(CartRow::as_select())
            .load(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|r| CartLine {
                product_id: r.product_id,
                quantity: r.quantity,
            })
            .collect())
    }

    fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let current: Option<i32> = cart::table
                .filter(cart::user_id.eq(user_id))
                .filter(cart::product_id.eq(product_id))
                .select(cart::quantity)
                .for_update()
                .first(conn)
                .optional()?;
            checked_line_total(current.unwrap_or(0), quantity)?;

            // Upsert so a concurrent first add never produces a second line.
            diesel::insert_into(cart::table)
                .values(&NewCartRow {
                    id: Uuid::new_v4(),
                    user_id,
                    product_id,
                    quantity,
                })
                .on_conflict((cart::user_id, cart::product_id))
                .do_update()
                .set(cart::quantity.eq(cart::quantity + excluded(cart::quantity)))
                .execute(conn)?;
            Ok(())
        })
    }

    fn add_many(&self, user_id: Uuid, lines: &[CartLine]) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let mut merged: Vec<CartLine> = cart::table
                .filter(cart::user_id.eq(user_id))
                .select((cart::product_id, cart::quantity))
                .for_update()
                .load::<(Uuid, i32)>(conn)?
                .into_iter()
                .map(|(product_id, quantity)| CartLine {
                    product_id,
                    quantity,
                })
                .collect();
            merge_lines(&mut merged, lines);

            let rows: Vec<NewCartRow> = merged
                .into_iter()
                .filter(|line| lines.iter().any(|l| l.product_id == line.product_id))
                .map(|line| NewCartRow {
                    id: Uuid::new_v4(),
                    user_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect();
            if rows.is_empty() {
                return Ok(());
            }
            diesel::insert_into(cart::table)
                .values(&rows)
                .on_conflict((cart::user_id, cart::product_id))
                .do_update()
                .set(cart::quantity.eq(excluded(cart::quantity)))
                .execute(conn)?;
            Ok(())
        })
    }

    fn insert(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(cart::table)
            .values(&NewCartRow {
                id: Uuid::new_v4(),
                user_id,
                product_id,
                quantity,
            })
            .execute(&mut conn)?;
        Ok(())
    }

    fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::update(
            cart::table
                .filter(cart::user_id.eq(user_id))
                .filter(cart::product_id.eq(product_id)),
        )
        .set(cart::quantity.eq(quantity))
        .execute(&mut conn)?;
        Ok(())
    }

    fn remove(&self, user_id: Uuid, product_id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::delete(
            cart::table
                .filter(cart::user_id.eq(user_id))
                .filter(cart::product_id.eq(product_id)),
        )
        .execute(&mut conn)?;
        Ok(())
    }

    fn clear(&self, user_id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::delete(cart::table.filter(cart::user_id.eq(user_id))).execute(&mut conn)?;
        Ok(())
    }
}
