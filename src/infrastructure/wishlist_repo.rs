use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::WishlistRepository;
use crate::domain::product::Product;
use crate::domain::wishlist::WishlistEntry;
use crate::schema::{products, wishlist};

use super::models::{NewWishlistRow, ProductRow, WishlistRow};

pub struct DieselWishlistRepository {
    pool: DbPool,
}

impl DieselWishlistRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl WishlistRepository for DieselWishlistRepository {
    fn list(&self, owner_id: Uuid) -> Result<Vec<WishlistEntry>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<(WishlistRow, Option<ProductRow>)> = wishlist::table
            .left_join(products::table.on(products::id.eq(wishlist::product_id)))
            .filter(wishlist::user_id.eq(owner_id))
            .order(wishlist::created_at.desc())
            .select((WishlistRow::as_select(), Option::<ProductRow>::as_select()))
            .load(&mut conn)?;

        rows.into_iter()
            .map(|(entry, product)| {
                Ok(WishlistEntry {
                    owner_id: entry.user_id,
                    product_id: entry.product_id,
                    product: product.map(Product::try_from).transpose()?,
                    created_at: entry.created_at,
                })
            })
            .collect()
    }

    fn contains(&self, owner_id: Uuid, product_id: Uuid) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        let found = diesel::select(diesel::dsl::exists(
            wishlist::table
                .filter(wishlist::user_id.eq(owner_id))
                .filter(wishlist::product_id.eq(product_id)),
        ))
        .get_result(&mut conn)?;
        Ok(found)
    }

    fn add(&self, owner_id: Uuid, product_id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(wishlist::table)
            .values(&NewWishlistRow {
                id: Uuid::new_v4(),
                user_id: owner_id,
                product_id,
            })
            .execute(&mut conn)?;
        Ok(())
    }

    fn remove(&self, owner_id: Uuid, product_id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::delete(
            wishlist::table
                .filter(wishlist::user_id.eq(owner_id))
                .filter(wishlist::product_id.eq(product_id)),
        )
        .execute(&mut conn)?;
        Ok(())
    }
}
