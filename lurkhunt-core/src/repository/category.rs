use sqlx::{PgPool, Row};

use crate::{models::Category, Result};

/// Stream category repository for database operations
#[derive(Clone)]
pub struct CategoryRepository {
    pool: PgPool,
}

impl CategoryRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the category if unknown; refresh the localized name if it
    /// changed since we last saw it.
    pub async fn upsert(&self, category: &Category) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO categories (category_id, category_name)
            VALUES ($1, $2)
            ON CONFLICT (category_id)
            DO UPDATE SET category_name = EXCLUDED.category_name
            ",
        )
        .bind(category.category_id)
        .bind(&category.category_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, category_id: i64) -> Result<Option<Category>> {
        let row = sqlx::query(
            r"
            SELECT category_id, category_name FROM categories
            WHERE category_id = $1
            ",
        )
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Category {
                category_id: row.try_get("category_id")?,
                category_name: row.try_get("category_name")?,
            })),
            None => Ok(None),
        }
    }
}
