use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use jiwani_core::menu::{Category, MenuFilter, MenuItem, NewMenuItem};
use jiwani_core::repository::MenuRepository;
use jiwani_core::{CoreError, CoreResult};

use crate::errors::{db_error, is_foreign_key_violation};

pub struct StoreMenuRepository {
    pool: PgPool,
}

impl StoreMenuRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_item(&self, id: i64) -> CoreResult<MenuItem> {
        self.get_item(id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("menu item {}", id)))
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
}

#[derive(sqlx::FromRow)]
struct MenuItemRow {
    id: i64,
    name: String,
    price: i64,
    image: Option<String>,
    category_id: i64,
    category: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<MenuItemRow> for MenuItem {
    fn from(row: MenuItemRow) -> Self {
        MenuItem {
            id: row.id,
            name: row.name,
            price: row.price,
            image: row.image,
            category_id: row.category_id,
            category: row.category,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const SELECT_ITEMS: &str = r#"
    SELECT m.id, m.name, m.price, m.image, m.category_id, c.name AS category, m.is_active, m.created_at
    FROM menu_items m
    LEFT JOIN categories c ON c.id = m.category_id
"#;

fn category_error(e: sqlx::Error, category_id: i64) -> CoreError {
    if is_foreign_key_violation(&e) {
        CoreError::not_found(format!("category {}", category_id))
    } else {
        db_error(e)
    }
}

#[async_trait]
impl MenuRepository for StoreMenuRepository {
    async fn list_categories(&self) -> CoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT id, name FROM categories ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.into_iter().map(|r| Category { id: r.id, name: r.name }).collect())
    }

    async fn list_items(&self, filter: &MenuFilter) -> CoreResult<Vec<MenuItem>> {
        let sql = format!(
            "{} WHERE ($1::BIGINT IS NULL OR m.category_id = $1) AND ($2::BOOLEAN IS NULL OR m.is_active = $2) ORDER BY m.id",
            SELECT_ITEMS
        );
        let rows = sqlx::query_as::<_, MenuItemRow>(&sql)
            .bind(filter.category_id)
            .bind(filter.is_active)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.into_iter().map(MenuItem::from).collect())
    }

    async fn get_item(&self, id: i64) -> CoreResult<Option<MenuItem>> {
        let sql = format!("{} WHERE m.id = $1", SELECT_ITEMS);
        let row = sqlx::query_as::<_, MenuItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(MenuItem::from))
    }

    async fn create_item(&self, item: &NewMenuItem) -> CoreResult<MenuItem> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO menu_items (name, price, image, category_id, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&item.name)
        .bind(item.price)
        .bind(&item.image)
        .bind(item.category_id)
        .bind(item.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| category_error(e, item.category_id))?;

        self.fetch_item(id).await
    }

    async fn update_item(&self, id: i64, item: &NewMenuItem) -> CoreResult<MenuItem> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE menu_items
            SET name = $2, price = $3, image = $4, category_id = $5, is_active = $6
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&item.name)
        .bind(item.price)
        .bind(&item.image)
        .bind(item.category_id)
        .bind(item.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| category_error(e, item.category_id))?;

        match updated {
            Some(id) => self.fetch_item(id).await,
            None => Err(CoreError::not_found(format!("menu item {}", id))),
        }
    }

    async fn set_price(&self, id: i64, price: i64) -> CoreResult<MenuItem> {
        let result = sqlx::query("UPDATE menu_items SET price = $2 WHERE id = $1")
            .bind(id)
            .bind(price)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("menu item {}", id)));
        }
        self.fetch_item(id).await
    }

    async fn set_active(&self, id: i64, is_active: bool) -> CoreResult<MenuItem> {
        let result = sqlx::query("UPDATE menu_items SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("menu item {}", id)));
        }
        self.fetch_item(id).await
    }

    async fn delete_item(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM menu_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    CoreError::conflict(format!("menu item {} is referenced by existing orders", id))
                } else {
                    db_error(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("menu item {}", id)));
        }
        Ok(())
    }
}
