use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use jiwani_core::order::{DiningTable, MemberRef, OrderFilter, OrderLineView, OrderStatus, OrderView, StatusTransition};
use jiwani_core::repository::OrderRepository;
use jiwani_core::CoreResult;

use crate::errors::db_error;

pub struct StoreOrderRepository {
    pool: PgPool,
}

impl StoreOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// One row per order line; orders without lines yield a single row of NULL line columns
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct OrderLineRow {
    pub id: i64,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub table_id: i64,
    pub table_number: String,
    pub member_id: i64,
    pub member_name: String,
    pub item_id: Option<i64>,
    pub item_name: Option<String>,
    pub quantity: Option<i32>,
    pub line_total: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct TableRow {
    id: i64,
    number: String,
}

const SELECT_ORDER_LINES: &str = r#"
    SELECT o.id, o.status, o.payment_status, o.payment_method, o.payment_id, o.created_at,
           t.id AS table_id, t.number AS table_number,
           mb.id AS member_id, mb.name AS member_name,
           l.item_id, mi.name AS item_name, l.quantity, l.line_total
    FROM orders o
    JOIN dining_tables t ON t.id = o.table_id
    JOIN members mb ON mb.id = o.member_id
    LEFT JOIN order_lines l ON l.order_id = o.id
    LEFT JOIN menu_items mi ON mi.id = l.item_id
"#;

/// Folds joined rows (sorted by order id) into one view per order.
pub(crate) fn group_order_rows(rows: Vec<OrderLineRow>) -> CoreResult<Vec<OrderView>> {
    let mut views: Vec<OrderView> = Vec::new();

    for row in rows {
        let same_order = views.last().map_or(false, |v| v.id == row.id);
        if !same_order {
            views.push(OrderView {
                id: row.id,
                status: row.status.parse()?,
                payment_status: row.payment_status.parse()?,
                payment_method: row.payment_method.parse()?,
                payment_id: row.payment_id.clone(),
                table: DiningTable { id: row.table_id, number: row.table_number.clone() },
                member: MemberRef { id: row.member_id, name: row.member_name.clone() },
                created_at: row.created_at,
                total: 0,
                items: Vec::new(),
            });
        }

        if let (Some(item_id), Some(quantity), Some(line_total)) = (row.item_id, row.quantity, row.line_total) {
            if let Some(view) = views.last_mut() {
                view.total += line_total;
                view.items.push(OrderLineView {
                    item_id,
                    name: row.item_name.unwrap_or_default(),
                    quantity,
                    line_total,
                });
            }
        }
    }

    Ok(views)
}

#[async_trait]
impl OrderRepository for StoreOrderRepository {
    async fn get_order(&self, id: i64) -> CoreResult<Option<OrderView>> {
        let sql = format!("{} WHERE o.id = $1 ORDER BY l.id", SELECT_ORDER_LINES);
        let rows = sqlx::query_as::<_, OrderLineRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(group_order_rows(rows)?.into_iter().next())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Vec<OrderView>> {
        let sql = format!(
            "{} WHERE ($1::BIGINT IS NULL OR o.member_id = $1) AND ($2::TEXT IS NULL OR o.status = $2) ORDER BY o.id, l.id",
            SELECT_ORDER_LINES
        );
        let rows = sqlx::query_as::<_, OrderLineRow>(&sql)
            .bind(filter.member_id)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        group_order_rows(rows)
    }

    async fn mark_paid(&self, id: i64) -> CoreResult<StatusTransition> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE orders SET payment_status = 'paid'
            WHERE id = $1 AND status = 'pending' AND payment_status = 'unpaid'
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if updated.is_some() {
            return Ok(StatusTransition::Applied);
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match current {
            None => Ok(StatusTransition::NotFound),
            Some(status) => Ok(StatusTransition::Rejected(status.parse::<OrderStatus>()?)),
        }
    }

    async fn list_tables(&self) -> CoreResult<Vec<DiningTable>> {
        let rows = sqlx::query_as::<_, TableRow>("SELECT id, number FROM dining_tables ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.into_iter().map(|r| DiningTable { id: r.id, number: r.number }).collect())
    }

    async fn add_order_change(
        &self,
        order_id: i64,
        change_type: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        actor: &str,
        reason: Option<&str>,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_changes (order_id, change_type, old_value, new_value, actor, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order_id)
        .bind(change_type)
        .bind(old_value)
        .bind(new_value)
        .bind(actor)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}
