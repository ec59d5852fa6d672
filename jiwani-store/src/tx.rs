use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use jiwani_core::member::{NewTopUp, PaymentRequest, PaymentRequestStatus};
use jiwani_core::menu::MenuPrice;
use jiwani_core::order::{NewOrder, NewOrderLine, OrderStatus, RefundBasis, StatusTransition};
use jiwani_core::repository::{LedgerTransaction, UnitOfWork};
use jiwani_core::{CoreError, CoreResult};

use crate::errors::{db_error, is_foreign_key_violation};
use crate::topup_repo::{PaymentRequestRow, PAYMENT_REQUEST_COLUMNS};

/// Hands out Postgres transactions for the order and ledger workflows.
pub struct PgUnitOfWork {
    pool: PgPool,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin(&self) -> CoreResult<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn ping(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(db_error)?;
        Ok(())
    }
}

/// Rolls back on drop unless committed.
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct MenuPriceRow {
    id: i64,
    name: String,
    price: i64,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct RefundRow {
    member_id: i64,
    payment_method: String,
    payment_id: Option<String>,
    total: i64,
    line_count: i64,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn menu_prices(&mut self, item_ids: &[i64]) -> CoreResult<Vec<MenuPrice>> {
        let rows = sqlx::query_as::<_, MenuPriceRow>(
            "SELECT id, name, price, is_active FROM menu_items WHERE id = ANY($1)",
        )
        .bind(item_ids.to_vec())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|r| MenuPrice { id: r.id, name: r.name, price: r.price, is_active: r.is_active })
            .collect())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> CoreResult<i64> {
        sqlx::query_scalar(
            r#"
            INSERT INTO orders (status, payment_status, payment_method, payment_id, table_id, member_id, created_at)
            VALUES ('pending', $1, $2, $3, $4, $5, COALESCE($6, NOW()))
            RETURNING id
            "#,
        )
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.payment_id)
        .bind(order.table_id)
        .bind(order.member_id)
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                CoreError::not_found(format!("member {} or table {}", order.member_id, order.table_id))
            } else {
                db_error(e)
            }
        })
    }

    async fn insert_order_lines(&mut self, order_id: i64, lines: &[NewOrderLine]) -> CoreResult<u64> {
        if lines.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO order_lines (order_id, item_id, quantity, line_total) ");
        builder.push_values(lines, |mut b, line| {
            b.push_bind(order_id)
                .push_bind(line.item_id)
                .push_bind(line.quantity)
                .push_bind(line.line_total);
        });

        let result = builder.build().execute(&mut *self.tx).await.map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn transition_order_status(&mut self, order_id: i64, from: OrderStatus, to: OrderStatus) -> CoreResult<StatusTransition> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE orders SET status = $3 WHERE id = $1 AND status = $2 RETURNING id",
        )
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        if updated.is_some() {
            return Ok(StatusTransition::Applied);
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        match current {
            None => Ok(StatusTransition::NotFound),
            Some(status) => Ok(StatusTransition::Rejected(status.parse()?)),
        }
    }

    async fn refund_basis(&mut self, order_id: i64) -> CoreResult<Option<RefundBasis>> {
        let row = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT o.member_id, o.payment_method, o.payment_id,
                   COALESCE(SUM(l.line_total), 0)::BIGINT AS total,
                   COUNT(l.id) AS line_count
            FROM orders o
            LEFT JOIN order_lines l ON l.order_id = o.id
            WHERE o.id = $1
            GROUP BY o.id
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        match row {
            Some(r) if r.line_count > 0 => Ok(Some(RefundBasis {
                member_id: r.member_id,
                payment_method: r.payment_method.parse()?,
                payment_id: r.payment_id,
                total: r.total,
                line_count: r.line_count,
            })),
            _ => Ok(None),
        }
    }

    async fn credit_balance(&mut self, member_id: i64, amount: i64) -> CoreResult<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE members SET balance = balance + $2 WHERE id = $1 RETURNING balance",
        )
        .bind(member_id)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        balance.ok_or_else(|| CoreError::not_found(format!("member {}", member_id)))
    }

    async fn debit_balance(&mut self, member_id: i64, amount: i64) -> CoreResult<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE members SET balance = balance - $2 WHERE id = $1 AND balance >= $2 RETURNING balance",
        )
        .bind(member_id)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        if let Some(balance) = balance {
            return Ok(balance);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM members WHERE id = $1")
            .bind(member_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        match exists {
            Some(_) => Err(CoreError::validation("insufficient balance")),
            None => Err(CoreError::not_found(format!("member {}", member_id))),
        }
    }

    async fn record_top_up(&mut self, top_up: &NewTopUp) -> CoreResult<i64> {
        sqlx::query_scalar(
            "INSERT INTO top_ups (member_id, amount, source, reference) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(top_up.member_id)
        .bind(top_up.amount)
        .bind(top_up.source.as_str())
        .bind(&top_up.reference)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn claim_payment_request(&mut self, gateway_order_id: &str, to: PaymentRequestStatus) -> CoreResult<Option<PaymentRequest>> {
        let sql = format!(
            r#"
            UPDATE payment_requests SET status = $2, processed_at = NOW()
            WHERE gateway_order_id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PAYMENT_REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRequestRow>(&sql)
            .bind(gateway_order_id)
            .bind(to.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;

        row.map(PaymentRequest::try_from).transpose()
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.map_err(db_error)
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        self.tx.rollback().await.map_err(db_error)
    }
}
