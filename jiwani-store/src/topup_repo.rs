use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use jiwani_core::member::{PaymentRequest, TopUp};
use jiwani_core::repository::TopUpRepository;
use jiwani_core::{CoreError, CoreResult};

use crate::errors::{db_error, is_foreign_key_violation};

pub struct StoreTopUpRepository {
    pool: PgPool,
}

impl StoreTopUpRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TopUpRow {
    id: i64,
    member_id: i64,
    amount: i64,
    source: String,
    reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TopUpRow> for TopUp {
    type Error = CoreError;

    fn try_from(row: TopUpRow) -> CoreResult<Self> {
        Ok(TopUp {
            id: row.id,
            member_id: row.member_id,
            amount: row.amount,
            source: row.source.parse()?,
            reference: row.reference,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PaymentRequestRow {
    gateway_order_id: String,
    member_id: i64,
    amount: i64,
    status: String,
    token: Option<String>,
    redirect_url: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRequestRow> for PaymentRequest {
    type Error = CoreError;

    fn try_from(row: PaymentRequestRow) -> CoreResult<Self> {
        Ok(PaymentRequest {
            gateway_order_id: row.gateway_order_id,
            member_id: row.member_id,
            amount: row.amount,
            status: row.status.parse()?,
            token: row.token,
            redirect_url: row.redirect_url,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

pub(crate) const PAYMENT_REQUEST_COLUMNS: &str =
    "gateway_order_id, member_id, amount, status, token, redirect_url, created_at, processed_at";

#[async_trait]
impl TopUpRepository for StoreTopUpRepository {
    async fn list_top_ups(&self, member_id: Option<i64>) -> CoreResult<Vec<TopUp>> {
        let rows = sqlx::query_as::<_, TopUpRow>(
            r#"
            SELECT id, member_id, amount, source, reference, created_at
            FROM top_ups
            WHERE ($1::BIGINT IS NULL OR member_id = $1)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(TopUp::try_from).collect()
    }

    async fn create_payment_request(&self, gateway_order_id: &str, member_id: i64, amount: i64) -> CoreResult<PaymentRequest> {
        let sql = format!(
            "INSERT INTO payment_requests (gateway_order_id, member_id, amount) VALUES ($1, $2, $3) RETURNING {}",
            PAYMENT_REQUEST_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRequestRow>(&sql)
            .bind(gateway_order_id)
            .bind(member_id)
            .bind(amount)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    CoreError::not_found(format!("member {}", member_id))
                } else {
                    db_error(e)
                }
            })?;

        row.try_into()
    }

    async fn attach_payment_token(&self, gateway_order_id: &str, token: &str, redirect_url: Option<&str>) -> CoreResult<()> {
        let result = sqlx::query("UPDATE payment_requests SET token = $2, redirect_url = $3 WHERE gateway_order_id = $1")
            .bind(gateway_order_id)
            .bind(token)
            .bind(redirect_url)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("payment request {}", gateway_order_id)));
        }
        Ok(())
    }

    async fn fail_payment_request(&self, gateway_order_id: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE payment_requests SET status = 'failed', processed_at = NOW() WHERE gateway_order_id = $1 AND status = 'pending'",
        )
        .bind(gateway_order_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn get_payment_request(&self, gateway_order_id: &str) -> CoreResult<Option<PaymentRequest>> {
        let sql = format!("SELECT {} FROM payment_requests WHERE gateway_order_id = $1", PAYMENT_REQUEST_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRequestRow>(&sql)
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(PaymentRequest::try_from).transpose()
    }
}
