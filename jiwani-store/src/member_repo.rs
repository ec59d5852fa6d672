use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use jiwani_core::member::{Member, MemberToken, NewMember, TokenPurpose};
use jiwani_core::repository::MemberRepository;
use jiwani_core::{CoreError, CoreResult};

use crate::errors::db_error;

pub struct StoreMemberRepository {
    pool: PgPool,
}

impl StoreMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    name: String,
    username: String,
    email: String,
    password_hash: String,
    balance: i64,
    email_verified: bool,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = CoreError;

    fn try_from(row: MemberRow) -> CoreResult<Self> {
        Ok(Member {
            id: row.id,
            name: row.name,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            balance: row.balance,
            email_verified: row.email_verified,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

const SELECT_MEMBER: &str =
    "SELECT id, name, username, email, password_hash, balance, email_verified, role, created_at FROM members";

#[async_trait]
impl MemberRepository for StoreMemberRepository {
    async fn create_member(&self, member: &NewMember) -> CoreResult<Member> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            INSERT INTO members (name, username, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, username, email, password_hash, balance, email_verified, role, created_at
            "#,
        )
        .bind(&member.name)
        .bind(&member.username)
        .bind(&member.email)
        .bind(&member.password_hash)
        .bind(member.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match db_error(e) {
            CoreError::Conflict(_) => CoreError::conflict("email or username already registered"),
            other => other,
        })?;

        row.try_into()
    }

    async fn get_member(&self, id: i64) -> CoreResult<Option<Member>> {
        let sql = format!("{} WHERE id = $1", SELECT_MEMBER);
        let row = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Member::try_from).transpose()
    }

    async fn find_by_login(&self, identifier: &str) -> CoreResult<Option<Member>> {
        let sql = format!("{} WHERE LOWER(email) = LOWER($1) OR username = $1", SELECT_MEMBER);
        let row = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Member::try_from).transpose()
    }

    async fn set_email_verified(&self, id: i64) -> CoreResult<()> {
        let result = sqlx::query("UPDATE members SET email_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("member {}", id)));
        }
        Ok(())
    }

    async fn reset_password(&self, token: &str, password_hash: &str, now: DateTime<Utc>) -> CoreResult<Option<i64>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // 1. Claim the token; a concurrent confirmation blocks here and then finds it used
        let member_id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE member_tokens SET used_at = $3
            WHERE token = $1 AND purpose = $2 AND used_at IS NULL AND expires_at > $3
            RETURNING member_id
            "#,
        )
        .bind(token)
        .bind(TokenPurpose::ResetPassword.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let Some(member_id) = member_id else {
            return Ok(None);
        };

        // 2. New hash in the same transaction, so a failure leaves the token usable
        let result = sqlx::query("UPDATE members SET password_hash = $2 WHERE id = $1")
            .bind(member_id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("member {}", member_id)));
        }

        tx.commit().await.map_err(db_error)?;
        Ok(Some(member_id))
    }

    async fn issue_token(&self, token: &MemberToken) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO member_tokens (token, member_id, purpose, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&token.token)
        .bind(token.member_id)
        .bind(token.purpose.as_str())
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn consume_token(&self, token: &str, purpose: TokenPurpose, now: DateTime<Utc>) -> CoreResult<Option<i64>> {
        // Single statement so two concurrent confirmations cannot both succeed
        sqlx::query_scalar(
            r#"
            UPDATE member_tokens SET used_at = $3
            WHERE token = $1 AND purpose = $2 AND used_at IS NULL AND expires_at > $3
            RETURNING member_id
            "#,
        )
        .bind(token)
        .bind(purpose.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)
    }
}
