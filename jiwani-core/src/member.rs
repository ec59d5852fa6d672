use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::validation(format!("unknown role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub balance: i64,
    pub email_verified: bool,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::VerifyEmail => "verify_email",
            TokenPurpose::ResetPassword => "reset_password",
        }
    }
}

/// Single-use token mailed to a member.
#[derive(Debug, Clone)]
pub struct MemberToken {
    pub token: String,
    pub member_id: i64,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TopUpSource {
    Gateway,
    Admin,
    Refund,
}

impl TopUpSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopUpSource::Gateway => "gateway",
            TopUpSource::Admin => "admin",
            TopUpSource::Refund => "refund",
        }
    }
}

impl FromStr for TopUpSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(TopUpSource::Gateway),
            "admin" => Ok(TopUpSource::Admin),
            "refund" => Ok(TopUpSource::Refund),
            other => Err(CoreError::InternalError(format!("unknown top-up source '{}'", other))),
        }
    }
}

/// Append-only record of a balance credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUp {
    pub id: i64,
    pub member_id: i64,
    pub amount: i64,
    pub source: TopUpSource,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTopUp {
    pub member_id: i64,
    pub amount: i64,
    pub source: TopUpSource,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRequestStatus {
    Pending,
    Settled,
    Failed,
}

impl PaymentRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRequestStatus::Pending => "pending",
            PaymentRequestStatus::Settled => "settled",
            PaymentRequestStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentRequestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentRequestStatus::Pending),
            "settled" => Ok(PaymentRequestStatus::Settled),
            "failed" => Ok(PaymentRequestStatus::Failed),
            other => Err(CoreError::InternalError(format!("unknown payment request status '{}'", other))),
        }
    }
}

/// A gateway checkout started for a member top-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub gateway_order_id: String,
    pub member_id: i64,
    pub amount: i64,
    pub status: PaymentRequestStatus,
    pub token: Option<String>,
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
