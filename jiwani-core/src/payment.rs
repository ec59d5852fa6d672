use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub order_id: String,
    pub gross_amount: i64,
    pub customer: CustomerDetails,
}

/// What the gateway hands back for a new transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentToken {
    pub token: String,
    pub redirect_url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a transaction with the provider and obtain its payment token
    async fn create_transaction(&self, request: &TransactionRequest) -> CoreResult<PaymentToken>;

    /// Check the provider signature carried by a notification
    fn verify_notification(&self, notification: &GatewayNotification) -> bool;
}

/// Asynchronous payment notification as delivered by the gateway webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_id: String,
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    pub gross_amount: String,
    pub status_code: Option<String>,
    pub signature_key: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Settled,
    Failed,
    Pending,
}

impl GatewayNotification {
    pub fn outcome(&self) -> NotificationOutcome {
        let fraud = self.fraud_status.as_deref();
        match self.transaction_status.as_str() {
            "settlement" | "capture" => match fraud {
                Some("accept") => NotificationOutcome::Settled,
                Some("deny") => NotificationOutcome::Failed,
                _ => NotificationOutcome::Pending,
            },
            "deny" | "cancel" | "expire" | "failure" => NotificationOutcome::Failed,
            _ => NotificationOutcome::Pending,
        }
    }

    /// Parses `gross_amount` ("15000.00") into whole currency units.
    pub fn gross_amount_units(&self) -> CoreResult<i64> {
        parse_gross_amount(&self.gross_amount)
    }
}

pub fn parse_gross_amount(raw: &str) -> CoreResult<i64> {
    let (whole, fraction) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if !fraction.chars().all(|c| c == '0') {
        return Err(CoreError::validation(format!("fractional gross amount '{}'", raw)));
    }
    whole
        .parse::<i64>()
        .map_err(|_| CoreError::validation(format!("invalid gross amount '{}'", raw)))
}

/// `sha512(order_id + status_code + gross_amount + server_key)`, hex encoded.
pub fn notification_signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn signature_matches(notification: &GatewayNotification, server_key: &str) -> bool {
    match (&notification.status_code, &notification.signature_key) {
        (Some(code), Some(signature)) => {
            let expected = notification_signature(&notification.order_id, code, &notification.gross_amount, server_key);
            expected.eq_ignore_ascii_case(signature)
        }
        _ => false,
    }
}
