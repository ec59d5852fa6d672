use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use jiwani_core::payment::{signature_matches, GatewayNotification, PaymentGateway, PaymentToken, TransactionRequest};
use jiwani_core::{CoreError, CoreResult};

use crate::app_config::PaymentConfig;

/// Midtrans Snap adapter. Authenticates with the server key as the basic-auth
/// user and an empty password.
pub struct MidtransGateway {
    client: reqwest::Client,
    snap_url: String,
    server_key: String,
}

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetailsBody<'a>,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CustomerDetailsBody<'a> {
    first_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: Option<String>,
}

impl<'a> From<&'a TransactionRequest> for SnapRequest<'a> {
    fn from(request: &'a TransactionRequest) -> Self {
        SnapRequest {
            transaction_details: TransactionDetails {
                order_id: &request.order_id,
                gross_amount: request.gross_amount,
            },
            customer_details: CustomerDetailsBody {
                first_name: &request.customer.first_name,
                email: request.customer.email.as_deref(),
            },
        }
    }
}

impl MidtransGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        if config.is_production {
            tracing::info!("Midtrans gateway running against production");
        }

        Ok(Self {
            client,
            snap_url: config.snap_url.clone(),
            server_key: config.server_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for MidtransGateway {
    async fn create_transaction(&self, request: &TransactionRequest) -> CoreResult<PaymentToken> {
        let response = self
            .client
            .post(&self.snap_url)
            .basic_auth(&self.server_key, Some(""))
            .json(&SnapRequest::from(request))
            .send()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("Snap request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Snap rejected {} with {}: {}", request.order_id, status, body);
            return Err(CoreError::UpstreamError(format!("Snap returned {}", status)));
        }

        let snap: SnapResponse = response
            .json()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("unreadable Snap response: {}", e)))?;

        Ok(PaymentToken { token: snap.token, redirect_url: snap.redirect_url })
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> bool {
        signature_matches(notification, &self.server_key)
    }
}
