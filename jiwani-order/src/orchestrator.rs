use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use jiwani_core::member::Member;
use jiwani_core::payment::{signature_matches, CustomerDetails, GatewayNotification, PaymentGateway, PaymentToken, TransactionRequest};
use jiwani_core::repository::TopUpRepository;
use jiwani_core::{CoreError, CoreResult};

pub const MAX_TOP_UP: i64 = 10_000_000;

#[derive(Debug, Clone, Serialize)]
pub struct TopUpCheckout {
    pub gateway_order_id: String,
    pub amount: i64,
    pub token: String,
    pub redirect_url: Option<String>,
}

/// Starts gateway-driven top-ups. Settlement arrives later through the
/// webhook and is applied by `SettlementProcessor`.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    top_ups: Arc<dyn TopUpRepository>,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>, top_ups: Arc<dyn TopUpRepository>) -> Self {
        Self { gateway, top_ups }
    }

    pub fn verify_notification(&self, notification: &GatewayNotification) -> bool {
        self.gateway.verify_notification(notification)
    }

    pub async fn start_top_up(&self, member: &Member, amount: i64) -> CoreResult<TopUpCheckout> {
        if amount <= 0 || amount > MAX_TOP_UP {
            return Err(CoreError::validation(format!("top-up amount must be between 1 and {}", MAX_TOP_UP)));
        }

        // 1. Record the request first so a fast notification always finds it
        let gateway_order_id = format!("TOPUP-{}-{}", member.id, Uuid::new_v4().simple());
        self.top_ups.create_payment_request(&gateway_order_id, member.id, amount).await?;

        // 2. Ask the gateway for a transaction token
        let request = TransactionRequest {
            order_id: gateway_order_id.clone(),
            gross_amount: amount,
            customer: CustomerDetails {
                first_name: member.name.clone(),
                email: Some(member.email.clone()),
            },
        };

        let token = match self.gateway.create_transaction(&request).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("Gateway rejected top-up {}: {}", gateway_order_id, e);
                if let Err(mark_err) = self.top_ups.fail_payment_request(&gateway_order_id).await {
                    tracing::error!("Could not mark top-up {} failed: {}", gateway_order_id, mark_err);
                }
                return Err(e);
            }
        };

        // 3. Remember the token for the member's retry
        self.top_ups
            .attach_payment_token(&gateway_order_id, &token.token, token.redirect_url.as_deref())
            .await?;

        tracing::info!("Top-up {} started for member {} ({})", gateway_order_id, member.id, amount);

        Ok(TopUpCheckout {
            gateway_order_id,
            amount,
            token: token.token,
            redirect_url: token.redirect_url,
        })
    }
}

/// In-process gateway for development and tests. Signs nothing and trusts
/// only notifications signed with its own server key.
pub struct MockPaymentGateway {
    server_key: String,
    fail: bool,
}

impl MockPaymentGateway {
    pub fn new(server_key: impl Into<String>) -> Self {
        Self { server_key: server_key.into(), fail: false }
    }

    /// A gateway whose transaction calls always fail.
    pub fn failing(server_key: impl Into<String>) -> Self {
        Self { server_key: server_key.into(), fail: true }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_transaction(&self, request: &TransactionRequest) -> CoreResult<PaymentToken> {
        if self.fail {
            return Err(CoreError::UpstreamError("simulated gateway failure".to_string()));
        }
        Ok(PaymentToken {
            token: format!("mock-token-{}", request.order_id),
            redirect_url: Some(format!("https://pay.mock.local/snap/{}", request.order_id)),
        })
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> bool {
        signature_matches(notification, &self.server_key)
    }
}
