use axum::{extract::State, routing::post, Json, Router};

use jiwani_core::payment::GatewayNotification;
use jiwani_order::SettlementOutcome;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payments/midtrans", post(handle_midtrans_notification))
}

/// POST /api/webhooks/payments/midtrans
/// Receive transaction status notifications from the payment gateway
async fn handle_midtrans_notification(
    State(state): State<AppState>,
    Json(payload): Json<GatewayNotification>,
) -> Result<Json<SettlementOutcome>, AppError> {
    tracing::info!(
        "Received notification: {} for {} (fraud {:?})",
        payload.transaction_status, payload.order_id, payload.fraud_status
    );

    // 1. Reject anything not signed with our server key
    if !state.payment_orchestrator.verify_notification(&payload) {
        tracing::warn!("Rejected notification for {} with bad signature", payload.order_id);
        return Err(AppError::AuthenticationError("invalid signature".to_string()));
    }

    // 2. Claim the payment request and credit the member
    let outcome = state.settlement.handle_notification(&payload).await?;
    Ok(Json(outcome))
}
