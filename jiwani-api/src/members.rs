use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use jiwani_core::member::{TopUp, TopUpSource};
use jiwani_order::{LedgerReceipt, TopUpCheckout};
use jiwani_shared::models::events::BalanceCreditedEvent;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub member_id: i64,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount: i64,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DebitRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub amount: i64,
}

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/members/{id}/balance", get(get_balance))
        .route("/members/{id}/topups", get(list_member_top_ups))
        .route("/members/{id}/topups/checkout", post(start_checkout))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/members/{id}/balance/credit", post(credit_balance))
        .route("/members/{id}/balance/debit", post(debit_balance))
        .route("/topups", get(list_all_top_ups))
}

/// GET /api/members/{id}/balance
async fn get_balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<BalanceResponse>, AppError> {
    claims.ensure_can_access(id)?;
    let member = state
        .member_repo
        .get_member(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("member {}", id)))?;
    Ok(Json(BalanceResponse { member_id: member.id, balance: member.balance }))
}

/// POST /api/members/{id}/balance/credit
async fn credit_balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<CreditRequest>,
) -> Result<Json<LedgerReceipt>, AppError> {
    let reference = req.reference.or_else(|| Some(format!("admin:{}", claims.sub)));
    let receipt = state.ledger.credit(id, req.amount, TopUpSource::Admin, reference.clone()).await?;

    let event = BalanceCreditedEvent::now(id, req.amount, TopUpSource::Admin.as_str(), reference, receipt.new_balance);
    tracing::info!("Balance credited: {}", serde_json::to_string(&event).unwrap_or_default());

    Ok(Json(receipt))
}

/// POST /api/members/{id}/balance/debit
async fn debit_balance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<DebitRequest>,
) -> Result<Json<LedgerReceipt>, AppError> {
    Ok(Json(state.ledger.debit(id, req.amount).await?))
}

/// GET /api/members/{id}/topups
async fn list_member_top_ups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TopUp>>, AppError> {
    claims.ensure_can_access(id)?;
    Ok(Json(state.top_up_repo.list_top_ups(Some(id)).await?))
}

/// GET /api/topups
async fn list_all_top_ups(State(state): State<AppState>) -> Result<Json<Vec<TopUp>>, AppError> {
    Ok(Json(state.top_up_repo.list_top_ups(None).await?))
}

/// POST /api/members/{id}/topups/checkout
/// Opens a gateway transaction; the balance is credited when the settlement webhook arrives
async fn start_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<TopUpCheckout>), AppError> {
    claims.ensure_can_access(id)?;
    let member = state
        .member_repo
        .get_member(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("member {}", id)))?;

    let checkout = state.payment_orchestrator.start_top_up(&member, req.amount).await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}
