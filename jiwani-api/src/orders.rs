use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use jiwani_catalog::LineRequest;
use jiwani_core::order::{OrderFilter, OrderStatus, OrderView, PaymentMethod, StatusTransition};
use jiwani_order::{CancelOutcome, PlaceOrder, PlacedOrder};
use jiwani_shared::models::events::{OrderCancelledEvent, OrderPlacedEvent, OrderStatusChangedEvent};

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub date: Option<DateTime<Utc>>,
    pub items: Vec<LineRequest>,
    /// Only admins may order on behalf of another member.
    pub member_id: Option<i64>,
    pub table_id: i64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub member_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(place_order).get(list_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", post(cancel_order))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/status", patch(update_status))
        .route("/orders/{id}/paid", post(mark_paid))
}

fn actor(claims: &Claims) -> String {
    format!("{}:{}", claims.role.as_str(), claims.sub)
}

/// Appends to the audit trail after the change has committed. A failed
/// write is logged and never fails the request.
async fn record_change(
    state: &AppState,
    claims: &Claims,
    order_id: i64,
    change_type: &str,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
    reason: Option<&str>,
) {
    if let Err(e) = state
        .order_repo
        .add_order_change(order_id, change_type, old_value, new_value, &actor(claims), reason)
        .await
    {
        tracing::warn!("Failed to record {} for order {}: {}", change_type, order_id, e);
    }
}

async fn owned_order(state: &AppState, claims: &Claims, id: i64) -> Result<OrderView, AppError> {
    let order = state
        .order_repo
        .get_order(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {}", id)))?;
    claims.ensure_can_access(order.member.id)?;
    Ok(order)
}

/// POST /api/orders
/// Prices, stores and (for balance payment) charges the order in one transaction
async fn place_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>), AppError> {
    let member_id = req.member_id.unwrap_or(claims.sub);
    claims.ensure_can_access(member_id)?;

    let placed = state
        .workflow
        .place_order(PlaceOrder {
            date: req.date,
            items: req.items,
            member_id,
            table_id: req.table_id,
            payment_method: req.payment_method,
        })
        .await?;

    tracing::info!("Order {} placed by member {} for {}", placed.order_id, member_id, placed.total);

    // Log Audit Change
    let event = OrderPlacedEvent {
        order_id: placed.order_id,
        member_id,
        table_id: req.table_id,
        payment_method: req.payment_method.as_str().to_string(),
        total: placed.total,
        line_count: placed.line_count,
        timestamp: Utc::now().timestamp(),
    };
    record_change(&state, &claims, placed.order_id, "ORDER_PLACED", None, serde_json::to_value(&event).ok(), None).await;

    Ok((StatusCode::CREATED, Json(placed)))
}

/// GET /api/orders?status=&member_id=
async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let member_id = if claims.is_admin() {
        query.member_id
    } else {
        let requested = query.member_id.unwrap_or(claims.sub);
        claims.ensure_can_access(requested)?;
        Some(requested)
    };

    let filter = OrderFilter { member_id, status: query.status };
    Ok(Json(state.order_repo.list_orders(&filter).await?))
}

/// GET /api/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(owned_order(&state, &claims, id).await?))
}

/// POST /api/orders/{id}/cancel
/// Cancels a pending order and refunds cashless payments to the member balance
async fn cancel_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<CancelOutcome>, AppError> {
    owned_order(&state, &claims, id).await?;
    let outcome = cancel_and_audit(&state, &claims, id).await?;
    Ok(Json(outcome))
}

async fn cancel_and_audit(state: &AppState, claims: &Claims, id: i64) -> Result<CancelOutcome, AppError> {
    let outcome = state.workflow.cancel_order(id).await?;
    tracing::info!("Order {} cancelled, refunded {}", id, outcome.refunded);

    let event = OrderCancelledEvent {
        order_id: id,
        member_id: outcome.member_id,
        refunded: outcome.refunded,
        timestamp: Utc::now().timestamp(),
    };
    record_change(
        state,
        claims,
        id,
        "ORDER_CANCELLED",
        Some(serde_json::json!({"status": OrderStatus::Pending})),
        serde_json::to_value(&event).ok(),
        None,
    )
    .await;

    Ok(outcome)
}

/// PATCH /api/orders/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<OrderView>, AppError> {
    match req.status {
        OrderStatus::Completed => {
            state.workflow.complete_order(id).await?;
            let event = OrderStatusChangedEvent {
                order_id: id,
                from: OrderStatus::Pending.to_string(),
                to: OrderStatus::Completed.to_string(),
                timestamp: Utc::now().timestamp(),
            };
            record_change(&state, &claims, id, "STATUS_CHANGED", None, serde_json::to_value(&event).ok(), None).await;
        }
        OrderStatus::Cancelled => {
            cancel_and_audit(&state, &claims, id).await?;
        }
        OrderStatus::Pending => {
            return Err(AppError::ValidationError("orders cannot be moved back to pending".to_string()));
        }
    }

    let order = state
        .order_repo
        .get_order(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {}", id)))?;
    Ok(Json(order))
}

/// POST /api/orders/{id}/paid
/// Records payment at the cashier for an unpaid order
async fn mark_paid(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<OrderView>, AppError> {
    match state.order_repo.mark_paid(id).await? {
        StatusTransition::Applied => {}
        StatusTransition::NotFound => return Err(AppError::NotFoundError(format!("order {}", id))),
        StatusTransition::Rejected(status) => {
            return Err(AppError::ConflictError(format!("order {} is {} or already paid", id, status)))
        }
    }

    record_change(
        &state,
        &claims,
        id,
        "PAYMENT_RECEIVED",
        Some(serde_json::json!({"payment_status": "unpaid"})),
        Some(serde_json::json!({"payment_status": "paid"})),
        Some("Paid at cashier"),
    )
    .await;

    let order = state
        .order_repo
        .get_order(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {}", id)))?;
    Ok(Json(order))
}
