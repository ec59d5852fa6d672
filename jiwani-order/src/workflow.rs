use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use jiwani_catalog::pricing::{price_lines, requested_item_ids, LineRequest};
use jiwani_core::member::{NewTopUp, TopUpSource};
use jiwani_core::order::{NewOrder, OrderStatus, PaymentMethod, PaymentStatus, StatusTransition};
use jiwani_core::repository::{LedgerTransaction, UnitOfWork};
use jiwani_core::CoreError;

use crate::finish;
use crate::ledger::apply_credit;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    pub date: Option<DateTime<Utc>>,
    pub items: Vec<LineRequest>,
    pub member_id: i64,
    pub table_id: i64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: i64,
    pub total: i64,
    pub line_count: usize,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    /// Member balance after the charge, for cashless orders.
    pub balance: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CancelOutcome {
    pub order_id: i64,
    pub member_id: i64,
    pub refunded: i64,
    pub new_balance: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order must contain at least one item")]
    EmptyOrder,

    #[error("Order not found: {0}")]
    NotFound(i64),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order {order_id} stored {stored} of {expected} lines")]
    PartialWrite {
        order_id: i64,
        stored: u64,
        expected: usize,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<OrderError> for CoreError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::EmptyOrder => CoreError::validation(err.to_string()),
            OrderError::NotFound(_) => CoreError::not_found(err.to_string()),
            OrderError::InvalidTransition { .. } => CoreError::conflict(err.to_string()),
            OrderError::PartialWrite { .. } => CoreError::IntegrityError(err.to_string()),
            OrderError::Core(core) => core,
        }
    }
}

/// Places, completes and cancels orders. Every operation is one transaction.
pub struct OrderWorkflow {
    uow: Arc<dyn UnitOfWork>,
}

impl OrderWorkflow {
    pub fn new(uow: Arc<dyn UnitOfWork>) -> Self {
        Self { uow }
    }

    /// Insert the order row, then all of its lines, and charge the member
    /// balance for cashless methods. All or nothing.
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<PlacedOrder, OrderError> {
        if cmd.items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        let mut tx = self.uow.begin().await?;
        let result = place_steps(&mut *tx, &cmd).await;
        let placed = finish(tx, result).await?;

        tracing::info!(
            "Order {} placed by member {}: {} lines, total {} ({})",
            placed.order_id, cmd.member_id, placed.line_count, placed.total, cmd.payment_method.as_str()
        );
        Ok(placed)
    }

    /// Flip a pending order to cancelled and refund cashless payments to the
    /// member balance. Any failing step undoes the status flip as well.
    pub async fn cancel_order(&self, order_id: i64) -> Result<CancelOutcome, OrderError> {
        let mut tx = self.uow.begin().await?;
        let result = cancel_steps(&mut *tx, order_id).await;
        let outcome = finish(tx, result).await?;

        tracing::info!(
            "Order {} cancelled, refunded {} to member {}",
            order_id, outcome.refunded, outcome.member_id
        );
        Ok(outcome)
    }

    /// Pending → completed.
    pub async fn complete_order(&self, order_id: i64) -> Result<(), OrderError> {
        let mut tx = self.uow.begin().await?;
        let result = transition(&mut *tx, order_id, OrderStatus::Pending, OrderStatus::Completed).await;
        finish(tx, result).await?;

        tracing::info!("Order {} completed", order_id);
        Ok(())
    }
}

async fn place_steps(tx: &mut dyn LedgerTransaction, cmd: &PlaceOrder) -> Result<PlacedOrder, OrderError> {
    // 1. Price every line from the catalog as of this transaction
    let catalog = tx.menu_prices(&requested_item_ids(&cmd.items)).await?;
    let priced = price_lines(&cmd.items, &catalog)?;

    let (payment_status, payment_id) = if cmd.payment_method.is_cashless() {
        (PaymentStatus::Paid, Some(format!("PAY-{}", Uuid::new_v4().simple())))
    } else {
        (PaymentStatus::Unpaid, None)
    };

    // 2. Order row first, its generated id keys the lines
    let order_id = tx
        .insert_order(&NewOrder {
            member_id: cmd.member_id,
            table_id: cmd.table_id,
            payment_method: cmd.payment_method,
            payment_status,
            payment_id: payment_id.clone(),
            created_at: cmd.date,
        })
        .await?;

    // 3. Bulk insert lines
    let stored = tx.insert_order_lines(order_id, &priced.lines).await?;
    if stored != priced.lines.len() as u64 {
        return Err(OrderError::PartialWrite { order_id, stored, expected: priced.lines.len() });
    }

    // 4. Charge the balance for cashless orders
    let balance = if cmd.payment_method.is_cashless() && priced.total > 0 {
        Some(tx.debit_balance(cmd.member_id, priced.total).await?)
    } else {
        None
    };

    Ok(PlacedOrder {
        order_id,
        total: priced.total,
        line_count: priced.lines.len(),
        payment_status,
        payment_id,
        balance,
    })
}

async fn cancel_steps(tx: &mut dyn LedgerTransaction, order_id: i64) -> Result<CancelOutcome, OrderError> {
    // 1. Status flip
    transition(tx, order_id, OrderStatus::Pending, OrderStatus::Cancelled).await?;

    // 2. Refund basis from the order's lines
    let basis = tx.refund_basis(order_id).await?.ok_or(OrderError::NotFound(order_id))?;

    // 3. Pay-at-counter orders carry no payment id and get no balance refund
    let new_balance = match (&basis.payment_id, basis.total) {
        (Some(_), total) if total > 0 => {
            let receipt = apply_credit(
                tx,
                &NewTopUp {
                    member_id: basis.member_id,
                    amount: total,
                    source: TopUpSource::Refund,
                    reference: Some(format!("order:{}", order_id)),
                },
            )
            .await?;
            Some(receipt.new_balance)
        }
        _ => None,
    };

    Ok(CancelOutcome {
        order_id,
        member_id: basis.member_id,
        refunded: if new_balance.is_some() { basis.total } else { 0 },
        new_balance,
    })
}

async fn transition(
    tx: &mut dyn LedgerTransaction,
    order_id: i64,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<(), OrderError> {
    match tx.transition_order_status(order_id, from, to).await? {
        StatusTransition::Applied => Ok(()),
        StatusTransition::NotFound => Err(OrderError::NotFound(order_id)),
        StatusTransition::Rejected(current) => Err(OrderError::InvalidTransition { from: current, to }),
    }
}
