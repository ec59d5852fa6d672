use serde::{Deserialize, Serialize};

/// Written to the order audit trail after a placement commits.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: i64,
    pub member_id: i64,
    pub table_id: i64,
    pub payment_method: String,
    pub total: i64,
    pub line_count: usize,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderCancelledEvent {
    pub order_id: i64,
    pub member_id: i64,
    pub refunded: i64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderStatusChangedEvent {
    pub order_id: i64,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
}

/// Any credit to a member balance: gateway settlement, admin top-up or refund.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BalanceCreditedEvent {
    pub member_id: i64,
    pub amount: i64,
    pub source: String,
    pub reference: Option<String>,
    pub new_balance: i64,
    pub timestamp: i64,
}

impl BalanceCreditedEvent {
    pub fn now(member_id: i64, amount: i64, source: &str, reference: Option<String>, new_balance: i64) -> Self {
        Self {
            member_id,
            amount,
            source: source.to_string(),
            reference,
            new_balance,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}
