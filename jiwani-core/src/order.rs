use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [OrderStatus::Pending, OrderStatus::Completed, OrderStatus::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Only pending orders move; completed and cancelled are terminal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Completed) | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CoreError::validation(format!("unknown order status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(PaymentStatus::Paid),
            "unpaid" => Ok(PaymentStatus::Unpaid),
            other => Err(CoreError::validation(format!("unknown payment status '{}'", other))),
        }
    }
}

/// `Cashier` is pay-at-counter; every other method settles from the member balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cashier,
    Balance,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cashier => "cashier",
            PaymentMethod::Balance => "balance",
        }
    }

    pub fn is_cashless(&self) -> bool {
        !matches!(self, PaymentMethod::Cashier)
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cashier" => Ok(PaymentMethod::Cashier),
            "balance" => Ok(PaymentMethod::Balance),
            other => Err(CoreError::validation(format!("unsupported payment method '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiningTable {
    pub id: i64,
    pub number: String,
}

/// Row written when an order is placed.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub member_id: i64,
    pub table_id: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A priced line, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub item_id: i64,
    pub quantity: i32,
    pub line_total: i64,
}

/// What cancellation needs to know to refund an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundBasis {
    pub member_id: i64,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<String>,
    pub total: i64,
    pub line_count: i64,
}

/// Result of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    Applied,
    NotFound,
    Rejected(OrderStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLineView {
    pub item_id: i64,
    pub name: String,
    pub quantity: i32,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRef {
    pub id: i64,
    pub name: String,
}

/// Denormalized order: one entry per order with its lines aggregated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderView {
    pub id: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<String>,
    pub table: DiningTable,
    pub member: MemberRef,
    pub created_at: DateTime<Utc>,
    pub total: i64,
    pub items: Vec<OrderLineView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub member_id: Option<i64>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &OrderView) -> bool {
        self.member_id.map_or(true, |m| order.member.id == m)
            && self.status.map_or(true, |s| order.status == s)
    }
}
