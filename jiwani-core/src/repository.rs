use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::menu::{Category, MenuFilter, MenuItem, MenuPrice, NewMenuItem};
use crate::member::{Member, MemberToken, NewMember, NewTopUp, PaymentRequest, PaymentRequestStatus, TokenPurpose, TopUp};
use crate::order::{DiningTable, NewOrder, NewOrderLine, OrderFilter, OrderStatus, OrderView, RefundBasis, StatusTransition};
use crate::CoreResult;

/// Repository trait for the menu catalog
#[async_trait]
pub trait MenuRepository: Send + Sync {
    async fn list_categories(&self) -> CoreResult<Vec<Category>>;

    async fn list_items(&self, filter: &MenuFilter) -> CoreResult<Vec<MenuItem>>;

    async fn get_item(&self, id: i64) -> CoreResult<Option<MenuItem>>;

    async fn create_item(&self, item: &NewMenuItem) -> CoreResult<MenuItem>;

    async fn update_item(&self, id: i64, item: &NewMenuItem) -> CoreResult<MenuItem>;

    async fn set_price(&self, id: i64, price: i64) -> CoreResult<MenuItem>;

    async fn set_active(&self, id: i64, is_active: bool) -> CoreResult<MenuItem>;

    /// Fails with `Conflict` while historical order lines reference the item.
    async fn delete_item(&self, id: i64) -> CoreResult<()>;
}

/// Repository trait for member identity data
#[async_trait]
pub trait MemberRepository: Send + Sync {
    /// Fails with `Conflict` on a duplicate email or username.
    async fn create_member(&self, member: &NewMember) -> CoreResult<Member>;

    async fn get_member(&self, id: i64) -> CoreResult<Option<Member>>;

    /// Looks a member up by email or username.
    async fn find_by_login(&self, identifier: &str) -> CoreResult<Option<Member>>;

    async fn set_email_verified(&self, id: i64) -> CoreResult<()>;

    /// Consumes an unused, unexpired reset token and stores the new hash in
    /// one transaction; returns the member id, or `None` for a bad token.
    async fn reset_password(&self, token: &str, password_hash: &str, now: DateTime<Utc>) -> CoreResult<Option<i64>>;

    async fn issue_token(&self, token: &MemberToken) -> CoreResult<()>;

    /// Marks an unused, unexpired token as used and returns its member id.
    async fn consume_token(&self, token: &str, purpose: TokenPurpose, now: DateTime<Utc>) -> CoreResult<Option<i64>>;
}

/// Read side of orders plus single-statement updates that need no transaction.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: i64) -> CoreResult<Option<OrderView>>;

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Vec<OrderView>>;

    /// Moves an unpaid pending cashier order to paid.
    async fn mark_paid(&self, id: i64) -> CoreResult<StatusTransition>;

    async fn list_tables(&self) -> CoreResult<Vec<DiningTable>>;

    async fn add_order_change(
        &self,
        order_id: i64,
        change_type: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
        actor: &str,
        reason: Option<&str>,
    ) -> CoreResult<()>;
}

/// Top-up history and gateway checkout bookkeeping.
#[async_trait]
pub trait TopUpRepository: Send + Sync {
    async fn list_top_ups(&self, member_id: Option<i64>) -> CoreResult<Vec<TopUp>>;

    async fn create_payment_request(&self, gateway_order_id: &str, member_id: i64, amount: i64) -> CoreResult<PaymentRequest>;

    async fn attach_payment_token(&self, gateway_order_id: &str, token: &str, redirect_url: Option<&str>) -> CoreResult<()>;

    /// Marks a still-pending request failed, e.g. when the gateway call errored.
    async fn fail_payment_request(&self, gateway_order_id: &str) -> CoreResult<()>;

    async fn get_payment_request(&self, gateway_order_id: &str) -> CoreResult<Option<PaymentRequest>>;
}

/// Starts database transactions for the multi-statement workflows.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> CoreResult<Box<dyn LedgerTransaction>>;

    /// Cheap round trip used by the health endpoint.
    async fn ping(&self) -> CoreResult<()>;
}

/// The statements the order workflow and the member ledger run inside one
/// transaction. Dropping an uncommitted transaction rolls it back.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn menu_prices(&mut self, item_ids: &[i64]) -> CoreResult<Vec<MenuPrice>>;

    /// Fails with `NotFound` when the member or table does not exist.
    async fn insert_order(&mut self, order: &NewOrder) -> CoreResult<i64>;

    async fn insert_order_lines(&mut self, order_id: i64, lines: &[NewOrderLine]) -> CoreResult<u64>;

    async fn transition_order_status(&mut self, order_id: i64, from: OrderStatus, to: OrderStatus) -> CoreResult<StatusTransition>;

    /// `None` when the order has no lines.
    async fn refund_basis(&mut self, order_id: i64) -> CoreResult<Option<RefundBasis>>;

    /// Atomic `balance = balance + amount`; returns the new balance.
    async fn credit_balance(&mut self, member_id: i64, amount: i64) -> CoreResult<i64>;

    /// Atomic `balance = balance - amount` guarded by `balance >= amount`.
    async fn debit_balance(&mut self, member_id: i64, amount: i64) -> CoreResult<i64>;

    async fn record_top_up(&mut self, top_up: &NewTopUp) -> CoreResult<i64>;

    /// Moves a pending payment request to `to`; `None` if it is unknown or already processed.
    async fn claim_payment_request(&mut self, gateway_order_id: &str, to: PaymentRequestStatus) -> CoreResult<Option<PaymentRequest>>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;

    async fn rollback(self: Box<Self>) -> CoreResult<()>;
}
