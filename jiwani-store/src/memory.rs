//! In-process implementation of every repository and of the unit of work.
//!
//! A transaction holds the store lock for its lifetime and mutates a staged
//! copy of the state, which replaces the shared state only on commit. Failure
//! points can be armed to make a single operation fail once, so rollback paths
//! can be exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use jiwani_core::member::{
    Member, MemberToken, NewMember, NewTopUp, PaymentRequest, PaymentRequestStatus, Role, TokenPurpose, TopUp,
};
use jiwani_core::menu::{Category, MenuFilter, MenuItem, MenuPrice, NewMenuItem};
use jiwani_core::order::{
    DiningTable, MemberRef, NewOrder, NewOrderLine, OrderFilter, OrderLineView, OrderStatus, OrderView, PaymentMethod,
    PaymentStatus, RefundBasis, StatusTransition,
};
use jiwani_core::repository::{
    LedgerTransaction, MemberRepository, MenuRepository, OrderRepository, TopUpRepository, UnitOfWork,
};
use jiwani_core::{CoreError, CoreResult};

pub const MAKANAN: i64 = 1;
pub const MINUMAN: i64 = 2;

pub const NASI_GORENG: i64 = 1;
pub const ES_TEH: i64 = 2;
pub const SATE_INACTIVE: i64 = 3;

/// Operations that can be armed to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    InsertOrder,
    InsertLines,
    CreditBalance,
    DebitBalance,
    RecordTopUp,
    Commit,
    /// The non-transactional `order_changes` append.
    AuditWrite,
}

#[derive(Debug, Clone)]
struct StoredOrder {
    id: i64,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    payment_id: Option<String>,
    table_id: i64,
    member_id: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredLine {
    order_id: i64,
    item_id: i64,
    quantity: i32,
    line_total: i64,
}

#[derive(Debug, Clone)]
struct StoredToken {
    token: MemberToken,
    used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StoredChange {
    order_id: i64,
    change_type: String,
}

#[derive(Debug, Clone, Default)]
struct State {
    categories: Vec<Category>,
    items: Vec<MenuItem>,
    tables: Vec<DiningTable>,
    members: Vec<Member>,
    tokens: Vec<StoredToken>,
    orders: Vec<StoredOrder>,
    lines: Vec<StoredLine>,
    top_ups: Vec<TopUp>,
    payment_requests: Vec<PaymentRequest>,
    changes: Vec<StoredChange>,
    next_item_id: i64,
    next_member_id: i64,
    next_order_id: i64,
    next_top_up_id: i64,
}

impl State {
    fn seeded() -> Self {
        let now = Utc::now();
        let categories = vec![
            Category { id: MAKANAN, name: "Makanan".to_string() },
            Category { id: MINUMAN, name: "Minuman".to_string() },
        ];
        let item = |id: i64, name: &str, price: i64, category_id: i64, is_active: bool| MenuItem {
            id,
            name: name.to_string(),
            price,
            image: None,
            category_id,
            category: None,
            is_active,
            created_at: now,
        };
        let items = vec![
            item(NASI_GORENG, "Nasi Goreng", 25_000, MAKANAN, true),
            item(ES_TEH, "Es Teh Manis", 5_000, MINUMAN, true),
            item(SATE_INACTIVE, "Sate Ayam", 40_000, MAKANAN, false),
        ];
        let tables = (1..=5)
            .map(|n| DiningTable { id: n, number: format!("T{:02}", n) })
            .collect();

        State {
            categories,
            items,
            tables,
            next_item_id: 4,
            next_member_id: 1,
            next_order_id: 1,
            next_top_up_id: 1,
            ..State::default()
        }
    }

    fn with_category(&self, item: &MenuItem) -> MenuItem {
        let mut item = item.clone();
        item.category = self
            .categories
            .iter()
            .find(|c| c.id == item.category_id)
            .map(|c| c.name.clone());
        item
    }

    fn require_category(&self, category_id: i64) -> CoreResult<()> {
        if self.categories.iter().any(|c| c.id == category_id) {
            Ok(())
        } else {
            Err(CoreError::not_found(format!("category {}", category_id)))
        }
    }

    fn item_mut(&mut self, id: i64) -> CoreResult<&mut MenuItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| CoreError::not_found(format!("menu item {}", id)))
    }

    fn member_mut(&mut self, id: i64) -> CoreResult<&mut Member> {
        self.members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CoreError::not_found(format!("member {}", id)))
    }

    fn view(&self, order: &StoredOrder) -> OrderView {
        let items: Vec<OrderLineView> = self
            .lines
            .iter()
            .filter(|l| l.order_id == order.id)
            .map(|l| OrderLineView {
                item_id: l.item_id,
                name: self
                    .items
                    .iter()
                    .find(|i| i.id == l.item_id)
                    .map(|i| i.name.clone())
                    .unwrap_or_default(),
                quantity: l.quantity,
                line_total: l.line_total,
            })
            .collect();
        let table = self
            .tables
            .iter()
            .find(|t| t.id == order.table_id)
            .cloned()
            .unwrap_or(DiningTable { id: order.table_id, number: String::new() });
        let member_name = self
            .members
            .iter()
            .find(|m| m.id == order.member_id)
            .map(|m| m.name.clone())
            .unwrap_or_default();

        OrderView {
            id: order.id,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            payment_id: order.payment_id.clone(),
            table,
            member: MemberRef { id: order.member_id, name: member_name },
            created_at: order.created_at,
            total: items.iter().map(|l| l.line_total).sum(),
            items,
        }
    }

    fn insert_member(&mut self, name: &str, balance: i64, role: Role) -> i64 {
        let id = self.next_member_id;
        self.next_member_id += 1;
        let handle = format!("{}{}", name.to_lowercase().replace(' ', "_"), id);
        self.members.push(Member {
            id,
            name: name.to_string(),
            username: handle.clone(),
            email: format!("{}@jiwani.test", handle),
            password_hash: String::new(),
            balance,
            email_verified: true,
            role,
            created_at: Utc::now(),
        });
        id
    }
}

/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail: Arc<Mutex<Option<FailPoint>>>,
}

impl MemoryStore {
    /// Two categories, three menu items (one inactive) and tables 1 to 5.
    pub fn seeded() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::seeded())),
            fail: Arc::new(Mutex::new(None)),
        }
    }

    /// Adds a verified member with the given balance and returns its id.
    pub async fn add_member(&self, name: &str, balance: i64) -> i64 {
        self.state.lock().await.insert_member(name, balance, Role::Member)
    }

    pub async fn add_admin(&self, name: &str) -> i64 {
        self.state.lock().await.insert_member(name, 0, Role::Admin)
    }

    pub async fn balance_of(&self, member_id: i64) -> i64 {
        let state = self.state.lock().await;
        state.members.iter().find(|m| m.id == member_id).map_or(0, |m| m.balance)
    }

    /// Arms `point` to fail the next time it runs.
    pub async fn fail_at(&self, point: FailPoint) {
        *self.fail.lock().await = Some(point);
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    pub async fn line_count(&self) -> usize {
        self.state.lock().await.lines.len()
    }

    pub async fn order_status(&self, order_id: i64) -> Option<OrderStatus> {
        let state = self.state.lock().await;
        state.orders.iter().find(|o| o.id == order_id).map(|o| o.status)
    }

    /// Inserts a pending order with no lines, bypassing the workflow.
    pub async fn insert_bare_order(&self, member_id: i64, payment_method: PaymentMethod) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.next_order_id;
        state.next_order_id += 1;
        let cashless = payment_method.is_cashless();
        state.orders.push(StoredOrder {
            id,
            status: OrderStatus::Pending,
            payment_status: if cashless { PaymentStatus::Paid } else { PaymentStatus::Unpaid },
            payment_method,
            payment_id: cashless.then(|| format!("PAY-BARE-{}", id)),
            table_id: 1,
            member_id,
            created_at: Utc::now(),
        });
        id
    }

    pub async fn payment_requests(&self) -> Vec<PaymentRequest> {
        self.state.lock().await.payment_requests.clone()
    }

    /// Most recent token issued to a member for `purpose`, used or not.
    pub async fn latest_token(&self, member_id: i64, purpose: TokenPurpose) -> Option<String> {
        let state = self.state.lock().await;
        state
            .tokens
            .iter()
            .rev()
            .find(|t| t.token.member_id == member_id && t.token.purpose == purpose)
            .map(|t| t.token.token.clone())
    }

    /// Change types recorded in the audit trail of an order, oldest first.
    pub async fn order_changes(&self, order_id: i64) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .changes
            .iter()
            .filter(|c| c.order_id == order_id)
            .map(|c| c.change_type.clone())
            .collect()
    }

    async fn trip(fail: &Mutex<Option<FailPoint>>, point: FailPoint) -> CoreResult<()> {
        let mut armed = fail.lock().await;
        if *armed == Some(point) {
            *armed = None;
            return Err(CoreError::InternalError(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl MenuRepository for MemoryStore {
    async fn list_categories(&self) -> CoreResult<Vec<Category>> {
        Ok(self.state.lock().await.categories.clone())
    }

    async fn list_items(&self, filter: &MenuFilter) -> CoreResult<Vec<MenuItem>> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .iter()
            .map(|i| state.with_category(i))
            .filter(|i| filter.matches(i))
            .collect())
    }

    async fn get_item(&self, id: i64) -> CoreResult<Option<MenuItem>> {
        let state = self.state.lock().await;
        Ok(state.items.iter().find(|i| i.id == id).map(|i| state.with_category(i)))
    }

    async fn create_item(&self, item: &NewMenuItem) -> CoreResult<MenuItem> {
        let mut state = self.state.lock().await;
        state.require_category(item.category_id)?;
        let id = state.next_item_id;
        state.next_item_id += 1;
        let created = MenuItem {
            id,
            name: item.name.clone(),
            price: item.price,
            image: item.image.clone(),
            category_id: item.category_id,
            category: None,
            is_active: item.is_active,
            created_at: Utc::now(),
        };
        state.items.push(created.clone());
        Ok(state.with_category(&created))
    }

    async fn update_item(&self, id: i64, item: &NewMenuItem) -> CoreResult<MenuItem> {
        let mut state = self.state.lock().await;
        state.require_category(item.category_id)?;
        let stored = state.item_mut(id)?;
        stored.name = item.name.clone();
        stored.price = item.price;
        stored.image = item.image.clone();
        stored.category_id = item.category_id;
        stored.is_active = item.is_active;
        let updated = stored.clone();
        Ok(state.with_category(&updated))
    }

    async fn set_price(&self, id: i64, price: i64) -> CoreResult<MenuItem> {
        let mut state = self.state.lock().await;
        let stored = state.item_mut(id)?;
        stored.price = price;
        let updated = stored.clone();
        Ok(state.with_category(&updated))
    }

    async fn set_active(&self, id: i64, is_active: bool) -> CoreResult<MenuItem> {
        let mut state = self.state.lock().await;
        let stored = state.item_mut(id)?;
        stored.is_active = is_active;
        let updated = stored.clone();
        Ok(state.with_category(&updated))
    }

    async fn delete_item(&self, id: i64) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.items.iter().any(|i| i.id == id) {
            return Err(CoreError::not_found(format!("menu item {}", id)));
        }
        if state.lines.iter().any(|l| l.item_id == id) {
            return Err(CoreError::conflict(format!("menu item {} is referenced by existing orders", id)));
        }
        state.items.retain(|i| i.id != id);
        Ok(())
    }
}

#[async_trait]
impl MemberRepository for MemoryStore {
    async fn create_member(&self, member: &NewMember) -> CoreResult<Member> {
        let mut state = self.state.lock().await;
        let taken = state.members.iter().any(|m| {
            m.email.eq_ignore_ascii_case(&member.email) || m.username == member.username
        });
        if taken {
            return Err(CoreError::conflict("email or username already registered"));
        }
        let id = state.next_member_id;
        state.next_member_id += 1;
        let created = Member {
            id,
            name: member.name.clone(),
            username: member.username.clone(),
            email: member.email.clone(),
            password_hash: member.password_hash.clone(),
            balance: 0,
            email_verified: false,
            role: member.role,
            created_at: Utc::now(),
        };
        state.members.push(created.clone());
        Ok(created)
    }

    async fn get_member(&self, id: i64) -> CoreResult<Option<Member>> {
        let state = self.state.lock().await;
        Ok(state.members.iter().find(|m| m.id == id).cloned())
    }

    async fn find_by_login(&self, identifier: &str) -> CoreResult<Option<Member>> {
        let state = self.state.lock().await;
        Ok(state
            .members
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(identifier) || m.username == identifier)
            .cloned())
    }

    async fn set_email_verified(&self, id: i64) -> CoreResult<()> {
        self.state.lock().await.member_mut(id)?.email_verified = true;
        Ok(())
    }

    async fn reset_password(&self, token: &str, password_hash: &str, now: DateTime<Utc>) -> CoreResult<Option<i64>> {
        let mut state = self.state.lock().await;
        let Some(found) = state.tokens.iter_mut().find(|t| {
            t.token.token == token
                && t.token.purpose == TokenPurpose::ResetPassword
                && t.used_at.is_none()
                && t.token.expires_at > now
        }) else {
            return Ok(None);
        };
        let member_id = found.token.member_id;
        found.used_at = Some(now);
        state.member_mut(member_id)?.password_hash = password_hash.to_string();
        Ok(Some(member_id))
    }

    async fn issue_token(&self, token: &MemberToken) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.members.iter().any(|m| m.id == token.member_id) {
            return Err(CoreError::not_found(format!("member {}", token.member_id)));
        }
        state.tokens.push(StoredToken { token: token.clone(), used_at: None });
        Ok(())
    }

    async fn consume_token(&self, token: &str, purpose: TokenPurpose, now: DateTime<Utc>) -> CoreResult<Option<i64>> {
        let mut state = self.state.lock().await;
        let found = state.tokens.iter_mut().find(|t| {
            t.token.token == token && t.token.purpose == purpose && t.used_at.is_none() && t.token.expires_at > now
        });
        Ok(found.map(|t| {
            t.used_at = Some(now);
            t.token.member_id
        }))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn get_order(&self, id: i64) -> CoreResult<Option<OrderView>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).map(|o| state.view(o)))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Vec<OrderView>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .map(|o| state.view(o))
            .filter(|v| filter.matches(v))
            .collect())
    }

    async fn mark_paid(&self, id: i64) -> CoreResult<StatusTransition> {
        let mut state = self.state.lock().await;
        let Some(order) = state.orders.iter_mut().find(|o| o.id == id) else {
            return Ok(StatusTransition::NotFound);
        };
        if order.status != OrderStatus::Pending || order.payment_status != PaymentStatus::Unpaid {
            return Ok(StatusTransition::Rejected(order.status));
        }
        order.payment_status = PaymentStatus::Paid;
        Ok(StatusTransition::Applied)
    }

    async fn list_tables(&self) -> CoreResult<Vec<DiningTable>> {
        Ok(self.state.lock().await.tables.clone())
    }

    async fn add_order_change(
        &self,
        order_id: i64,
        change_type: &str,
        _old_value: Option<Value>,
        _new_value: Option<Value>,
        _actor: &str,
        _reason: Option<&str>,
    ) -> CoreResult<()> {
        Self::trip(&self.fail, FailPoint::AuditWrite).await?;
        let mut state = self.state.lock().await;
        if !state.orders.iter().any(|o| o.id == order_id) {
            return Err(CoreError::not_found(format!("order {}", order_id)));
        }
        state.changes.push(StoredChange { order_id, change_type: change_type.to_string() });
        Ok(())
    }
}

#[async_trait]
impl TopUpRepository for MemoryStore {
    async fn list_top_ups(&self, member_id: Option<i64>) -> CoreResult<Vec<TopUp>> {
        let state = self.state.lock().await;
        Ok(state
            .top_ups
            .iter()
            .rev()
            .filter(|t| member_id.map_or(true, |m| t.member_id == m))
            .cloned()
            .collect())
    }

    async fn create_payment_request(&self, gateway_order_id: &str, member_id: i64, amount: i64) -> CoreResult<PaymentRequest> {
        let mut state = self.state.lock().await;
        if !state.members.iter().any(|m| m.id == member_id) {
            return Err(CoreError::not_found(format!("member {}", member_id)));
        }
        if state.payment_requests.iter().any(|p| p.gateway_order_id == gateway_order_id) {
            return Err(CoreError::conflict(format!("payment request {} exists", gateway_order_id)));
        }
        let request = PaymentRequest {
            gateway_order_id: gateway_order_id.to_string(),
            member_id,
            amount,
            status: PaymentRequestStatus::Pending,
            token: None,
            redirect_url: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        state.payment_requests.push(request.clone());
        Ok(request)
    }

    async fn attach_payment_token(&self, gateway_order_id: &str, token: &str, redirect_url: Option<&str>) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let request = state
            .payment_requests
            .iter_mut()
            .find(|p| p.gateway_order_id == gateway_order_id)
            .ok_or_else(|| CoreError::not_found(format!("payment request {}", gateway_order_id)))?;
        request.token = Some(token.to_string());
        request.redirect_url = redirect_url.map(str::to_string);
        Ok(())
    }

    async fn fail_payment_request(&self, gateway_order_id: &str) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(request) = state
            .payment_requests
            .iter_mut()
            .find(|p| p.gateway_order_id == gateway_order_id && p.status == PaymentRequestStatus::Pending)
        {
            request.status = PaymentRequestStatus::Failed;
            request.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_payment_request(&self, gateway_order_id: &str) -> CoreResult<Option<PaymentRequest>> {
        let state = self.state.lock().await;
        Ok(state.payment_requests.iter().find(|p| p.gateway_order_id == gateway_order_id).cloned())
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn begin(&self) -> CoreResult<Box<dyn LedgerTransaction>> {
        Self::trip(&self.fail, FailPoint::Begin).await?;
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, staged, fail: self.fail.clone() }))
    }

    async fn ping(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Holds the store lock; `staged` replaces the shared state on commit.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    staged: State,
    fail: Arc<Mutex<Option<FailPoint>>>,
}

impl MemoryTransaction {
    async fn trip(&self, point: FailPoint) -> CoreResult<()> {
        MemoryStore::trip(&self.fail, point).await
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn menu_prices(&mut self, item_ids: &[i64]) -> CoreResult<Vec<MenuPrice>> {
        Ok(self
            .staged
            .items
            .iter()
            .filter(|i| item_ids.contains(&i.id))
            .map(|i| MenuPrice { id: i.id, name: i.name.clone(), price: i.price, is_active: i.is_active })
            .collect())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> CoreResult<i64> {
        self.trip(FailPoint::InsertOrder).await?;
        let state = &mut self.staged;
        let member_known = state.members.iter().any(|m| m.id == order.member_id);
        let table_known = state.tables.iter().any(|t| t.id == order.table_id);
        if !member_known || !table_known {
            return Err(CoreError::not_found(format!("member {} or table {}", order.member_id, order.table_id)));
        }
        let id = state.next_order_id;
        state.next_order_id += 1;
        state.orders.push(StoredOrder {
            id,
            status: OrderStatus::Pending,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            payment_id: order.payment_id.clone(),
            table_id: order.table_id,
            member_id: order.member_id,
            created_at: order.created_at.unwrap_or_else(Utc::now),
        });
        Ok(id)
    }

    async fn insert_order_lines(&mut self, order_id: i64, lines: &[NewOrderLine]) -> CoreResult<u64> {
        self.trip(FailPoint::InsertLines).await?;
        let state = &mut self.staged;
        if let Some(line) = lines.iter().find(|l| !state.items.iter().any(|i| i.id == l.item_id)) {
            return Err(CoreError::not_found(format!("menu item {}", line.item_id)));
        }
        state.lines.extend(lines.iter().map(|l| StoredLine {
            order_id,
            item_id: l.item_id,
            quantity: l.quantity,
            line_total: l.line_total,
        }));
        Ok(lines.len() as u64)
    }

    async fn transition_order_status(&mut self, order_id: i64, from: OrderStatus, to: OrderStatus) -> CoreResult<StatusTransition> {
        let Some(order) = self.staged.orders.iter_mut().find(|o| o.id == order_id) else {
            return Ok(StatusTransition::NotFound);
        };
        if order.status != from {
            return Ok(StatusTransition::Rejected(order.status));
        }
        order.status = to;
        Ok(StatusTransition::Applied)
    }

    async fn refund_basis(&mut self, order_id: i64) -> CoreResult<Option<RefundBasis>> {
        let state = &self.staged;
        let Some(order) = state.orders.iter().find(|o| o.id == order_id) else {
            return Ok(None);
        };
        let lines: Vec<&StoredLine> = state.lines.iter().filter(|l| l.order_id == order_id).collect();
        if lines.is_empty() {
            return Ok(None);
        }
        Ok(Some(RefundBasis {
            member_id: order.member_id,
            payment_method: order.payment_method,
            payment_id: order.payment_id.clone(),
            total: lines.iter().map(|l| l.line_total).sum(),
            line_count: lines.len() as i64,
        }))
    }

    async fn credit_balance(&mut self, member_id: i64, amount: i64) -> CoreResult<i64> {
        self.trip(FailPoint::CreditBalance).await?;
        let member = self.staged.member_mut(member_id)?;
        member.balance += amount;
        Ok(member.balance)
    }

    async fn debit_balance(&mut self, member_id: i64, amount: i64) -> CoreResult<i64> {
        self.trip(FailPoint::DebitBalance).await?;
        let member = self.staged.member_mut(member_id)?;
        if member.balance < amount {
            return Err(CoreError::validation("insufficient balance"));
        }
        member.balance -= amount;
        Ok(member.balance)
    }

    async fn record_top_up(&mut self, top_up: &NewTopUp) -> CoreResult<i64> {
        self.trip(FailPoint::RecordTopUp).await?;
        let state = &mut self.staged;
        let id = state.next_top_up_id;
        state.next_top_up_id += 1;
        state.top_ups.push(TopUp {
            id,
            member_id: top_up.member_id,
            amount: top_up.amount,
            source: top_up.source,
            reference: top_up.reference.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn claim_payment_request(&mut self, gateway_order_id: &str, to: PaymentRequestStatus) -> CoreResult<Option<PaymentRequest>> {
        let claimed = self
            .staged
            .payment_requests
            .iter_mut()
            .find(|p| p.gateway_order_id == gateway_order_id && p.status == PaymentRequestStatus::Pending)
            .map(|p| {
                p.status = to;
                p.processed_at = Some(Utc::now());
                p.clone()
            });
        Ok(claimed)
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.trip(FailPoint::Commit).await?;
        let MemoryTransaction { mut guard, staged, .. } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uncommitted_transaction_leaves_state_untouched() {
        let store = MemoryStore::seeded();
        let member = store.add_member("Ayu", 1_000).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.credit_balance(member, 500).await.unwrap(), 1_500);
        drop(tx);

        assert_eq!(store.balance_of(member).await, 1_000);

        let mut tx = store.begin().await.unwrap();
        tx.credit_balance(member, 500).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.balance_of(member).await, 1_500);
    }

    #[tokio::test]
    async fn test_fail_point_trips_once() {
        let store = MemoryStore::seeded();
        store.fail_at(FailPoint::Begin).await;

        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_ok());
    }

    #[tokio::test]
    async fn test_referenced_item_cannot_be_deleted() {
        let store = MemoryStore::seeded();
        let member = store.add_member("Ayu", 0).await;

        let mut tx = store.begin().await.unwrap();
        let order_id = tx
            .insert_order(&NewOrder {
                member_id: member,
                table_id: 1,
                payment_method: PaymentMethod::Cashier,
                payment_status: PaymentStatus::Unpaid,
                payment_id: None,
                created_at: None,
            })
            .await
            .unwrap();
        tx.insert_order_lines(order_id, &[NewOrderLine { item_id: ES_TEH, quantity: 1, line_total: 5_000 }])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(store.delete_item(ES_TEH).await, Err(CoreError::Conflict(_))));
        assert!(store.delete_item(SATE_INACTIVE).await.is_ok());
        assert!(matches!(store.delete_item(SATE_INACTIVE).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tokens_are_single_use_and_expire() {
        let store = MemoryStore::seeded();
        let member = store.add_member("Ayu", 0).await;
        let now = Utc::now();
        let token = |value: &str, expires_at| MemberToken {
            token: value.to_string(),
            member_id: member,
            purpose: TokenPurpose::ResetPassword,
            expires_at,
        };
        store.issue_token(&token("fresh", now + chrono::Duration::hours(1))).await.unwrap();
        store.issue_token(&token("stale", now - chrono::Duration::minutes(1))).await.unwrap();

        assert_eq!(store.consume_token("fresh", TokenPurpose::VerifyEmail, now).await.unwrap(), None);
        assert_eq!(store.consume_token("fresh", TokenPurpose::ResetPassword, now).await.unwrap(), Some(member));
        assert_eq!(store.consume_token("fresh", TokenPurpose::ResetPassword, now).await.unwrap(), None);
        assert_eq!(store.consume_token("stale", TokenPurpose::ResetPassword, now).await.unwrap(), None);
    }
}
