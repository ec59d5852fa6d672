use std::path::PathBuf;
use std::sync::Arc;

use jiwani_core::repository::{MemberRepository, MenuRepository, OrderRepository, TopUpRepository, UnitOfWork};
use jiwani_order::{MemberLedger, OrderWorkflow, PaymentOrchestrator, SettlementProcessor};

use crate::mailer::Mailer;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
    pub bcrypt_cost: u32,
}

#[derive(Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub menu_repo: Arc<dyn MenuRepository>,
    pub member_repo: Arc<dyn MemberRepository>,
    pub order_repo: Arc<dyn OrderRepository>,
    pub top_up_repo: Arc<dyn TopUpRepository>,
    pub uow: Arc<dyn UnitOfWork>,
    pub workflow: Arc<OrderWorkflow>,
    pub ledger: Arc<MemberLedger>,
    pub settlement: Arc<SettlementProcessor>,
    pub payment_orchestrator: Arc<PaymentOrchestrator>,
    pub mailer: Arc<dyn Mailer>,
    pub auth: AuthConfig,
    pub uploads: UploadSettings,
    /// Base URL for links in outgoing mail.
    pub public_url: String,
}

/// Everything `AppState` needs that is backend specific.
pub struct Backends {
    pub menu_repo: Arc<dyn MenuRepository>,
    pub member_repo: Arc<dyn MemberRepository>,
    pub order_repo: Arc<dyn OrderRepository>,
    pub top_up_repo: Arc<dyn TopUpRepository>,
    pub uow: Arc<dyn UnitOfWork>,
}

impl AppState {
    /// Wires the workflows on top of the given repositories.
    pub fn new(
        backends: Backends,
        gateway: Arc<dyn jiwani_core::payment::PaymentGateway>,
        mailer: Arc<dyn Mailer>,
        auth: AuthConfig,
        uploads: UploadSettings,
        public_url: String,
    ) -> Self {
        let Backends { menu_repo, member_repo, order_repo, top_up_repo, uow } = backends;
        Self {
            workflow: Arc::new(OrderWorkflow::new(uow.clone())),
            ledger: Arc::new(MemberLedger::new(uow.clone())),
            settlement: Arc::new(SettlementProcessor::new(uow.clone())),
            payment_orchestrator: Arc::new(PaymentOrchestrator::new(gateway, top_up_repo.clone())),
            menu_repo,
            member_repo,
            order_repo,
            top_up_repo,
            uow,
            mailer,
            auth,
            uploads,
            public_url,
        }
    }
}
