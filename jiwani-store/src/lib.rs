pub mod app_config;
pub mod database;
mod errors;
pub mod member_repo;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod menu_repo;
pub mod midtrans;
pub mod order_repo;
pub mod topup_repo;
pub mod tx;

pub use database::DbClient;
pub use member_repo::StoreMemberRepository;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use menu_repo::StoreMenuRepository;
pub use midtrans::MidtransGateway;
pub use order_repo::StoreOrderRepository;
pub use topup_repo::StoreTopUpRepository;
pub use tx::PgUnitOfWork;
