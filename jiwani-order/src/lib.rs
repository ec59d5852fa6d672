pub mod workflow;
pub mod ledger;
pub mod settlement;
pub mod orchestrator;

pub use workflow::{CancelOutcome, OrderError, OrderWorkflow, PlaceOrder, PlacedOrder};
pub use ledger::{LedgerReceipt, MemberLedger};
pub use settlement::{SettlementOutcome, SettlementProcessor};
pub use orchestrator::{MockPaymentGateway, PaymentOrchestrator, TopUpCheckout};

use jiwani_core::repository::LedgerTransaction;
use jiwani_core::CoreError;

/// Commits on success; on failure rolls back and hands the original error back.
pub(crate) async fn finish<T, E>(tx: Box<dyn LedgerTransaction>, result: Result<T, E>) -> Result<T, E>
where
    E: From<CoreError> + std::fmt::Display,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!("Rollback failed after '{}': {}", err, rollback_err);
            }
            Err(err)
        }
    }
}
