use serde::Serialize;
use std::sync::Arc;

use jiwani_core::member::{NewTopUp, PaymentRequestStatus, TopUpSource};
use jiwani_core::payment::{GatewayNotification, NotificationOutcome};
use jiwani_core::repository::{LedgerTransaction, UnitOfWork};
use jiwani_core::{CoreError, CoreResult};

use crate::finish;
use crate::ledger::{apply_credit, LedgerReceipt};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    Credited(LedgerReceipt),
    MarkedFailed,
    /// Unknown gateway order or one already processed; nothing changed.
    Duplicate,
    Ignored,
}

/// Applies gateway notifications to top-up payment requests.
///
/// Crediting is keyed on the payment request: the `pending → settled` claim
/// and the balance credit share one transaction, so a replayed settlement
/// finds nothing to claim and cannot credit twice.
pub struct SettlementProcessor {
    uow: Arc<dyn UnitOfWork>,
}

impl SettlementProcessor {
    pub fn new(uow: Arc<dyn UnitOfWork>) -> Self {
        Self { uow }
    }

    pub async fn handle_notification(&self, notification: &GatewayNotification) -> CoreResult<SettlementOutcome> {
        let target = match notification.outcome() {
            NotificationOutcome::Settled => PaymentRequestStatus::Settled,
            NotificationOutcome::Failed => PaymentRequestStatus::Failed,
            NotificationOutcome::Pending => {
                tracing::debug!(
                    "Notification for {} is {}, nothing to apply",
                    notification.order_id, notification.transaction_status
                );
                return Ok(SettlementOutcome::Ignored);
            }
        };

        let mut tx = self.uow.begin().await?;
        let result = apply(&mut *tx, notification, target).await;
        let outcome = finish(tx, result).await?;

        match &outcome {
            SettlementOutcome::Credited(receipt) => tracing::info!(
                "Top-up {} settled: member {} credited {}",
                notification.order_id, receipt.member_id, receipt.amount
            ),
            SettlementOutcome::Duplicate => tracing::warn!(
                "Replayed or unknown notification for {} ({}), ignored",
                notification.order_id, notification.transaction_status
            ),
            SettlementOutcome::MarkedFailed => tracing::info!(
                "Top-up {} failed with status {}",
                notification.order_id, notification.transaction_status
            ),
            SettlementOutcome::Ignored => {}
        }
        Ok(outcome)
    }
}

async fn apply(
    tx: &mut dyn LedgerTransaction,
    notification: &GatewayNotification,
    target: PaymentRequestStatus,
) -> CoreResult<SettlementOutcome> {
    let Some(request) = tx.claim_payment_request(&notification.order_id, target).await? else {
        return Ok(SettlementOutcome::Duplicate);
    };

    if target == PaymentRequestStatus::Failed {
        return Ok(SettlementOutcome::MarkedFailed);
    }

    let paid = notification.gross_amount_units()?;
    if paid != request.amount {
        return Err(CoreError::IntegrityError(format!(
            "gateway reported {} for {} but {} was requested",
            paid, request.gateway_order_id, request.amount
        )));
    }

    let receipt = apply_credit(
        tx,
        &NewTopUp {
            member_id: request.member_id,
            amount: request.amount,
            source: TopUpSource::Gateway,
            reference: Some(request.gateway_order_id.clone()),
        },
    )
    .await?;

    Ok(SettlementOutcome::Credited(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiwani_core::repository::TopUpRepository;
    use jiwani_store::memory::MemoryStore;

    fn settlement(order_id: &str, gross: &str) -> GatewayNotification {
        GatewayNotification {
            order_id: order_id.to_string(),
            transaction_status: "settlement".to_string(),
            fraud_status: Some("accept".to_string()),
            gross_amount: gross.to_string(),
            status_code: Some("200".to_string()),
            signature_key: None,
            transaction_id: Some("txn-1".to_string()),
        }
    }

    async fn setup() -> (MemoryStore, SettlementProcessor, i64) {
        let store = MemoryStore::seeded();
        let member = store.add_member("Rina", 1_000).await;
        store.create_payment_request("TOPUP-A", member, 50_000).await.unwrap();
        let processor = SettlementProcessor::new(Arc::new(store.clone()));
        (store, processor, member)
    }

    #[tokio::test]
    async fn test_settlement_credits_once() {
        let (store, processor, member) = setup().await;
        let n = settlement("TOPUP-A", "50000.00");

        let first = processor.handle_notification(&n).await.unwrap();
        assert!(matches!(first, SettlementOutcome::Credited(ref r) if r.new_balance == 51_000));

        let replay = processor.handle_notification(&n).await.unwrap();
        assert_eq!(replay, SettlementOutcome::Duplicate);

        assert_eq!(store.balance_of(member).await, 51_000);
        let history = store.list_top_ups(Some(member)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source, TopUpSource::Gateway);
        assert_eq!(history[0].reference.as_deref(), Some("TOPUP-A"));
    }

    #[tokio::test]
    async fn test_amount_mismatch_keeps_request_pending() {
        let (store, processor, member) = setup().await;

        let err = processor.handle_notification(&settlement("TOPUP-A", "10.50")).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let err = processor.handle_notification(&settlement("TOPUP-A", "49000.00")).await.unwrap_err();
        assert!(matches!(err, CoreError::IntegrityError(_)));
        assert_eq!(store.balance_of(member).await, 1_000);

        let request = store.get_payment_request("TOPUP-A").await.unwrap().unwrap();
        assert_eq!(request.status, PaymentRequestStatus::Pending);

        // The correct notification still applies afterwards
        let ok = processor.handle_notification(&settlement("TOPUP-A", "50000.00")).await.unwrap();
        assert!(matches!(ok, SettlementOutcome::Credited(_)));
    }

    #[tokio::test]
    async fn test_failure_then_late_settlement_does_not_credit() {
        let (store, processor, member) = setup().await;
        let mut expired = settlement("TOPUP-A", "50000.00");
        expired.transaction_status = "expire".to_string();
        expired.fraud_status = None;

        assert_eq!(processor.handle_notification(&expired).await.unwrap(), SettlementOutcome::MarkedFailed);
        assert_eq!(
            processor.handle_notification(&settlement("TOPUP-A", "50000.00")).await.unwrap(),
            SettlementOutcome::Duplicate
        );
        assert_eq!(store.balance_of(member).await, 1_000);
    }

    #[tokio::test]
    async fn test_unknown_order_and_pending_status() {
        let (store, processor, member) = setup().await;

        assert_eq!(
            processor.handle_notification(&settlement("TOPUP-NOPE", "1.00")).await.unwrap(),
            SettlementOutcome::Duplicate
        );

        let mut pending = settlement("TOPUP-A", "50000.00");
        pending.transaction_status = "pending".to_string();
        assert_eq!(processor.handle_notification(&pending).await.unwrap(), SettlementOutcome::Ignored);
        assert_eq!(store.balance_of(member).await, 1_000);
    }
}
