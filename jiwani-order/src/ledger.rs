use serde::Serialize;
use std::sync::Arc;

use jiwani_core::member::{NewTopUp, TopUpSource};
use jiwani_core::repository::{LedgerTransaction, UnitOfWork};
use jiwani_core::{CoreError, CoreResult};

use crate::finish;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub member_id: i64,
    pub amount: i64,
    pub new_balance: i64,
    pub top_up_id: Option<i64>,
}

/// Balance mutations outside of order placement: admin top-ups and debits.
pub struct MemberLedger {
    uow: Arc<dyn UnitOfWork>,
}

impl MemberLedger {
    pub fn new(uow: Arc<dyn UnitOfWork>) -> Self {
        Self { uow }
    }

    pub async fn credit(
        &self,
        member_id: i64,
        amount: i64,
        source: TopUpSource,
        reference: Option<String>,
    ) -> CoreResult<LedgerReceipt> {
        ensure_positive(amount)?;
        let credit = NewTopUp { member_id, amount, source, reference };

        let mut tx = self.uow.begin().await?;
        let result = apply_credit(&mut *tx, &credit).await;
        let receipt = finish(tx, result).await?;

        tracing::info!(
            "Member {} credited {} via {} (balance {})",
            member_id, amount, source.as_str(), receipt.new_balance
        );
        Ok(receipt)
    }

    pub async fn debit(&self, member_id: i64, amount: i64) -> CoreResult<LedgerReceipt> {
        ensure_positive(amount)?;

        let mut tx = self.uow.begin().await?;
        let result = tx.debit_balance(member_id, amount).await;
        let new_balance = finish(tx, result).await?;

        tracing::info!("Member {} debited {} (balance {})", member_id, amount, new_balance);
        Ok(LedgerReceipt { member_id, amount, new_balance, top_up_id: None })
    }
}

fn ensure_positive(amount: i64) -> CoreResult<()> {
    if amount <= 0 {
        return Err(CoreError::validation("amount must be positive"));
    }
    Ok(())
}

/// The one crediting contract: atomic balance increment plus a top-up record,
/// both inside the caller's transaction. Refunds, gateway settlements and
/// admin top-ups all go through here.
pub(crate) async fn apply_credit(tx: &mut dyn LedgerTransaction, credit: &NewTopUp) -> CoreResult<LedgerReceipt> {
    let new_balance = tx.credit_balance(credit.member_id, credit.amount).await?;
    let top_up_id = tx.record_top_up(credit).await?;
    Ok(LedgerReceipt {
        member_id: credit.member_id,
        amount: credit.amount,
        new_balance,
        top_up_id: Some(top_up_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiwani_store::memory::{FailPoint, MemoryStore};
    use jiwani_core::repository::TopUpRepository;

    #[tokio::test]
    async fn test_credit_records_top_up() {
        let store = MemoryStore::seeded();
        let member = store.add_member("Budi", 10_000).await;
        let ledger = MemberLedger::new(Arc::new(store.clone()));

        let receipt = ledger.credit(member, 5_000, TopUpSource::Admin, None).await.unwrap();

        assert_eq!(receipt.new_balance, 15_000);
        assert_eq!(store.balance_of(member).await, 15_000);
        let history = store.list_top_ups(Some(member)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, 5_000);
        assert_eq!(history[0].source, TopUpSource::Admin);
    }

    #[tokio::test]
    async fn test_debit_never_goes_negative() {
        let store = MemoryStore::seeded();
        let member = store.add_member("Budi", 3_000).await;
        let ledger = MemberLedger::new(Arc::new(store.clone()));

        let err = ledger.debit(member, 5_000).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert_eq!(store.balance_of(member).await, 3_000);

        let receipt = ledger.debit(member, 3_000).await.unwrap();
        assert_eq!(receipt.new_balance, 0);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_and_unknown_member() {
        let store = MemoryStore::seeded();
        let ledger = MemberLedger::new(Arc::new(store.clone()));

        assert!(matches!(
            ledger.credit(1, 0, TopUpSource::Admin, None).await,
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            ledger.credit(999, 100, TopUpSource::Admin, None).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_top_up_record_undoes_credit() {
        let store = MemoryStore::seeded();
        let member = store.add_member("Budi", 1_000).await;
        let ledger = MemberLedger::new(Arc::new(store.clone()));

        store.fail_at(FailPoint::RecordTopUp).await;
        assert!(ledger.credit(member, 500, TopUpSource::Admin, None).await.is_err());

        assert_eq!(store.balance_of(member).await, 1_000);
        assert!(store.list_top_ups(Some(member)).await.unwrap().is_empty());
    }
}
