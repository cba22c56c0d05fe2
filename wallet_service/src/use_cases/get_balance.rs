use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::error::WalletError;
use crate::domain::repository::{BalanceCache, WalletReader};
use crate::domain::types::WalletId;
use crate::use_cases::BalanceSummary;

/// Caso de uso: consultar el balance de una billetera.
///
/// Read-through: primero el cache (TTL 30s), despues el store. Una
/// billetera inexistente responde balance 0 sin auto-provisionar. Las
/// fallas del cache se degradan a un miss.
pub struct GetBalanceUseCase {
    wallets: Arc<dyn WalletReader>,
    balance_cache: Arc<dyn BalanceCache>,
}

impl GetBalanceUseCase {
    pub fn new(wallets: Arc<dyn WalletReader>, balance_cache: Arc<dyn BalanceCache>) -> Self {
        Self {
            wallets,
            balance_cache,
        }
    }

    #[tracing::instrument(name = "GetBalanceUseCase::execute", skip(self))]
    pub async fn execute(&self, wallet_id: WalletId) -> Result<BalanceSummary, WalletError> {
        match self.balance_cache.get(&wallet_id).await {
            Ok(Some(balance)) => {
                return Ok(BalanceSummary { wallet_id, balance });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(wallet_id = %wallet_id, error = %e, "balance cache read failed, falling back to store");
            }
        }

        let balance = match self.wallets.find(&wallet_id).await? {
            Some(wallet) => {
                let balance = wallet.balance();
                if let Err(e) = self.balance_cache.set(&wallet_id, balance).await {
                    tracing::warn!(wallet_id = %wallet_id, error = %e, "balance cache set failed");
                }
                balance
            }
            None => Decimal::ZERO,
        };

        Ok(BalanceSummary { wallet_id, balance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Wallet;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::*;
    use std::str::FromStr;

    mock! {
        pub WalletReaderImpl {}

        #[async_trait]
        impl WalletReader for WalletReaderImpl {
            async fn find(&self, id: &WalletId) -> Result<Option<Wallet>, WalletError>;
        }
    }

    mock! {
        pub BalanceCacheImpl {}

        #[async_trait]
        impl BalanceCache for BalanceCacheImpl {
            async fn get(&self, id: &WalletId) -> Result<Option<Decimal>, WalletError>;
            async fn set(&self, id: &WalletId, balance: Decimal) -> Result<(), WalletError>;
            async fn invalidate(&self, id: &WalletId) -> Result<(), WalletError>;
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_the_store() {
        let mut mock_cache = MockBalanceCacheImpl::new();
        let mock_reader = MockWalletReaderImpl::new();

        mock_cache
            .expect_get()
            .times(1)
            .returning(|_| Ok(Some(Decimal::from_str("42.50").unwrap())));

        let use_case = GetBalanceUseCase::new(Arc::new(mock_reader), Arc::new(mock_cache));
        let summary = use_case.execute(WalletId::new("alice")).await.unwrap();

        assert_eq!(summary.balance, Decimal::from_str("42.50").unwrap());
    }

    #[tokio::test]
    async fn test_cache_miss_loads_store_and_backfills() {
        let mut mock_cache = MockBalanceCacheImpl::new();
        let mut mock_reader = MockWalletReaderImpl::new();

        mock_cache.expect_get().times(1).returning(|_| Ok(None));
        mock_reader.expect_find().times(1).returning(|id| {
            let mut wallet = Wallet::open(id.clone(), "USD").unwrap();
            wallet.deposit(Decimal::from(100)).unwrap();
            Ok(Some(wallet))
        });
        mock_cache
            .expect_set()
            .with(eq(WalletId::new("alice")), eq(Decimal::from(100)))
            .times(1)
            .returning(|_, _| Ok(()));

        let use_case = GetBalanceUseCase::new(Arc::new(mock_reader), Arc::new(mock_cache));
        let summary = use_case.execute(WalletId::new("alice")).await.unwrap();

        assert_eq!(summary.balance, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_missing_wallet_reports_zero_without_provisioning() {
        let mut mock_cache = MockBalanceCacheImpl::new();
        let mut mock_reader = MockWalletReaderImpl::new();

        mock_cache.expect_get().returning(|_| Ok(None));
        mock_reader.expect_find().times(1).returning(|_| Ok(None));
        // Sin set(): las billeteras inexistentes no se cachean.

        let use_case = GetBalanceUseCase::new(Arc::new(mock_reader), Arc::new(mock_cache));
        let summary = use_case.execute(WalletId::new("ghost")).await.unwrap();

        assert_eq!(summary.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_cache_failure_degrades_to_store_read() {
        let mut mock_cache = MockBalanceCacheImpl::new();
        let mut mock_reader = MockWalletReaderImpl::new();

        mock_cache
            .expect_get()
            .returning(|_| Err(WalletError::CacheError("connection refused".into())));
        mock_reader.expect_find().times(1).returning(|id| {
            let mut wallet = Wallet::open(id.clone(), "USD").unwrap();
            wallet.deposit(Decimal::from(7)).unwrap();
            Ok(Some(wallet))
        });
        mock_cache
            .expect_set()
            .returning(|_, _| Err(WalletError::CacheError("still down".into())));

        let use_case = GetBalanceUseCase::new(Arc::new(mock_reader), Arc::new(mock_cache));
        let summary = use_case.execute(WalletId::new("alice")).await.unwrap();

        assert_eq!(summary.balance, Decimal::from(7));
    }
}
