use std::sync::Arc;

use crate::domain::entities::WalletEvent;
use crate::domain::error::WalletError;
use crate::domain::repository::EventJournal;
use crate::domain::types::WalletId;

/// Caso de uso para obtener el historial de eventos de una billetera.
///
/// Devuelve los eventos del journal ordenados de lo más reciente a lo más
/// antiguo, paginados. El límite se recorta a 100.
#[derive(Clone)]
pub struct GetHistoryUseCase {
    journal: Arc<dyn EventJournal>,
}

impl GetHistoryUseCase {
    /// Construye una nueva instancia de `GetHistoryUseCase`.
    ///
    /// Se le inyecta una implementación de `EventJournal` envuelta en un
    /// `Arc` para permitir invocaciones seguras entre múltiples subprocesos.
    pub fn new(journal: Arc<dyn EventJournal>) -> Self {
        Self { journal }
    }

    #[tracing::instrument(name = "GetHistoryUseCase::execute", skip(self))]
    pub async fn execute(
        &self,
        wallet_id: WalletId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        self.journal
            .list_for_wallet(&wallet_id, limit, offset)
            .await
    }
}
