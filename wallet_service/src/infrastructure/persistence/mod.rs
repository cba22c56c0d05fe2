pub mod event_repository;
pub mod idempotency_repository;
pub mod models;
pub mod outbox_repository;
pub mod saga_repository;
pub mod wallet_repository;

use crate::domain::error::WalletError;

/// Traduce errores de sqlx a la taxonomia del dominio.
///
/// Los codigos SQLSTATE recuperables (fallo de serializacion, deadlock,
/// violacion de unicidad) se distinguen para que la politica compartida de
/// reintentos pueda actuar; el resto se envuelve como error de repositorio.
pub(crate) fn map_sqlx_err(e: sqlx::Error) -> WalletError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            // serialization_failure / deadlock_detected
            Some("40001") | Some("40P01") => {
                return WalletError::StoreConflict(db.message().to_string());
            }
            // unique_violation
            Some("23505") => {
                return WalletError::DuplicateKey(db.message().to_string());
            }
            _ => {}
        }
    }
    WalletError::RepositoryError(e.to_string())
}
