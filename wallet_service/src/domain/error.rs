use crate::domain::types::{SagaId, WalletId};
use thiserror::Error;

/// Clasificacion compartida por la politica de reintentos.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Reason phrase canonica del codigo HTTP usado en el sobre de error.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        _ => "Internal Server Error",
    }
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet not found with ID: {0}")]
    NotFound(WalletId),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid wallet data: {0}")]
    InvalidData(String),

    #[error("Insufficient funds in wallet: {0}")]
    InsufficientFunds(WalletId),

    #[error("Wallet {0} is not active")]
    WalletNotActive(WalletId),

    #[error("Wallet {0} is closed")]
    WalletClosed(WalletId),

    #[error("Daily withdrawal limit exceeded for wallet: {0}")]
    WithdrawalLimitExceeded(WalletId),

    #[error("Wallet {0} must have zero balance to close")]
    NonZeroBalance(WalletId),

    #[error("Currency mismatch: {from} -> {to}")]
    CurrencyMismatch { from: String, to: String },

    #[error("Concurrent request in flight: {0}")]
    ConcurrentRequest(String),

    #[error("Optimistic locking conflict on wallet: {0}")]
    VersionConflict(WalletId),

    #[error("Store conflict: {0}")]
    StoreConflict(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Repository error: {0}")]
    RepositoryError(String),

    #[error("Cache error: {0}")]
    CacheError(String),
}

impl Retryable for WalletError {
    /// Clasifica los errores recuperables por la politica compartida de
    /// reintentos: fallo de serializacion, deadlock, violacion de unicidad
    /// en insert-if-missing y choque de version optimista.
    ///
    /// Las violaciones de regla de negocio NUNCA se reintentan.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::StoreConflict(_)
                | WalletError::DuplicateKey(_)
                | WalletError::VersionConflict(_)
                | WalletError::ConcurrentRequest(_)
        )
    }
}

impl WalletError {
    /// Codigo HTTP con el que se expone este error en la API.
    pub fn status_code(&self) -> u16 {
        match self {
            WalletError::NotFound(_) => 404,
            WalletError::InvalidData(_) => 400,
            WalletError::InvalidAmount(_)
            | WalletError::InsufficientFunds(_)
            | WalletError::WalletNotActive(_)
            | WalletError::WalletClosed(_)
            | WalletError::WithdrawalLimitExceeded(_)
            | WalletError::NonZeroBalance(_)
            | WalletError::CurrencyMismatch { .. } => 422,
            WalletError::ConcurrentRequest(_)
            | WalletError::VersionConflict(_)
            | WalletError::StoreConflict(_)
            | WalletError::DuplicateKey(_) => 409,
            WalletError::RepositoryError(_) | WalletError::CacheError(_) => 500,
        }
    }

    /// Nombre estable del tipo de error (campo `type` del sobre de error).
    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::NotFound(_) => "WalletNotFound",
            WalletError::InvalidAmount(_) => "InvalidAmount",
            WalletError::InvalidData(_) => "ValidationError",
            WalletError::InsufficientFunds(_) => "InsufficientFunds",
            WalletError::WalletNotActive(_) => "WalletNotActive",
            WalletError::WalletClosed(_) => "WalletClosed",
            WalletError::WithdrawalLimitExceeded(_) => "WithdrawalLimitExceeded",
            WalletError::NonZeroBalance(_) => "NonZeroBalance",
            WalletError::CurrencyMismatch { .. } => "CurrencyMismatch",
            WalletError::ConcurrentRequest(_) => "ConcurrentRequest",
            WalletError::VersionConflict(_) => "VersionConflict",
            WalletError::StoreConflict(_) => "StoreConflict",
            WalletError::DuplicateKey(_) => "DuplicateKey",
            WalletError::RepositoryError(_) => "RepositoryError",
            WalletError::CacheError(_) => "CacheError",
        }
    }

    /// Sobre de error `{statusCode, error, message, type}` tal como lo
    /// devuelve la API y como se almacena para replays idempotentes.
    pub fn envelope(&self) -> serde_json::Value {
        let status = self.status_code();
        serde_json::json!({
            "statusCode": status,
            "error": reason_phrase(status),
            "message": self.to_string(),
            "type": self.kind(),
        })
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Cannot transfer a wallet to itself: {0}")]
    SameWallet(WalletId),

    #[error("Transfer saga not found with ID: {0}")]
    SagaNotFound(SagaId),

    // Transicion fuera del grafo declarado: error de programacion, nunca se
    // reintenta y sube como 500.
    #[error("Illegal saga state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

impl Retryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            TransferError::Wallet(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl TransferError {
    pub fn status_code(&self) -> u16 {
        match self {
            TransferError::Wallet(e) => e.status_code(),
            TransferError::SameWallet(_) => 400,
            TransferError::SagaNotFound(_) => 500,
            TransferError::IllegalTransition { .. } => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::Wallet(e) => e.kind(),
            TransferError::SameWallet(_) => "ValidationError",
            TransferError::SagaNotFound(_) => "SagaNotFound",
            TransferError::IllegalTransition { .. } => "IllegalTransition",
        }
    }

    pub fn envelope(&self) -> serde_json::Value {
        let status = self.status_code();
        serde_json::json!({
            "statusCode": status,
            "error": reason_phrase(status),
            "message": self.to_string(),
            "type": self.kind(),
        })
    }
}
