use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::error::{reason_phrase, TransferError, WalletError};

// Definimos un error unificado para la API del servicio de Wallet
pub enum ApiError {
    Wallet(WalletError),
    Transfer(TransferError),
}

// Permitimos convertir errores de dominio al ApiError implícitamente
impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        ApiError::Wallet(err)
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        ApiError::Transfer(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, mut body) = match &self {
            ApiError::Wallet(e) => (e.status_code(), e.envelope()),
            ApiError::Transfer(e) => (e.status_code(), e.envelope()),
        };

        // Los errores de infraestructura no filtran detalles al cliente.
        if status >= 500 {
            let message = body["message"].as_str().unwrap_or_default().to_string();
            tracing::error!(error = %message, "internal error");
            body = json!({
                "statusCode": status,
                "error": reason_phrase(status),
                "message": "Internal server error",
            });
        }

        let status =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::WalletId;
    use rstest::rstest;

    #[rstest]
    #[case(WalletError::InvalidData("bad".into()), 400)]
    #[case(WalletError::InvalidAmount("-1".into()), 422)]
    #[case(WalletError::InsufficientFunds(WalletId::new("w")), 422)]
    #[case(WalletError::WalletNotActive(WalletId::new("w")), 422)]
    #[case(WalletError::WithdrawalLimitExceeded(WalletId::new("w")), 422)]
    #[case(WalletError::NonZeroBalance(WalletId::new("w")), 422)]
    #[case(WalletError::CurrencyMismatch { from: "USD".into(), to: "EUR".into() }, 422)]
    #[case(WalletError::ConcurrentRequest("r".into()), 409)]
    #[case(WalletError::VersionConflict(WalletId::new("w")), 409)]
    #[case(WalletError::NotFound(WalletId::new("w")), 404)]
    #[case(WalletError::RepositoryError("db".into()), 500)]
    fn test_status_mapping(#[case] error: WalletError, #[case] expected: u16) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = WalletError::InsufficientFunds(WalletId::new("alice")).envelope();

        assert_eq!(envelope["statusCode"], 422);
        assert_eq!(envelope["error"], "Unprocessable Entity");
        assert_eq!(envelope["type"], "InsufficientFunds");
        assert!(envelope["message"]
            .as_str()
            .unwrap()
            .contains("Insufficient funds"));
    }

    #[test]
    fn test_illegal_transition_is_a_500() {
        let error = TransferError::IllegalTransition {
            from: "PENDING".into(),
            to: "COMPLETED".into(),
        };
        assert_eq!(error.status_code(), 500);
    }
}
