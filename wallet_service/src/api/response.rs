use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::entities::{Outcome, StoredResponse};

// DTO de entrada para depositos y retiros
#[derive(Debug, Deserialize, ToSchema)]
pub struct AmountRequest {
    pub amount: Decimal,
}

// DTO de entrada para transferencias
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub to_wallet_id: String,
    pub amount: Decimal,
}

// DTO de entrada para el limite diario (null = sin limite)
#[derive(Debug, Deserialize, ToSchema)]
pub struct LimitRequest {
    pub limit: Option<Decimal>,
}

// Paginacion del historial
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Convierte el resultado de un caso de uso idempotente en la respuesta
/// HTTP: un resultado fresco sale como 200 con su cuerpo; un replay
/// devuelve el codigo y cuerpo almacenados tal cual, incluso si la
/// respuesta original fue un sobre de error.
pub fn outcome_response<T: serde::Serialize>(outcome: Outcome<T>) -> Response {
    match outcome {
        Outcome::Fresh(body) => (StatusCode::OK, Json(body)).into_response(),
        Outcome::Replayed(stored) => stored_response(stored),
    }
}

pub fn stored_response(stored: StoredResponse) -> Response {
    let status =
        StatusCode::from_u16(stored.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(stored.body)).into_response()
}
