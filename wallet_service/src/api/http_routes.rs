use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::response::{
    outcome_response, AmountRequest, HistoryQuery, LimitRequest, TransferRequest,
};
use crate::domain::types::WalletId;
use crate::infrastructure::messaging::publisher::EventPublisher;
use crate::use_cases::{
    deposit::DepositUseCase, execute_transfer::ExecuteTransferUseCase,
    get_balance::GetBalanceUseCase, get_history::GetHistoryUseCase,
    manage_wallet::ManageWalletUseCase,
};

// Estado compartido de la aplicación
pub struct AppState {
    pub deposit_use_case: DepositUseCase,
    pub withdraw_use_case: crate::use_cases::withdraw::WithdrawUseCase,
    pub manage_wallet_use_case: ManageWalletUseCase,
    pub get_balance_use_case: GetBalanceUseCase,
    pub get_history_use_case: GetHistoryUseCase,
    pub execute_transfer_use_case: ExecuteTransferUseCase,
    pub health: HealthState,
}

/// Recursos que sondean los health checks.
pub struct HealthState {
    pub pool: PgPool,
    pub redis: redis::aio::ConnectionManager,
    pub publisher: Arc<EventPublisher>,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/wallet/{id}/deposit", post(deposit))
        .route("/v1/wallet/{id}/withdraw", post(withdraw))
        .route("/v1/wallet/{id}/transfer", post(transfer))
        .route("/v1/wallet/{id}", get(get_balance))
        .route("/v1/wallet/{id}/history", get(get_history))
        .route("/v1/wallet/{id}/freeze", post(freeze))
        .route("/v1/wallet/{id}/unfreeze", post(unfreeze))
        .route("/v1/wallet/{id}/close", post(close))
        .route("/v1/wallet/{id}/limit", put(set_limit))
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health))
        .with_state(state) // Inyectamos el estado (Casos de Uso)
}

/// El header X-Request-ID es la clave de idempotencia del cliente.
fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

// Handler: Depositar fondos (auto-provisiona billeteras nuevas)
// POST /v1/wallet/{id}/deposit
#[utoipa::path(
    post,
    path = "/v1/wallet/{id}/deposit",
    params(("id" = String, Path, description = "Wallet ID")),
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Deposit applied", body = crate::use_cases::BalanceSummary),
        (status = 422, description = "Business rule violation"),
        (status = 409, description = "Concurrent request")
    )
)]
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<AmountRequest>,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let outcome = state
        .deposit_use_case
        .execute(WalletId::new(id), payload.amount, rid.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

// Handler: Retirar fondos
// POST /v1/wallet/{id}/withdraw
#[utoipa::path(
    post,
    path = "/v1/wallet/{id}/withdraw",
    params(("id" = String, Path, description = "Wallet ID")),
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Withdrawal applied", body = crate::use_cases::BalanceSummary),
        (status = 422, description = "Business rule violation"),
        (status = 409, description = "Concurrent request")
    )
)]
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<AmountRequest>,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let outcome = state
        .withdraw_use_case
        .execute(WalletId::new(id), payload.amount, rid.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

// Handler: Transferencia entre billeteras (saga)
// POST /v1/wallet/{id}/transfer
#[utoipa::path(
    post,
    path = "/v1/wallet/{id}/transfer",
    params(("id" = String, Path, description = "Source wallet ID")),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer completed", body = crate::use_cases::TransferSummary),
        (status = 422, description = "Business rule violation"),
        (status = 409, description = "Concurrent request")
    )
)]
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<TransferRequest>,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let outcome = state
        .execute_transfer_use_case
        .execute(
            WalletId::new(id),
            WalletId::new(payload.to_wallet_id),
            payload.amount,
            rid.as_deref(),
        )
        .await?;
    Ok(outcome_response(outcome))
}

// Handler: Ver saldo de una billetera especifica
// GET /v1/wallet/{id}
#[utoipa::path(
    get,
    path = "/v1/wallet/{id}",
    params(("id" = String, Path, description = "Wallet ID")),
    responses((status = 200, description = "Current balance", body = crate::use_cases::BalanceSummary))
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let summary = state
        .get_balance_use_case
        .execute(WalletId::new(id))
        .await?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

// Handler: Historial de eventos de una billetera (paginado)
// GET /v1/wallet/{id}/history?limit=&offset=
#[utoipa::path(
    get,
    path = "/v1/wallet/{id}/history",
    params(
        ("id" = String, Path, description = "Wallet ID"),
        ("limit" = Option<i64>, Query, description = "Page size, capped at 100"),
        ("offset" = Option<i64>, Query, description = "Page offset")
    ),
    responses((status = 200, description = "Events, newest first"))
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let events = state
        .get_history_use_case
        .execute(WalletId::new(id), query.limit, query.offset)
        .await?;
    Ok((StatusCode::OK, Json(events)).into_response())
}

// Handler: Congelar una billetera
// POST /v1/wallet/{id}/freeze
#[utoipa::path(
    post,
    path = "/v1/wallet/{id}/freeze",
    params(("id" = String, Path, description = "Wallet ID")),
    responses((status = 200, description = "Wallet frozen", body = crate::use_cases::StatusSummary))
)]
pub async fn freeze(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let outcome = state
        .manage_wallet_use_case
        .freeze(WalletId::new(id), rid.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

// Handler: Descongelar una billetera
// POST /v1/wallet/{id}/unfreeze
#[utoipa::path(
    post,
    path = "/v1/wallet/{id}/unfreeze",
    params(("id" = String, Path, description = "Wallet ID")),
    responses((status = 200, description = "Wallet active", body = crate::use_cases::StatusSummary))
)]
pub async fn unfreeze(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let outcome = state
        .manage_wallet_use_case
        .unfreeze(WalletId::new(id), rid.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

// Handler: Cerrar una billetera (requiere balance 0)
// POST /v1/wallet/{id}/close
#[utoipa::path(
    post,
    path = "/v1/wallet/{id}/close",
    params(("id" = String, Path, description = "Wallet ID")),
    responses(
        (status = 200, description = "Wallet closed", body = crate::use_cases::StatusSummary),
        (status = 422, description = "Non-zero balance")
    )
)]
pub async fn close(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let outcome = state
        .manage_wallet_use_case
        .close(WalletId::new(id), rid.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

// Handler: Fijar o remover el limite diario de retiro
// PUT /v1/wallet/{id}/limit
#[utoipa::path(
    put,
    path = "/v1/wallet/{id}/limit",
    params(("id" = String, Path, description = "Wallet ID")),
    request_body = LimitRequest,
    responses((status = 200, description = "Limit updated", body = crate::use_cases::LimitSummary))
)]
pub async fn set_limit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<LimitRequest>,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let outcome = state
        .manage_wallet_use_case
        .set_daily_limit(WalletId::new(id), payload.limit, rid.as_deref())
        .await?;
    Ok(outcome_response(outcome))
}

// Handler: Liveness (siempre 200 mientras el proceso responda)
// GET /health/live
pub async fn health_live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

// Handler: Readiness (sondea store, cache y broker)
// GET /health | /health/ready
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let database = match sqlx::query("SELECT 1").execute(&state.health.pool).await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let mut redis_conn = state.health.redis.clone();
    let ping: Result<String, redis::RedisError> =
        redis::cmd("PING").query_async(&mut redis_conn).await;
    let cache = match ping {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let broker = if state.health.publisher.is_connected() {
        "ok".to_string()
    } else {
        "error: disconnected".to_string()
    };

    let healthy = database == "ok" && cache == "ok" && broker == "ok";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "checks": {
            "database": database,
            "cache": cache,
            "broker": broker,
        }
    });

    (status, Json(body)).into_response()
}
