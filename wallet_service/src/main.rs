use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use wallet_service::{
    api::http_routes::{routes, AppState, HealthState},
    config::Config,
    infrastructure::{
        cache::{balance_cache::RedisBalanceCache, request_lock::RedisRequestLock},
        coordinator::TransactionCoordinator,
        gateways::{transfer_legs::SqlTransferLegs, wallet_ops::SqlWalletOps},
        messaging::publisher::EventPublisher,
        persistence::{
            event_repository::PostgresEventRepository,
            idempotency_repository::PostgresIdempotencyRepository,
            outbox_repository::PostgresOutboxRepository, saga_repository::PostgresSagaRepository,
            wallet_repository::PostgresWalletRepository,
        },
    },
    jobs::{outbox_relay::OutboxRelayJob, saga_recovery::SagaRecoveryJob},
    use_cases::{
        deposit::DepositUseCase, execute_transfer::ExecuteTransferUseCase,
        get_balance::GetBalanceUseCase, get_history::GetHistoryUseCase,
        manage_wallet::ManageWalletUseCase, recover_saga::RecoverSagaUseCase,
        withdraw::WithdrawUseCase,
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        wallet_service::api::http_routes::deposit,
        wallet_service::api::http_routes::withdraw,
        wallet_service::api::http_routes::transfer,
        wallet_service::api::http_routes::get_balance,
        wallet_service::api::http_routes::get_history,
        wallet_service::api::http_routes::freeze,
        wallet_service::api::http_routes::unfreeze,
        wallet_service::api::http_routes::close,
        wallet_service::api::http_routes::set_limit
    ),
    components(schemas(
        wallet_service::api::response::AmountRequest,
        wallet_service::api::response::TransferRequest,
        wallet_service::api::response::LimitRequest,
        wallet_service::use_cases::BalanceSummary,
        wallet_service::use_cases::StatusSummary,
        wallet_service::use_cases::LimitSummary,
        wallet_service::use_cases::TransferSummary
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Cargar variables de entorno
    dotenv().ok();

    // 2. Configurar Logging/Tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting Wallet Service...");

    let config = Config::from_env()?;

    // 3. Configurar Conexión a Base de Datos (y correr migraciones)
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Connected to Database");

    // 4. Conectar Cache (Redis) y Bus de Eventos (NATS JetStream)
    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_connection_manager().await?;

    let publisher = Arc::new(EventPublisher::connect(&config.nats_url, &config.events_stream).await?);

    info!("Connected to Cache and Event Bus");

    // 5. Instanciar Dependencias (Infraestructura)
    let balance_cache = Arc::new(RedisBalanceCache::new(
        redis_conn.clone(),
        config.balance_cache_ttl,
    ));
    let request_lock = Arc::new(RedisRequestLock::new(redis_conn.clone()));
    let wallet_repo = Arc::new(PostgresWalletRepository::new(pool.clone()));
    let event_repo = Arc::new(PostgresEventRepository::new(pool.clone()));
    let saga_repo = Arc::new(PostgresSagaRepository::new(pool.clone()));
    let idempotency_repo = Arc::new(PostgresIdempotencyRepository::new(pool.clone()));
    let outbox_repo = Arc::new(PostgresOutboxRepository::new(pool.clone()));

    let coordinator = Arc::new(TransactionCoordinator::new(
        pool.clone(),
        request_lock.clone(),
        publisher.clone(),
        config.request_lock_ttl,
    ));

    let retry_policy = config.retry_policy();
    let transfer_legs = Arc::new(SqlTransferLegs::new(
        coordinator.clone(),
        saga_repo.clone(),
        retry_policy.clone(),
    ));
    let wallet_ops = Arc::new(SqlWalletOps::new(
        coordinator.clone(),
        config.default_currency.clone(),
    ));

    // 6. Instanciar Casos de Uso
    let deposit_use_case = DepositUseCase::new(
        wallet_ops.clone(),
        idempotency_repo.clone(),
        balance_cache.clone(),
        retry_policy.clone(),
    );
    let withdraw_use_case = WithdrawUseCase::new(
        wallet_ops.clone(),
        idempotency_repo.clone(),
        balance_cache.clone(),
        retry_policy.clone(),
    );
    let manage_wallet_use_case = ManageWalletUseCase::new(
        wallet_ops.clone(),
        idempotency_repo.clone(),
        balance_cache.clone(),
        retry_policy.clone(),
    );
    let get_balance_use_case = GetBalanceUseCase::new(wallet_repo.clone(), balance_cache.clone());
    let get_history_use_case = GetHistoryUseCase::new(event_repo.clone());
    let execute_transfer_use_case = ExecuteTransferUseCase::new(
        transfer_legs.clone(),
        idempotency_repo.clone(),
        balance_cache.clone(),
    );
    let recover_saga_use_case = Arc::new(RecoverSagaUseCase::new(
        transfer_legs.clone(),
        balance_cache.clone(),
    ));

    // 7. Iniciar Background Jobs (relay del outbox + recuperacion de sagas)
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let relay = OutboxRelayJob::new(
        outbox_repo.clone(),
        idempotency_repo.clone(),
        publisher.clone(),
        config.relay_batch_size,
        config.idempotency_ttl,
    );
    tokio::spawn(relay.run_loop(config.relay_period, shutdown_rx.clone()));

    let recovery = SagaRecoveryJob::new(
        transfer_legs.clone(),
        recover_saga_use_case.clone(),
        config.saga_stuck_threshold,
        config.recovery_batch_size,
    );
    tokio::spawn(recovery.run_loop(config.recovery_period, shutdown_rx.clone()));

    // 8. Configurar Estado de la App Axum
    let app_state = Arc::new(AppState {
        deposit_use_case,
        withdraw_use_case,
        manage_wallet_use_case,
        get_balance_use_case,
        get_history_use_case,
        execute_transfer_use_case,
        health: HealthState {
            pool: pool.clone(),
            redis: redis_conn,
            publisher: publisher.clone(),
        },
    });

    // 9. Configurar Rutas y Servidor HTTP
    let app = routes(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let addr = format!("{}:{}", config.host, config.port);
    info!("HTTP Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    pool.close().await;
    info!("Wallet Service stopped");

    Ok(())
}

/// Espera SIGINT/SIGTERM y propaga la señal de apagado a los jobs.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}
