use dotenvy::dotenv;
use fraud_service::{
    config::Config,
    infrastructure::{
        cache::fraud_cache::RedisFraudCache, messaging::consumer::FraudConsumer,
        persistence::alert_repository::PostgresAlertRepository,
    },
    use_cases::process_event::ProcessEventUseCase,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Cargar variables de entorno
    dotenv().ok();

    // 2. Configurar Logging/Tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting Fraud Service...");

    let config = Config::from_env()?;

    // 3. Configurar Conexión a Base de Datos
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    info!("Connected to Database");

    // 4. Conectar Cache (Redis)
    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_connection_manager().await?;

    // 5. Instanciar Dependencias y Caso de Uso
    let alerts = Arc::new(PostgresAlertRepository::new(pool.clone()));
    let cache = Arc::new(RedisFraudCache::new(redis_conn));
    let process = Arc::new(ProcessEventUseCase::new(
        alerts,
        cache,
        config.fraud_rules(),
    ));

    // 6. Conectar el Consumidor al Bus de Eventos
    let consumer = FraudConsumer::connect(
        &config.nats_url,
        &config.events_stream,
        &config.consumer_name,
        process,
    )
    .await?;

    // 7. Consumir hasta la señal de apagado
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;

    pool.close().await;
    info!("Fraud Service stopped");

    Ok(())
}

/// Espera SIGINT/SIGTERM.
async fn shutdown_signal() {
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
}
