use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use muse_api::config::ServerConfig;
use muse_api::state::{AppState, PaymentProviders};
use muse_api::{background, router};
use muse_billing::{PayPalClient, PayPalConfig, StripeClient, StripeConfig};
use muse_events::{EmailConfig, EmailDelivery, EventBus, EventRecorder, LogMailer, Mailer};
use muse_providers::{
    BunnyStorage, GpuBackend, GpuConfig, LlmBackend, LlmConfig, MediaStorage, OpenAiChatClient,
    ServerlessGpuClient, SpeechBackend, SpeechConfig, StorageConfig, TtsClient, Unconfigured,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "muse_api=debug,muse_events=info,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool_settings = muse_db::PoolSettings::from_env();
    let pool = muse_db::create_pool(&database_url, pool_settings)
        .await
        .expect("Failed to connect to database");
    tracing::info!(
        max_connections = pool_settings.max_connections,
        "Database connection pool created"
    );

    muse_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    muse_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- External services ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .expect("Failed to build HTTP client");

    let gpu: Arc<dyn GpuBackend> = match GpuConfig::from_env() {
        Some(cfg) => Arc::new(ServerlessGpuClient::new(http.clone(), cfg)),
        None => {
            tracing::warn!("GPU provider not configured, generation is disabled");
            Arc::new(Unconfigured("GPU"))
        }
    };
    let llm: Arc<dyn LlmBackend> = match LlmConfig::from_env() {
        Some(cfg) => Arc::new(OpenAiChatClient::new(http.clone(), cfg)),
        None => {
            tracing::warn!("LLM provider not configured, chat is disabled");
            Arc::new(Unconfigured("LLM"))
        }
    };
    let speech: Arc<dyn SpeechBackend> = match SpeechConfig::from_env() {
        Some(cfg) => Arc::new(TtsClient::new(http.clone(), cfg)),
        None => {
            tracing::warn!("TTS provider not configured, speech is disabled");
            Arc::new(Unconfigured("TTS"))
        }
    };
    let storage: Arc<dyn MediaStorage> = match StorageConfig::from_env() {
        Some(cfg) => Arc::new(BunnyStorage::new(http.clone(), cfg)),
        None => {
            tracing::warn!("Media storage not configured, uploads are disabled");
            Arc::new(Unconfigured("Storage"))
        }
    };
    let mailer: Arc<dyn Mailer> = match EmailConfig::from_env() {
        Some(cfg) => Arc::new(EmailDelivery::new(cfg)),
        None => {
            tracing::warn!("SMTP not configured, account emails go to the log");
            Arc::new(LogMailer)
        }
    };

    let mut payments = PaymentProviders::new();
    if let Some(cfg) = StripeConfig::from_env() {
        payments.register(Arc::new(StripeClient::new(http.clone(), cfg)));
    }
    if let Some(cfg) = PayPalConfig::from_env() {
        payments.register(Arc::new(PayPalClient::new(http.clone(), cfg)));
    }
    tracing::info!(
        providers = ?payments.kinds().iter().map(|k| k.as_str()).collect::<Vec<_>>(),
        "Payment providers registered"
    );

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let recorder_handle = tokio::spawn(EventRecorder::new(pool.clone()).run(event_bus.subscribe()));
    tracing::info!("Event bus and recorder started");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        event_bus: Arc::clone(&event_bus),
        http,
        gpu,
        llm,
        speech,
        storage,
        mailer,
        payments: Arc::new(payments),
    };

    // --- Background tasks ---
    let cancel = CancellationToken::new();
    let reconciler_handle = tokio::spawn(background::job_reconciler::run(
        state.clone(),
        cancel.clone(),
    ));
    let expiry_handle = tokio::spawn(background::subscription_expiry::run(
        state.clone(),
        cancel.clone(),
    ));

    let app = router::build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    cancel.cancel();
    let _ = tokio::time::timeout(grace, reconciler_handle).await;
    let _ = tokio::time::timeout(grace, expiry_handle).await;
    tracing::info!("Background tasks stopped");

    // Dropping the last sender closes the channel and stops the recorder.
    drop(event_bus);
    let _ = tokio::time::timeout(grace, recorder_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
