//! SAUCE Judge - Application Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use redis::Client as RedisClient;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sauce_judge::{
    config::{SandboxConfig, CONFIG},
    constants::{sandbox_backends, API_BASE_PATH},
    db::{self, PgStore},
    handlers,
    middleware::logging_middleware,
    runner::{DockerBackend, ExecutionBackend, ProcessBackend, RunnerLimits},
    services::SubmissionService,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| CONFIG.server.rust_log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SAUCE judge server...");

    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&CONFIG.database).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&db_pool).await?;

    let redis_conn = match &CONFIG.redis.url {
        Some(url) => {
            tracing::info!("Connecting to Redis...");
            let client = RedisClient::open(url.as_str())?;
            Some(redis::aio::ConnectionManager::new(client).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, rate limiting disabled");
            None
        }
    };

    let backend = execution_backend(&CONFIG.sandbox).await?;
    let limits = RunnerLimits {
        compile_timeout: CONFIG.sandbox.compile_timeout,
        default_test_timeout: CONFIG.sandbox.default_test_timeout,
    };
    let service = SubmissionService::new(Arc::new(PgStore::new(db_pool)), backend, limits);

    let state = AppState::new(Arc::new(service), redis_conn, CONFIG.clone());

    // Build the router
    let app = Router::new()
        .nest(API_BASE_PATH, handlers::routes(state.clone()))
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::new(CONFIG.server.host.parse()?, CONFIG.server.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the configured sandbox backend
async fn execution_backend(config: &SandboxConfig) -> anyhow::Result<Arc<dyn ExecutionBackend>> {
    if config.backend == sandbox_backends::PROCESS {
        tracing::warn!(
            work_root = %config.work_root.display(),
            "Using the process sandbox; submissions run unconfined on this host"
        );
        return Ok(Arc::new(ProcessBackend::new(config)));
    }

    tracing::info!("Connecting to Docker...");
    let docker = DockerBackend::connect(config)?;
    let version = docker.version().await?;
    tracing::info!("Connected to Docker version: {}", version);

    Ok(Arc::new(docker))
}
