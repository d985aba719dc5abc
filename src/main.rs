use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_cpf_api::batch::{BatchLookupWorkflow, BatchOptions};
use rust_cpf_api::config::Config;
use rust_cpf_api::db::Database;
use rust_cpf_api::db_storage::PgEntryRepository;
use rust_cpf_api::handlers::{self, AppState};
use rust_cpf_api::jobs::{BatchQueue, JobRegistry};
use rust_cpf_api::services::WorkApiService;
use rust_cpf_api::storage::{EntryRepository, FileEntryRepository};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - The registered-entry store (Postgres when configured, JSON file otherwise).
/// - The Work API client and the batch worker.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_cpf_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let repository: Arc<dyn EntryRepository> = match config.database_url {
        Some(ref url) => {
            let db = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            Arc::new(PgEntryRepository::new(db.pool.clone()))
        }
        None => {
            tracing::info!("Using file store at {}", config.cpf_store_path);
            Arc::new(FileEntryRepository::new(config.cpf_store_path.clone()))
        }
    };

    let work_api = WorkApiService::new(&config)?;
    tracing::info!("✓ Work API client initialized: {}", config.work_api_base_url);

    let workflow = BatchLookupWorkflow::new(Arc::new(work_api), BatchOptions::from_config(&config));

    // Single worker: at most one batch hits the Work API at a time
    let (batches, _worker) = BatchQueue::start(
        workflow.clone(),
        config.batch_queue_capacity,
        JobRegistry::default(),
    );
    tracing::info!(
        "Batch worker started (queue capacity {})",
        config.batch_queue_capacity
    );

    // Build application state
    let app_state = Arc::new(AppState {
        workflow,
        repository,
        batches,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    // Build protected routes with security layers
    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 5MB max payload
            .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
            // Rate limiting: 10 req/sec per IP, burst of 20
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
