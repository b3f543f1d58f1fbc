// Poll Ingest API v0.1
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod routes;
mod services;

use config::AppConfig;
use routes::diagnostics::TestCallState;
use routes::health::HealthState;
use services::fetcher::HttpFetcher;
use services::poller::PollController;
use services::sink::PgSink;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 1;

/// Poll Ingest API OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Poll Ingest API",
        version = "0.1.0",
        description = "Polls an HTTP endpoint on demand and stores every response. \
            A session issues frequency × duration requests back to back; each \
            JSON response is stored as a document, any other body as its trimmed text.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Poller", description = "Start, stop and inspect the polling session"),
        (name = "Data", description = "Stored responses"),
        (name = "Diagnostics", description = "Outbound connectivity check"),
    ),
    paths(
        routes::health::health_check,
        routes::poller::start_polling,
        routes::poller::stop_polling,
        routes::poller::get_status,
        routes::responses::list_responses,
        routes::responses::clear_responses,
        routes::diagnostics::test_call,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::poller::StartRequest,
            routes::poller::IntegerField,
            routes::poller::MessageResponse,
            routes::responses::StoredResponseItem,
            routes::diagnostics::TestCallResponse,
            services::poller::PollerStatus,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poll_ingest_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Refuse to serve until the database accepts connections
    if let Err(e) = db::readiness::wait_for_database(
        &config.database_url,
        config.db_ready_max_attempts,
        Duration::from_secs(config.db_ready_retry_delay_secs),
    )
    .await
    {
        tracing::error!("Failed to initialize database, exiting: {}", e);
        std::process::exit(1);
    }

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    let fetcher = HttpFetcher::new();
    let poller = PollController::new(fetcher.clone(), Arc::new(PgSink::new(pool.clone())));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    let poller_routes = Router::new()
        .route("/api/start", post(routes::poller::start_polling))
        .route("/api/stop", post(routes::poller::stop_polling))
        .route("/api/status", get(routes::poller::get_status))
        .with_state(poller.clone());

    let data_routes = Router::new()
        .route("/api/data", get(routes::responses::list_responses))
        .route("/api/clear", delete(routes::responses::clear_responses))
        .with_state(pool.clone());

    // Health check verifies DB connectivity and reports whether a session runs
    let health_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .with_state(HealthState {
            pool,
            poller: poller.clone(),
        });

    let diagnostics_routes = Router::new()
        .route("/api/test-call", get(routes::diagnostics::test_call))
        .with_state(TestCallState {
            fetcher,
            url: config.test_call_url.clone(),
        });

    let app = Router::new()
        .merge(health_routes)
        .merge(poller_routes)
        .merge(data_routes)
        .merge(diagnostics_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server terminated unexpectedly");

    if let Err(e) = poller.stop().await {
        tracing::error!("Failed to stop polling on shutdown: {}", e);
    }
    tracing::info!("Server shut down");
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
