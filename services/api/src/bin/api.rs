//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, memory::MemoryAdapter},
    config::{Config, StoreBackend},
    error::ApiError,
    web::{
        api_router,
        rest::ApiDoc,
        session::SessionRegistry,
        state::{AppState, SystemClock},
    },
};
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use weight_tracker_core::ports::{IdentityDirectory, RecordStore};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Store & Run Migrations ---
    let (records, identities): (Arc<dyn RecordStore>, Arc<dyn IdentityDirectory>) =
        match &config.store {
            StoreBackend::Postgres { database_url } => {
                info!("Connecting to database...");
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(database_url)
                    .await?;
                let db_adapter = Arc::new(DbAdapter::new(db_pool));
                info!("Running database migrations...");
                db_adapter.run_migrations().await?;
                info!("Database migrations complete.");
                let records: Arc<dyn RecordStore> = db_adapter.clone();
                let identities: Arc<dyn IdentityDirectory> = db_adapter;
                (records, identities)
            }
            StoreBackend::Memory => {
                warn!("Using the in-memory store; records are lost on restart.");
                let memory = Arc::new(MemoryAdapter::new());
                let records: Arc<dyn RecordStore> = memory.clone();
                let identities: Arc<dyn IdentityDirectory> = memory;
                (records, identities)
            }
        };

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        records,
        identities,
        sessions: Arc::new(SessionRegistry::new(config.session_timeout_minutes)),
        clock: Arc::new(SystemClock),
        config: config.clone(),
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
