//! HTTP front end: CSV upload in, ensemble predictions out.

mod error;
mod handlers;
mod state;

pub use error::ApiError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::ServerConfig;

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. POST a CSV to /predict-csv or check /health.",
        })),
    )
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/predict-csv", post(handlers::predict_csv))
        .fallback(handle_404)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// `"*"` anywhere in the list allows every origin without credentials;
/// otherwise only the listed origins, with credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Bind and serve until ctrl+c
pub async fn run_server(state: Arc<AppState>, config: &ServerConfig) -> anyhow::Result<()> {
    let app = create_router(Arc::clone(&state), config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        models_loaded = state.engine.model_count(),
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        response_shape = ?config.response_shape,
        pid = std::process::id(),
        "Server listening and ready to accept connections"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, draining connections");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    state.metrics.print_summary();
    info!("Server stopped");
    Ok(())
}
