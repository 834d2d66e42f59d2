//! Exoplanet Ensemble - Main Entry Point
//!
//! Loads the configured classifiers once, then serves CSV predictions over HTTP.

use anyhow::Result;
use exoplanet_ensemble::{
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, PredictionMetrics},
    models::inference::InferenceEngine,
    server::{self, AppState},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    init_logging(&config.logging)?;

    info!("Starting Exoplanet Ensemble service");
    info!(
        threshold = config.prediction.threshold,
        method = %config.prediction.method,
        candidate_profile = ?config.prediction.candidate_profile,
        "Configuration loaded successfully"
    );

    // Models are loaded once; any failure here stops startup
    let inference_engine = Arc::new(InferenceEngine::new(&config)?);
    info!(
        "Inference engine initialized with {} models: {:?}",
        inference_engine.model_count(),
        inference_engine.model_names()
    );

    let metrics = Arc::new(PredictionMetrics::new());

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = Arc::new(AppState::new(
        inference_engine,
        metrics,
        config.prediction.clone(),
        config.server.response_shape,
    ));

    server::run_server(state, &config.server).await
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!(
            "exoplanet_ensemble={level},tower_http={level}",
            level = logging.level
        ))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
