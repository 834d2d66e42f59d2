//! HTTP request handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ResponseShape;
use crate::models::aggregator::AggregationMethod;
use crate::types::prediction::PredictionReport;
use crate::types::table::Table;

use super::error::{ApiError, Result};
use super::state::AppState;

pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "models_loaded": state.engine.model_count(),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "models_loaded": state.engine.model_count(),
        "models": state.engine.model_names(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.metrics.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    threshold: Option<f64>,
    method: Option<String>,
}

/// Score an uploaded CSV with every loaded model
pub async fn predict_csv(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<PredictQuery>, QueryRejection>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    match run_prediction(&state, query, multipart, request_id).await {
        Ok(report) => {
            let elapsed = start.elapsed();
            state.metrics.record_request(elapsed, &report);
            info!(
                request_id = %request_id,
                rows = report.summary.n,
                positives = report.summary.positives,
                method = %report.summary.method,
                processing_time_us = elapsed.as_micros(),
                "Prediction served"
            );
            match state.response_shape {
                ResponseShape::Multi => Json(report.multi_model()).into_response(),
                ResponseShape::Single => Json(report.single_model()).into_response(),
            }
        }
        Err(e) => {
            state.metrics.record_rejection();
            warn!(request_id = %request_id, error = %e, "Prediction rejected");
            e.into_response()
        }
    }
}

async fn run_prediction(
    state: &Arc<AppState>,
    query: std::result::Result<Query<PredictQuery>, QueryRejection>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
    request_id: Uuid,
) -> Result<PredictionReport> {
    let Query(query) = query?;
    let mut multipart = multipart?;
    let threshold = query.threshold.unwrap_or(state.defaults.threshold);
    let method = match query.method.as_deref() {
        Some(name) => name.parse::<AggregationMethod>()?,
        None => state.defaults.method,
    };

    let (file_name, data) = read_upload(&mut multipart).await?;
    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(ApiError::BadRequest("please upload a .csv file".to_string()));
    }

    info!(
        request_id = %request_id,
        file = %file_name,
        bytes = data.len(),
        threshold = threshold,
        method = %method,
        "Received CSV upload"
    );

    // parsing and scoring are CPU-bound
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || {
        let table = Table::from_csv_bytes(&data)?;
        let report = engine.predict(&table, threshold, method)?;
        Ok::<_, ApiError>(report)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("prediction task failed: {}", e)))?
}

/// First multipart field named `file`, or the first field carrying a file name
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Bytes)> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(upload_error)?;
        return Ok((file_name, data));
    }

    Err(ApiError::BadRequest("No file uploaded".to_string()))
}

fn upload_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(e.body_text())
    }
}
