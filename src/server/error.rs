//! HTTP error responses

use crate::error::PredictError;
use crate::types::table::TableError;
use axum::{
    extract::{multipart::MultipartRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Upload exceeds the maximum allowed size")]
    PayloadTooLarge,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Table(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Predict(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Predict(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(detail = %self, "Prediction request failed");
            "Prediction failed. Check server logs for details.".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
