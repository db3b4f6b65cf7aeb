//! HTTP classification service.
//!
//! Routes:
//! - `GET /` banner listing the routes
//! - `GET /health` loaded and accepted model names
//! - `POST /predict/{model}` multipart upload in the `file` field, optional
//!   `threshold` query parameter

mod handlers;
mod state;

pub use handlers::*;
pub use state::*;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The requested model is not configured.
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// The model is configured but failed to load.
    #[error("Model '{model}' is not loaded: {reason}")]
    ModelUnavailable {
        /// Requested model name.
        model: String,
        /// Load failure.
        reason: String,
    },

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upload over the configured body limit.
    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    /// Inference failed.
    #[error("Error processing with local model: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownModel(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message.
    pub detail: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

/// Banner body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerResponse {
    /// Service description and routes.
    pub message: String,
}

/// Health body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the server answers.
    pub status: String,
    /// Models ready to serve.
    pub loaded_models: Vec<String>,
    /// Every name accepted by the predict route.
    pub available_models: Vec<String>,
}

/// Query parameters of the predict route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictParams {
    /// Decision threshold for sigmoid heads.
    pub threshold: Option<f32>,
}

/// Prediction body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Requested model name, as sent.
    pub model: String,
    /// Predicted class index (0 = real, 1 = fake).
    pub predicted_class: usize,
    /// Per-class probabilities.
    pub probabilities: Vec<f32>,
    /// Probability of the fake class.
    pub probability: f32,
    /// Threshold used.
    pub threshold: f32,
    /// `High`, `Medium` or `Low`.
    pub sensitivity: String,
    /// Human-readable verdict.
    pub interpretation: String,
    /// Base64 JPEG Grad-CAM overlay, `null` when unavailable.
    pub heatmap: Option<String>,
}

impl From<axum::extract::multipart::MultipartError> for ServerError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(e.body_text())
        } else {
            Self::BadRequest(e.body_text())
        }
    }
}

/// Build the router.
///
/// Request bodies are capped at the state's `max_upload_bytes` instead of
/// axum's 2 MiB default.
pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes());
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/predict/:model", post(predict))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn serve(state: AppState, address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(address, models = ?state.loaded_models(), "Listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
