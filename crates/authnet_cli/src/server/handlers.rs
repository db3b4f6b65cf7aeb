//! HTTP request handlers.

use authnet_core::backend::CpuBackend;
use authnet_core::ImageClassifier;
use authnet_explain::TargetClass;
use authnet_models::{predict as classify_image, validate_threshold, Classification};
use authnet_transforms::decode_rgb;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::server::state::{AppState, InferenceBackend, ModelLookup, SharedClassifier};
use crate::server::{BannerResponse, HealthResponse, PredictParams, PredictResponse, ServerError};

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

/// Banner handler.
pub async fn root() -> (StatusCode, Json<BannerResponse>) {
    let banner = BannerResponse {
        message: "Backend is running. Use /predict/cnn, /predict/effnet, /predict/vgg, or /predict/vgg16"
            .to_string(),
    };
    (StatusCode::OK, Json(banner))
}

/// Health check handler.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = HealthResponse {
        status: "ok".to_string(),
        loaded_models: state.loaded_models(),
        available_models: state.available_models(),
    };
    (StatusCode::OK, Json(health))
}

/// Classify an upload and attach a best-effort Grad-CAM overlay.
pub async fn predict(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
    Query(params): Query<PredictParams>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, ServerError> {
    let model = match state.lookup(&model_name) {
        ModelLookup::Ready(model) => model,
        ModelLookup::Unavailable(reason) => {
            return Err(ServerError::ModelUnavailable {
                model: model_name,
                reason,
            })
        }
        ModelLookup::Unknown => return Err(ServerError::UnknownModel(model_name)),
    };

    let threshold = params.threshold.unwrap_or_else(|| state.default_threshold());
    validate_threshold(threshold).map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let bytes = read_upload(multipart).await?;
    tracing::info!(model = %model_name, bytes = bytes.len(), threshold, "Received prediction request");

    let (classification, heatmap) =
        tokio::task::spawn_blocking(move || run_inference(&state, &model, &bytes, threshold))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(PredictResponse {
        model: model_name,
        predicted_class: classification.class_index,
        interpretation: classification.interpretation(),
        probabilities: classification.probabilities,
        probability: classification.fake_probability,
        threshold: classification.threshold,
        sensitivity: classification.sensitivity.label().to_string(),
        heatmap,
    }))
}

async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ServerError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(ServerError::BadRequest(format!(
        "missing multipart field '{FILE_FIELD}'"
    )))
}

fn run_inference(
    state: &AppState,
    model: &SharedClassifier,
    bytes: &[u8],
    threshold: f32,
) -> Result<(Classification, Option<String>), ServerError> {
    let image = decode_rgb(bytes).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let model = model
        .lock()
        .map_err(|_| ServerError::Internal("model lock poisoned".to_string()))?;
    let device = state.device();
    let preprocessor = state.preprocessor();

    // Classification runs without gradient tracking.
    let classifier = model.valid();
    let input = preprocessor
        .prepare_for::<InferenceBackend>(&image, classifier.input_shape(), &device)
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    let classification = classify_image(&classifier, input, threshold)
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    let heatmap = state.explainer().explain_best_effort::<CpuBackend, _>(
        &*model,
        &image,
        &preprocessor,
        TargetClass::Predicted,
        &device,
    );

    Ok((classification, heatmap))
}
