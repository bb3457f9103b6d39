//! HTTP routes and handlers

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use leafscan_classifiers::Prediction;
use leafscan_core::{Error, ErrorKind, LabelRecord};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route("/labels", get(labels))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(limit))
        .fallback(fallback)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Ready once the model has been fetched and loaded
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.pipeline.provider().is_loaded() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "MODEL NOT LOADED")
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

#[derive(Serialize)]
struct LabelsResponse<'a> {
    count: usize,
    labels: Vec<&'a LabelRecord>,
}

async fn labels(State(state): State<AppState>) -> Response {
    let table = state.pipeline.labels();
    Json(LabelsResponse {
        count: table.len(),
        labels: table.iter().collect(),
    })
    .into_response()
}

/// Classify the raw image bytes in the request body
async fn predict(State(state): State<AppState>, body: Bytes) -> Result<Json<Prediction>, ApiError> {
    metrics::counter!("leafscan_requests_total").increment(1);

    if body.is_empty() {
        return Err(ApiError(Error::image("request body is empty; send the image bytes")));
    }

    let prediction = state.pipeline.predict_bytes(&body).await?;
    info!(
        index = prediction.index,
        name = %prediction.label.name,
        "Prediction served"
    );
    Ok(Json(prediction))
}

async fn fallback() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

/// Pipeline error rendered as a JSON body with a matching status code
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

/// HTTP status for each failure class
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Image => StatusCode::BAD_REQUEST,
        ErrorKind::Retrieval | ErrorKind::Integrity => StatusCode::BAD_GATEWAY,
        ErrorKind::Deserialization
        | ErrorKind::IndexOutOfRange
        | ErrorKind::Labels
        | ErrorKind::Classifier
        | ErrorKind::Config
        | ErrorKind::Io
        | ErrorKind::Serialization => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            error!("Prediction failed ({}): {}", kind, self.0);
        } else {
            warn!("Rejected upload: {}", self.0);
        }

        (
            status,
            Json(json!({
                "error": self.0.to_string(),
                "kind": kind,
            })),
        )
            .into_response()
    }
}
