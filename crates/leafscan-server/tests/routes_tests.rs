//! Router tests driven through `tower::ServiceExt::oneshot`

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use leafscan_classifiers::{
    ArtifactFetcher, Classifier, InferencePipeline, LabelTable, ModelLoader, ModelProvider,
};
use leafscan_core::{Error, InputTensor, LabelRecord, ProbabilityVector, Result};
use leafscan_server::{create_router, AppState};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Fetcher that succeeds or fails with a retrieval error, counting calls
struct TestFetcher {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl ArtifactFetcher for TestFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(Error::retrieval("HTTP status client error (404 Not Found)"))
        } else {
            Ok(Bytes::from_static(b"model"))
        }
    }

    fn location(&self) -> String {
        "memory://test".to_string()
    }
}

struct TestLoader(Arc<dyn Classifier>);

impl ModelLoader for TestLoader {
    fn load(&self, _path: &Path) -> Result<Arc<dyn Classifier>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Scores each class by the mean of the matching colour channel
struct ChannelMean;

#[async_trait]
impl Classifier for ChannelMean {
    async fn classify(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        Ok(ProbabilityVector::from(input.channel_means()))
    }

    fn name(&self) -> &str {
        "channel-mean"
    }
}

/// Always returns more classes than the label table has
struct TooWide;

#[async_trait]
impl Classifier for TooWide {
    async fn classify(&self, _input: &InputTensor) -> Result<ProbabilityVector> {
        Ok(ProbabilityVector::from(vec![0.0, 0.1, 0.2, 0.3, 0.9]))
    }

    fn name(&self) -> &str {
        "too-wide"
    }
}

fn table() -> LabelTable {
    LabelTable::new(vec![
        LabelRecord::new("Leaf rust", "Fungus", "Fungicide"),
        LabelRecord::new("Healthy", "None", "None"),
        LabelRecord::new("Blue mold", "Mould", "Remove leaves"),
    ])
    .unwrap()
}

fn app_with(classifier: Arc<dyn Classifier>, fail_fetch: bool) -> (Router, Arc<TestFetcher>, AppState) {
    let fetcher = Arc::new(TestFetcher {
        fail: fail_fetch,
        calls: AtomicUsize::new(0),
    });
    let provider = ModelProvider::new(fetcher.clone(), Arc::new(TestLoader(classifier)));
    let pipeline = InferencePipeline::new(Arc::new(provider), Arc::new(table()));
    let state = AppState::new(pipeline);
    (create_router(state.clone()), fetcher, state)
}

fn green_png() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([30, 140, 40])));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn predict_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/octet-stream")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = app_with(Arc::new(ChannelMean), false);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_predict_returns_label_record() {
    let (app, fetcher, _) = app_with(Arc::new(ChannelMean), false);

    let response = app.oneshot(predict_request(green_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["index"], 1);
    assert_eq!(body["name"], "Healthy");
    assert_eq!(body["cause"], "None");
    assert_eq!(body["cure"], "None");
    assert!((body["score"].as_f64().unwrap() - 140.0).abs() < 1.0);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_model_is_shared_across_requests() {
    let (app, fetcher, _) = app_with(Arc::new(ChannelMean), false);

    for _ in 0..4 {
        let response = app.clone().oneshot(predict_request(green_png())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_undecodable_upload_is_bad_request() {
    let (app, fetcher, _) = app_with(Arc::new(ChannelMean), false);

    let response = app
        .oneshot(predict_request(&b"definitely not an image"[..]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["kind"], "image");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_upload_is_bad_request() {
    let (app, _, _) = app_with(Arc::new(ChannelMean), false);

    let response = app.oneshot(predict_request(Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "image");
}

#[tokio::test]
async fn test_retrieval_failure_is_bad_gateway() {
    let (app, fetcher, state) = app_with(Arc::new(ChannelMean), true);

    let response = app.clone().oneshot(predict_request(green_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = json_body(response).await;
    assert_eq!(body["kind"], "retrieval");
    assert!(body["error"].as_str().unwrap().contains("404"));
    assert!(!state.pipeline.provider().is_loaded());

    // Failures are not cached, so the next request fetches again
    let response = app.oneshot(predict_request(green_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_index_out_of_range_is_server_error() {
    let (app, _, _) = app_with(Arc::new(TooWide), false);

    let response = app.oneshot(predict_request(green_png())).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["kind"], "index_out_of_range");
}

#[tokio::test]
async fn test_ready_after_first_prediction() {
    let (app, _, _) = app_with(Arc::new(ChannelMean), false);

    let ready = || Request::builder().uri("/ready").body(Body::empty()).unwrap();

    let response = app.clone().oneshot(ready()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    app.clone().oneshot(predict_request(green_png())).await.unwrap();

    let response = app.oneshot(ready()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_labels_endpoint() {
    let (app, _, _) = app_with(Arc::new(ChannelMean), false);

    let response = app
        .oneshot(Request::builder().uri("/labels").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["labels"][2]["name"], "Blue mold");
}

#[tokio::test]
async fn test_metrics_without_exporter_is_not_found() {
    let (app, _, _) = app_with(Arc::new(ChannelMean), false);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let fetcher = Arc::new(TestFetcher {
        fail: false,
        calls: AtomicUsize::new(0),
    });
    let provider = ModelProvider::new(fetcher, Arc::new(TestLoader(Arc::new(ChannelMean))));
    let pipeline = InferencePipeline::new(Arc::new(provider), Arc::new(table()));
    let app = create_router(AppState::new(pipeline).with_max_upload_bytes(1024));

    let response = app.oneshot(predict_request(vec![0u8; 4096])).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
