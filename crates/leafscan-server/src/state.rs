//! Shared application state

use leafscan_classifiers::InferencePipeline;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Default upload limit: phone photos are routinely several megabytes
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// State shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Inference pipeline with the memoized model
    pub pipeline: Arc<InferencePipeline>,

    /// Prometheus handle for rendering `/metrics`
    pub metrics: Option<PrometheusHandle>,

    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: InferencePipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            metrics: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }
}
