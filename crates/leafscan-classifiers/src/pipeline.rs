//! Inference pipeline: image in, label record out
//!
//! A request runs to completion in four steps:
//! 1. Preprocess the image into a `(1, 160, 160, 3)` tensor
//! 2. Score it with the provider's memoized classifier
//! 3. Take the argmax, lowest index first on ties
//! 4. Resolve the index against the label table
//!
//! Nothing is cached between requests except the classifier itself.

use crate::blocking::run_blocking;
use crate::config::LeafScanConfig;
use crate::labels::LabelTable;
use crate::preprocess::{decode_image, preprocess, PreprocessConfig};
use crate::provider::ModelProvider;
use image::DynamicImage;
use leafscan_core::{Error, InputTensor, LabelRecord, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Resolved prediction with the winning class and its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Winning class index
    pub index: usize,

    /// Raw score of the winning class
    pub score: f32,

    /// Label record for the class
    #[serde(flatten)]
    pub label: LabelRecord,
}

/// Preprocessing, classification and label lookup for single images
#[derive(Clone)]
pub struct InferencePipeline {
    provider: Arc<ModelProvider>,
    labels: Arc<LabelTable>,
    preprocess: PreprocessConfig,
}

impl InferencePipeline {
    /// Create a pipeline over an explicit provider and label table
    pub fn new(provider: Arc<ModelProvider>, labels: Arc<LabelTable>) -> Self {
        Self {
            provider,
            labels,
            preprocess: PreprocessConfig::default(),
        }
    }

    /// Override preprocessing settings
    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Build the provider and load the label table from configuration.
    ///
    /// The label table is validated here; the model itself is fetched on the
    /// first prediction or an explicit [`warm_up`](Self::warm_up).
    pub fn from_config(config: &LeafScanConfig) -> Result<Self> {
        config.validate()?;

        let labels = LabelTable::from_file(&config.labels.path, config.labels.expected_classes)?;
        let provider = ModelProvider::from_settings(&config.model, config.preprocess.target_size)?;

        Ok(Self::new(Arc::new(provider), Arc::new(labels)).with_preprocess(config.preprocess))
    }

    /// Fetch and load the model now instead of on the first request.
    ///
    /// Fails with `Error::Labels` when the model declares a class count that
    /// differs from the label table size.
    pub async fn warm_up(&self) -> Result<()> {
        let classifier = self.provider.acquire().await?;

        if let Some(classes) = classifier.num_classes() {
            if classes != self.labels.len() {
                return Err(Error::labels(format!(
                    "model '{}' declares {} classes but the label table has {} entries",
                    classifier.name(),
                    classes,
                    self.labels.len()
                )));
            }
        }
        Ok(())
    }

    /// Classify an image and return its label record
    pub async fn predict(&self, image: &DynamicImage) -> Result<LabelRecord> {
        Ok(self.predict_detailed(image).await?.label)
    }

    /// Classify an image, keeping the class index and score
    pub async fn predict_detailed(&self, image: &DynamicImage) -> Result<Prediction> {
        let start = Instant::now();
        let image = image.clone();
        let config = self.preprocess;

        let result = match run_blocking(move || preprocess(&image, &config)).await {
            Ok(tensor) => self.resolve(&tensor).await,
            Err(e) => Err(e),
        };

        record_outcome(start, &result);
        result
    }

    /// Decode raw image bytes and classify them.
    ///
    /// Undecodable input fails before the model is touched.
    pub async fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let start = Instant::now();
        let bytes = bytes.to_vec();
        let config = self.preprocess;

        let tensor = run_blocking(move || {
            let image = decode_image(&bytes)?;
            preprocess(&image, &config)
        })
        .await;

        let result = match tensor {
            Ok(tensor) => self.resolve(&tensor).await,
            Err(e) => Err(e),
        };

        record_outcome(start, &result);
        result
    }

    async fn resolve(&self, tensor: &InputTensor) -> Result<Prediction> {
        let scores = self.provider.classify(tensor).await?;

        tracing::debug!(classes = scores.len(), "Classifier returned scores");

        let index = scores
            .argmax()
            .ok_or_else(|| Error::classifier("classifier returned no usable scores"))?;
        let label = self.labels.get(index)?.clone();
        let score = scores.get(index).unwrap_or(f32::NAN);

        tracing::debug!(index, score, name = %label.name, "Resolved prediction");

        Ok(Prediction { index, score, label })
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn provider(&self) -> &Arc<ModelProvider> {
        &self.provider
    }

    pub fn preprocess_config(&self) -> &PreprocessConfig {
        &self.preprocess
    }
}

fn record_outcome(start: Instant, result: &Result<Prediction>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!("leafscan_predictions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("leafscan_predict_latency_us").record(start.elapsed().as_micros() as f64);
}
