//! Test doubles for the model provider and classifiers
//!
//! Fetchers count their calls so memoization can be asserted, and the
//! classifiers are deterministic functions of their input.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use leafscan_classifiers::{ArtifactFetcher, Classifier, LabelTable, ModelLoader, ModelProvider};
use leafscan_core::{Error, InputTensor, LabelRecord, ProbabilityVector, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Serves fixed bytes and counts fetches
pub struct StaticFetcher {
    body: Bytes,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(body: &'static [u8]) -> Self {
        Self {
            body: Bytes::from_static(body),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for StaticFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }

    fn location(&self) -> String {
        "memory://static".to_string()
    }
}

/// Ignores the artifact and hands out a prepared classifier
pub struct PreparedLoader {
    classifier: Arc<dyn Classifier>,
    loads: AtomicUsize,
}

impl PreparedLoader {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for PreparedLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        if !path.exists() {
            return Err(Error::deserialization("artifact was not written"));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.classifier))
    }
}

/// Parses the artifact as a JSON array of scores
pub struct JsonScoresLoader;

impl ModelLoader for JsonScoresLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        let text = std::fs::read_to_string(path)?;
        let scores: Vec<f32> =
            serde_json::from_str(&text).map_err(|e| Error::deserialization(e.to_string()))?;
        Ok(Arc::new(FixedScoresClassifier::new(scores)))
    }
}

/// Returns the same scores for every input
pub struct FixedScoresClassifier {
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedScoresClassifier {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FixedScoresClassifier {
    async fn classify(&self, _input: &InputTensor) -> Result<ProbabilityVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbabilityVector::new(self.scores.clone()))
    }

    fn name(&self) -> &str {
        "fixed-scores"
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.scores.len())
    }
}

/// Scores class `c` with the mean of channel `c`, so red, green and blue
/// dominant images resolve to classes 0, 1 and 2
pub struct ChannelMeanClassifier;

#[async_trait]
impl Classifier for ChannelMeanClassifier {
    async fn classify(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        if input.shape() != [1, 160, 160, 3] {
            return Err(Error::classifier(format!("unexpected shape {:?}", input.shape())));
        }
        Ok(ProbabilityVector::new(input.channel_means()))
    }

    fn name(&self) -> &str {
        "channel-mean"
    }
}

/// Keeps the last tensor it was given
#[derive(Default)]
pub struct RecordingClassifier {
    last: Mutex<Option<InputTensor>>,
}

impl RecordingClassifier {
    pub fn last(&self) -> Option<InputTensor> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for RecordingClassifier {
    async fn classify(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        *self.last.lock().unwrap() = Some(input.clone());
        Ok(ProbabilityVector::new(vec![0.2, 0.5, 0.3]))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Three-class table: red rust, healthy, blue mold
pub fn rgb_table() -> LabelTable {
    LabelTable::new(vec![
        LabelRecord::new("Leaf rust", "Puccinia fungus", "Apply a triazole fungicide"),
        LabelRecord::new("Healthy", "No disease detected", "No treatment needed"),
        LabelRecord::new("Blue mold", "Peronospora tabacina", "Improve airflow and apply mancozeb"),
    ])
    .unwrap()
}

/// Provider that serves `classifier` without touching the network
pub fn provider_for(classifier: Arc<dyn Classifier>) -> (Arc<StaticFetcher>, Arc<ModelProvider>) {
    let fetcher = Arc::new(StaticFetcher::new(b"onnx-bytes"));
    let provider = ModelProvider::new(fetcher.clone(), Arc::new(PreparedLoader::new(classifier)));
    (fetcher, Arc::new(provider))
}
